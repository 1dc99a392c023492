pub mod chat;
pub mod completions;
pub mod provider;
pub mod tools;
pub mod types;

pub use chat::{ChatClient, ChatEntry, ChatHistory, ChatOptions, ChatReply};
pub use completions::{GenerationClient, DEFAULT_SYSTEM_PROMPT};
pub use provider::Generator;
pub use tools::{growth_plan_tool, plan_goal, GrowthPlan, PlanStep, GROWTH_PLAN_TOOL};
pub use types::{
    ChatMessage, GenerationRequest, GenerationResult, GroundingMode, RoutingMode, ToolCall,
    ToolChoice, ToolDefinition,
};
