//! Structured output through tool calls: the model is forced to call a
//! function whose arguments are the result, which is then parsed into a
//! typed value.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::provider::Generator;
use super::types::{GenerationRequest, RoutingMode, ToolChoice, ToolDefinition};
use crate::core::errors::PlatformError;

pub const GROWTH_PLAN_TOOL: &str = "create_growth_plan";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_number: u32,
    pub action: String,
    pub timeline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPlan {
    pub goal_title: String,
    pub steps: Vec<PlanStep>,
}

pub fn growth_plan_tool() -> ToolDefinition {
    ToolDefinition {
        name: GROWTH_PLAN_TOOL.to_string(),
        description: "Creates a structured personal growth plan with a title and a series of actionable steps.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "goal_title": {
                    "type": "string",
                    "description": "A concise, encouraging title for the user's goal."
                },
                "steps": {
                    "type": "array",
                    "description": "A list of concrete steps the user should take.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step_number": { "type": "integer" },
                            "action": {
                                "type": "string",
                                "description": "The specific, actionable task for this step."
                            },
                            "timeline": {
                                "type": "string",
                                "description": "A suggested timeframe for this step (e.g., 'Week 1-2')."
                            }
                        },
                        "required": ["step_number", "action", "timeline"]
                    }
                }
            },
            "required": ["goal_title", "steps"]
        }),
    }
}

/// Turns a free-form goal into a [`GrowthPlan`] via a required tool call.
pub async fn plan_goal(
    generator: &dyn Generator,
    goal: &str,
    routing: RoutingMode,
    max_tokens: u32,
    cancel: &CancellationToken,
) -> Result<GrowthPlan, PlatformError> {
    let request = GenerationRequest::ungrounded(goal, max_tokens)
        .routing(routing)
        .tools(vec![growth_plan_tool()], ToolChoice::Required);
    let result = generator.generate(&request, cancel).await?;

    let call = result
        .tool_calls
        .iter()
        .find(|c| c.name == GROWTH_PLAN_TOOL)
        .ok_or_else(|| PlatformError::Generation {
            status: None,
            message: format!("model did not call {}", GROWTH_PLAN_TOOL),
        })?;
    call.parse_arguments()
}
