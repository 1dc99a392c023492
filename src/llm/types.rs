use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::errors::PlatformError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Where the answer's grounding comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum GroundingMode {
    /// Context is retrieved locally and sent inline with the question.
    #[default]
    Supplied,
    /// Plain completion, model knowledge only.
    Ungrounded,
    /// The platform retrieves sources itself, optionally from one publisher.
    Platform {
        publisher: Option<String>,
        sources_limit: u32,
    },
}

/// How the platform picks the model that answers.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingMode {
    /// The platform chooses, optionally steered by a theological tradition.
    Auto { tradition: Option<String> },
    /// Any model from one provider family, e.g. `anthropic`.
    Family(String),
    /// One exact model id.
    Model(String),
}

impl Default for RoutingMode {
    fn default() -> Self {
        RoutingMode::Auto { tradition: None }
    }
}

/// A function the model may call instead of answering in prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn to_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Auto,
    None,
    /// The model must call one of the tools.
    Required,
    /// The model must call this tool.
    Function(String),
}

impl ToolChoice {
    pub fn to_json(&self) -> Value {
        match self {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Required => json!("required"),
            ToolChoice::Function(name) => json!({
                "type": "function",
                "function": { "name": name }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument string as the model produced it.
    pub arguments: String,
}

impl ToolCall {
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, PlatformError> {
        serde_json::from_str(&self.arguments).map_err(|e| PlatformError::Generation {
            status: None,
            message: format!("invalid arguments for tool '{}': {}", self.name, e),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub query: String,
    pub context_block: String,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub grounding: GroundingMode,
    pub routing: RoutingMode,
    pub temperature: Option<f32>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
}

impl GenerationRequest {
    fn base(query: String, max_tokens: u32, grounding: GroundingMode) -> Self {
        Self {
            query,
            context_block: String::new(),
            system_prompt: None,
            max_tokens,
            grounding,
            routing: RoutingMode::default(),
            temperature: None,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn with_context(query: impl Into<String>, context_block: impl Into<String>, max_tokens: u32) -> Self {
        let mut request = Self::base(query.into(), max_tokens, GroundingMode::Supplied);
        request.context_block = context_block.into();
        request
    }

    pub fn ungrounded(query: impl Into<String>, max_tokens: u32) -> Self {
        Self::base(query.into(), max_tokens, GroundingMode::Ungrounded)
    }

    pub fn platform_grounded(
        query: impl Into<String>,
        publisher: Option<String>,
        sources_limit: u32,
        max_tokens: u32,
    ) -> Self {
        Self::base(
            query.into(),
            max_tokens,
            GroundingMode::Platform {
                publisher,
                sources_limit,
            },
        )
    }

    pub fn system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn routing(mut self, routing: RoutingMode) -> Self {
        self.routing = routing;
        self
    }

    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>, choice: ToolChoice) -> Self {
        self.tools = tools;
        self.tool_choice = Some(choice);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub answer_text: String,
    /// `false` means the answer may be generic rather than source-backed.
    pub sources_returned: bool,
    pub model_id: String,
    pub tool_calls: Vec<ToolCall>,
}
