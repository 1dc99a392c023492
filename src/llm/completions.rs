use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use super::provider::Generator;
use super::types::{
    ChatMessage, GenerationRequest, GenerationResult, GroundingMode, RoutingMode, ToolCall,
};
use crate::auth::CredentialBroker;
use crate::core::config::PlatformSettings;
use crate::core::errors::PlatformError;
use crate::core::http::{self, GENERATION_TIMEOUT};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question based on the provided context. If the context doesn't contain relevant information, say so honestly.";

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Clone)]
pub struct GenerationClient {
    client: Client,
    broker: Arc<CredentialBroker>,
    completions_url: String,
    grounded_url: String,
}

impl GenerationClient {
    pub fn new(client: Client, broker: Arc<CredentialBroker>, settings: &PlatformSettings) -> Self {
        Self {
            client,
            broker,
            completions_url: settings.completions_url(),
            grounded_url: settings.grounded_completions_url(),
        }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;

        let url = match request.grounding {
            GroundingMode::Platform { .. } => &self.grounded_url,
            _ => &self.completions_url,
        };
        let body = build_body(request);
        let http_request = self.client.post(url).bearer_auth(token).json(&body);

        let reply = http::send(http_request, GENERATION_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            let message = reply
                .detail()
                .unwrap_or_else(|| reply.body.chars().take(MAX_ERROR_BODY_CHARS).collect());
            return Err(PlatformError::Generation {
                status: Some(reply.status.as_u16()),
                message,
            });
        }

        let payload: Value = serde_json::from_str(&reply.body).map_err(|e| PlatformError::Generation {
            status: Some(reply.status.as_u16()),
            message: format!("undecodable completion response: {}", e),
        })?;
        let result = parse_result(&payload)?;
        tracing::debug!(
            "Completion from {} (sources_returned={})",
            result.model_id,
            result.sources_returned
        );
        Ok(result)
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PlatformError> {
        GenerationClient::generate(self, request, cancel).await
    }
}

pub fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    match request.grounding {
        GroundingMode::Supplied => {
            let system = request
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
            vec![
                ChatMessage::system(system),
                ChatMessage::user(format!(
                    "Context:\n{}\n\nQuestion: {}",
                    request.context_block, request.query
                )),
            ]
        }
        GroundingMode::Ungrounded | GroundingMode::Platform { .. } => {
            let mut messages = Vec::with_capacity(2);
            if let Some(prompt) = &request.system_prompt {
                messages.push(ChatMessage::system(prompt.clone()));
            }
            messages.push(ChatMessage::user(request.query.clone()));
            messages
        }
    }
}

fn build_body(request: &GenerationRequest) -> Value {
    let mut obj = Map::new();
    obj.insert("messages".to_string(), json!(build_messages(request)));
    obj.insert("max_tokens".to_string(), json!(request.max_tokens));

    match &request.routing {
        RoutingMode::Auto { tradition } => {
            obj.insert("auto_routing".to_string(), json!(true));
            if let Some(tradition) = tradition {
                obj.insert("tradition".to_string(), json!(tradition));
            }
        }
        RoutingMode::Family(family) => {
            obj.insert("model_family".to_string(), json!(family));
        }
        RoutingMode::Model(model) => {
            obj.insert("model".to_string(), json!(model));
        }
    }
    if let Some(temperature) = request.temperature {
        obj.insert("temperature".to_string(), json!(temperature));
    }

    if let GroundingMode::Platform {
        publisher,
        sources_limit,
    } = &request.grounding
    {
        obj.insert("sources_limit".to_string(), json!(sources_limit));
        if let Some(publisher) = publisher {
            obj.insert("rag_publisher".to_string(), json!(publisher));
        }
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request.tools.iter().map(|t| t.to_json()).collect();
        obj.insert("tools".to_string(), Value::Array(tools));
        if let Some(choice) = &request.tool_choice {
            obj.insert("tool_choice".to_string(), choice.to_json());
        }
    }

    Value::Object(obj)
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let arguments = match function.get("arguments")? {
                Value::String(raw) => raw.clone(),
                other => other.to_string(),
            };
            Some(ToolCall {
                id: call.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                name: function.get("name")?.as_str()?.to_string(),
                arguments,
            })
        })
        .collect()
}

fn parse_result(payload: &Value) -> Result<GenerationResult, PlatformError> {
    let message = &payload["choices"][0]["message"];
    let tool_calls = parse_tool_calls(message);
    // A tool call may come with null content.
    let answer = match message["content"].as_str() {
        Some(text) => text.to_string(),
        None if !tool_calls.is_empty() => String::new(),
        None => {
            return Err(PlatformError::Generation {
                status: None,
                message: "response missing choices[0].message.content".to_string(),
            })
        }
    };

    Ok(GenerationResult {
        answer_text: answer,
        sources_returned: payload
            .get("sources_returned")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        model_id: payload
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        tool_calls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ToolChoice, ToolDefinition};
    use crate::test_support::{MockConfig, MockPlatform};

    #[test]
    fn supplied_context_uses_default_prompt() {
        let request = GenerationRequest::with_context("What is X?", "[Source 1: A (B)]\ntext\n", 300);
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(
            messages[1].content,
            "Context:\n[Source 1: A (B)]\ntext\n\n\nQuestion: What is X?"
        );
    }

    #[test]
    fn caller_prompt_replaces_default() {
        let request = GenerationRequest::with_context("q", "ctx", 10)
            .system_prompt(Some("Answer tersely.".to_string()));
        assert_eq!(build_messages(&request)[0].content, "Answer tersely.");

        let blank = GenerationRequest::with_context("q", "ctx", 10).system_prompt(Some("  ".to_string()));
        assert_eq!(build_messages(&blank)[0].content, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn platform_grounding_adds_publisher_fields() {
        let request =
            GenerationRequest::platform_grounded("hiring?", Some("Bezalel".to_string()), 3, 500);
        let body = build_body(&request);
        assert_eq!(body["rag_publisher"], "Bezalel");
        assert_eq!(body["sources_limit"], 3);
        assert_eq!(body["auto_routing"], true);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);

        let default_dataset = build_body(&GenerationRequest::platform_grounded("q", None, 3, 500));
        assert!(default_dataset.get("rag_publisher").is_none());
    }

    #[test]
    fn routing_modes_shape_the_body() {
        let auto = build_body(
            &GenerationRequest::ungrounded("q", 100).routing(RoutingMode::Auto {
                tradition: Some("evangelical".to_string()),
            }),
        );
        assert_eq!(auto["auto_routing"], true);
        assert_eq!(auto["tradition"], "evangelical");
        assert!(auto.get("model").is_none());

        let family = build_body(
            &GenerationRequest::ungrounded("q", 100)
                .routing(RoutingMode::Family("anthropic".to_string())),
        );
        assert_eq!(family["model_family"], "anthropic");
        assert!(family.get("auto_routing").is_none());

        let direct = build_body(
            &GenerationRequest::ungrounded("q", 500)
                .routing(RoutingMode::Model("gloo-anthropic-claude-sonnet-4.5".to_string()))
                .temperature(Some(0.5)),
        );
        assert_eq!(direct["model"], "gloo-anthropic-claude-sonnet-4.5");
        assert_eq!(direct["temperature"], 0.5);
        assert_eq!(direct["max_tokens"], 500);
        assert!(direct.get("auto_routing").is_none());
        assert!(direct.get("model_family").is_none());
    }

    #[test]
    fn tools_are_sent_with_choice() {
        let tool = ToolDefinition {
            name: "lookup".to_string(),
            description: "Look something up".to_string(),
            parameters: json!({ "type": "object" }),
        };
        let body = build_body(
            &GenerationRequest::ungrounded("q", 100).tools(vec![tool], ToolChoice::Required),
        );
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["tool_choice"], "required");

        let plain = build_body(&GenerationRequest::ungrounded("q", 100));
        assert!(plain.get("tools").is_none());
        assert!(plain.get("tool_choice").is_none());
    }

    #[test]
    fn tool_call_with_null_content_parses() {
        let payload = json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "lookup", "arguments": "{\"term\":\"grace\"}" }
                }]
            }}],
            "model": "m"
        });
        let result = parse_result(&payload).unwrap();
        assert_eq!(result.answer_text, "");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "lookup");
        assert_eq!(result.tool_calls[0].arguments, r#"{"term":"grace"}"#);
    }

    #[test]
    fn missing_sources_flag_is_not_an_error() {
        let result = parse_result(&json!({ "choices": [{ "message": { "content": "hi" } }] })).unwrap();
        assert!(!result.sources_returned);
        assert_eq!(result.model_id, "");
    }

    #[test]
    fn missing_answer_is_generation_error() {
        let err = parse_result(&json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, PlatformError::Generation { .. }));
    }

    #[tokio::test]
    async fn generate_round_trip_against_mock() {
        let mock = MockPlatform::start(MockConfig::default()).await;
        let client = GenerationClient::new(Client::new(), mock.broker(), &mock.settings());
        let result = client
            .generate(
                &GenerationRequest::with_context("q", "ctx", 3000),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.answer_text, "generated answer");
        assert!(result.sources_returned);
        assert_eq!(result.model_id, "gloo-test-model");

        let body = mock.recorded.completion_bodies.lock().unwrap()[0].clone();
        assert_eq!(body["max_tokens"], 3000);
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[tokio::test]
    async fn platform_grounding_hits_grounded_endpoint() {
        let mock = MockPlatform::start(MockConfig::default()).await;
        let client = GenerationClient::new(Client::new(), mock.broker(), &mock.settings());
        client
            .generate(
                &GenerationRequest::platform_grounded("q", None, 3, 500),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            mock.recorded
                .grounded_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn non_success_status_is_generation_error() {
        let mock = MockPlatform::start(MockConfig {
            completion_status: 500,
            completion_body: json!({ "detail": "upstream model unavailable" }),
            ..MockConfig::default()
        })
        .await;
        let client = GenerationClient::new(Client::new(), mock.broker(), &mock.settings());
        let err = client
            .generate(&GenerationRequest::ungrounded("q", 10), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            PlatformError::Generation { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "upstream model unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
