use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::validation::validate_settings;
use crate::core::errors::PlatformError;

pub const DEFAULT_BASE_URL: &str = "https://platform.ai.gloo.com";
const REDACT_PLACEHOLDER: &str = "****";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub tenant: String,
    pub collection: String,
    pub publisher_id: Option<String>,
    pub publisher_name: Option<String>,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            tenant: String::new(),
            collection: "GlooProd".to_string(),
            publisher_id: None,
            publisher_name: None,
        }
    }
}

impl fmt::Debug for PlatformSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &redact(&self.client_id))
            .field("client_secret", &redact(&self.client_secret))
            .field("tenant", &self.tenant)
            .field("collection", &self.collection)
            .field("publisher_id", &self.publisher_id)
            .field("publisher_name", &self.publisher_name)
            .finish()
    }
}

fn redact(value: &str) -> &str {
    if value.is_empty() {
        ""
    } else {
        REDACT_PLACEHOLDER
    }
}

impl PlatformSettings {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn token_url(&self) -> String {
        self.endpoint("/oauth2/token")
    }

    pub fn search_url(&self) -> String {
        self.endpoint("/ai/data/v1/search")
    }

    pub fn completions_url(&self) -> String {
        self.endpoint("/ai/v2/chat/completions")
    }

    pub fn grounded_completions_url(&self) -> String {
        self.endpoint("/ai/v2/chat/completions/grounded")
    }

    pub fn message_url(&self) -> String {
        self.endpoint("/ai/v1/message")
    }

    pub fn chat_url(&self) -> String {
        self.endpoint("/ai/v1/chat")
    }

    pub fn realtime_upload_url(&self) -> String {
        self.endpoint("/ingestion/v1/real_time_upload")
    }

    pub fn files_url(&self) -> String {
        self.endpoint("/ingestion/v2/files")
    }

    pub fn metadata_url(&self) -> String {
        self.endpoint("/engine/v2/item")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub max_tokens: u32,
    pub max_snippets: usize,
    pub max_chars_per_snippet: usize,
    pub min_certainty: f64,
    pub sources_limit: u32,
    pub default_search_limit: u32,
    pub default_rag_limit: u32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            max_tokens: 3000,
            max_snippets: 5,
            max_chars_per_snippet: 350,
            min_certainty: 0.5,
            sources_limit: 3,
            default_search_limit: 10,
            default_rag_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub platform: PlatformSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
}

#[derive(Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
}

const ENV_OVERRIDES: [(&str, &[&str], EnvKind); 12] = [
    ("GLOO_BASE_URL", &["platform", "base_url"], EnvKind::Text),
    ("GLOO_CLIENT_ID", &["platform", "client_id"], EnvKind::Text),
    ("GLOO_CLIENT_SECRET", &["platform", "client_secret"], EnvKind::Text),
    ("GLOO_TENANT", &["platform", "tenant"], EnvKind::Text),
    ("GLOO_PUBLISHER_ID", &["platform", "publisher_id"], EnvKind::Text),
    ("PUBLISHER_NAME", &["platform", "publisher_name"], EnvKind::Text),
    ("GLOO_PUBLISHER_NAME", &["platform", "publisher_name"], EnvKind::Text),
    ("PORT", &["server", "port"], EnvKind::Integer),
    ("RAG_MAX_TOKENS", &["rag", "max_tokens"], EnvKind::Integer),
    ("RAG_CONTEXT_MAX_SNIPPETS", &["rag", "max_snippets"], EnvKind::Integer),
    (
        "RAG_CONTEXT_MAX_CHARS_PER_SNIPPET",
        &["rag", "max_chars_per_snippet"],
        EnvKind::Integer,
    ),
    ("RAG_SOURCES_LIMIT", &["rag", "sources_limit"], EnvKind::Integer),
];

impl Settings {
    /// Loads settings from the YAML file at `paths.config_path` (missing file
    /// means defaults) and applies environment overrides on top.
    pub fn load(paths: &AppPaths) -> Result<Self, PlatformError> {
        let file_config = load_yaml_file(&paths.config_path);
        Self::from_value(file_config, |key| env::var(key).ok())
    }

    pub fn from_value<F>(mut config: Value, lookup: F) -> Result<Self, PlatformError>
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_env_overrides(&mut config, lookup);
        serde_json::from_value(config).map_err(PlatformError::config)
    }

    pub fn validate(&self) -> Result<(), PlatformError> {
        validate_settings(self)
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn apply_env_overrides<F>(config: &mut Value, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for (key, path, kind) in ENV_OVERRIDES {
        let Some(raw) = lookup(key) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = match kind {
            EnvKind::Text => Value::String(raw.to_string()),
            EnvKind::Integer => match raw.parse::<u64>() {
                Ok(parsed) => Value::from(parsed),
                Err(_) => {
                    tracing::warn!("Ignoring non-numeric {}={:?}", key, raw);
                    continue;
                }
            },
        };
        ensure_object_path(config, path, value);
    }
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    if !config.is_object() {
        *config = Value::Object(Map::new());
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}
