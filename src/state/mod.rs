use std::sync::Arc;

use reqwest::Client;

use crate::auth::{ClientCredentials, CredentialBroker};
use crate::core::config::{AppPaths, Settings};
use crate::core::errors::PlatformError;
use crate::ingest::{FileUploader, RealtimeUploader};
use crate::llm::{ChatClient, GenerationClient};
use crate::rag::{RagOptions, RagPipeline};
use crate::search::SearchClient;

pub mod error;

use error::InitializationError;

const USER_AGENT: &str = concat!("gloo-rag/", env!("CARGO_PKG_VERSION"));

/// Everything a command or request handler needs, built once at startup.
///
/// One `CredentialBroker` is shared by every client so that all outbound
/// calls reuse the same cached token.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub client: Client,
    pub broker: Arc<CredentialBroker>,
    pub search: Arc<SearchClient>,
    pub generation: Arc<GenerationClient>,
    pub chat: Arc<ChatClient>,
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    /// Loads and validates settings for `paths`, then wires the clients.
    pub fn initialize(paths: &AppPaths) -> Result<Arc<Self>, InitializationError> {
        let settings = Settings::load(paths).map_err(InitializationError::Config)?;
        settings.validate().map_err(InitializationError::Config)?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Arc<Self>, InitializationError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(InitializationError::HttpClient)?;

        let platform = &settings.platform;
        let broker = Arc::new(CredentialBroker::new(
            client.clone(),
            platform.token_url(),
            ClientCredentials::new(platform.client_id.clone(), platform.client_secret.clone()),
        ));
        let search = Arc::new(SearchClient::new(client.clone(), broker.clone(), platform));
        let generation = Arc::new(GenerationClient::new(client.clone(), broker.clone(), platform));
        let chat = Arc::new(ChatClient::new(client.clone(), broker.clone(), platform));
        let pipeline = Arc::new(RagPipeline::new(
            broker.clone(),
            search.clone(),
            generation.clone(),
        ));

        tracing::debug!("Platform settings: {:?}", platform);

        Ok(Arc::new(AppState {
            settings: Arc::new(settings),
            client,
            broker,
            search,
            generation,
            chat,
            pipeline,
        }))
    }

    pub fn rag_options(&self) -> RagOptions {
        RagOptions::from_settings(&self.settings.rag)
    }

    pub fn realtime_uploader(&self) -> Result<RealtimeUploader, PlatformError> {
        RealtimeUploader::new(self.client.clone(), self.broker.clone(), &self.settings.platform)
    }

    pub fn file_uploader(&self) -> Result<FileUploader, PlatformError> {
        FileUploader::new(self.client.clone(), self.broker.clone(), &self.settings.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockConfig, MockPlatform};
    use std::sync::atomic::Ordering;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn clients_share_one_broker() {
        let mock = MockPlatform::start(MockConfig::default()).await;
        let settings = Settings {
            platform: mock.settings(),
            ..Settings::default()
        };
        let state = AppState::from_settings(settings).unwrap();

        let cancel = CancellationToken::new();
        let query = crate::search::SearchQuery::new("q", 5, 0.5);
        state.search.search(&query, &cancel).await.unwrap();
        state
            .realtime_uploader()
            .unwrap()
            .upload_text("T", "body", &cancel)
            .await
            .unwrap();

        state
            .chat
            .send_message("hi", None, &crate::llm::ChatOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(mock.token_calls(), 1);
        assert_eq!(mock.recorded.ingest_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn uploaders_need_publisher() {
        let state = AppState::from_settings(Settings::default()).unwrap();
        assert!(state.file_uploader().is_err());
        assert_eq!(state.rag_options().limit, 5);
    }
}
