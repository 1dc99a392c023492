use thiserror::Error;

use crate::core::errors::PlatformError;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load settings: {0}")]
    Config(#[source] PlatformError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}
