use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{GenerationRequest, GenerationResult};
use crate::core::errors::PlatformError;

#[async_trait]
pub trait Generator: Send + Sync {
    /// chat completion for one question (non-streaming)
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, PlatformError>;
}
