use crate::domain::model::{CompletionRequest, RequestSettings};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Human-readable location of `path`, used in reports.
    fn location(&self, path: &str) -> String;
}

pub trait ConfigProvider: Send + Sync {
    fn request_settings(&self) -> RequestSettings;
    fn sample_size(&self) -> Option<usize>;
    fn max_chunk_size(&self) -> usize;
    fn retry_attempts(&self) -> u32;
    fn retry_delay_ms(&self) -> u64;
}

/// A chat-completion backend returning the assistant message text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
