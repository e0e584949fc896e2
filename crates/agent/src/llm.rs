use anyhow::Result;
use async_trait::async_trait;

/// Minimal completion surface so extraction can sit on top of any provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}
