use anyhow::Result;
use async_trait::async_trait;

/// Opaque text-in/text-out language model call. No structural contract on
/// the response exists beyond what the prompt requests; callers must parse
/// defensively.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String>;
}
