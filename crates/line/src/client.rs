use async_trait::async_trait;
use thiserror::Error;

use crate::flex::MessagePayload;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("reply delivery failed: {0}")]
    Reply(String),
    #[error("push delivery failed: {0}")]
    Push(String),
}

/// Outbound messaging seam. `reply` consumes a single-shot reply token;
/// `push` is the out-of-band channel used for latency-masking notices.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<MessagePayload>,
    ) -> Result<(), TransportError>;

    async fn push(&self, user_id: &str, messages: Vec<MessagePayload>)
        -> Result<(), TransportError>;
}

/// Discards everything; stands in for the real channel in tests and dry
/// runs.
#[derive(Default)]
pub struct NoopReplyChannel;

#[async_trait]
impl ReplyChannel for NoopReplyChannel {
    async fn reply(
        &self,
        _reply_token: &str,
        _messages: Vec<MessagePayload>,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn push(
        &self,
        _user_id: &str,
        _messages: Vec<MessagePayload>,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}
