pub mod client;
pub mod events;
pub mod flex;
pub mod signature;

pub use client::{NoopReplyChannel, ReplyChannel, TransportError};
pub use events::{
    dispatch, parse_webhook_body, EventContext, EventHandler, LineEnvelope, LineEvent,
    WebhookParseError,
};
pub use flex::{render_reply, MessagePayload};
pub use signature::{sign_body, verify_signature};
