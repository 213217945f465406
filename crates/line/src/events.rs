use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use meshitomo_core::Reply;

/// One webhook event with its single-shot reply token. The token is
/// consumed by the first reply; a failed turn must degrade in place rather
/// than retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineEnvelope {
    pub reply_token: Option<String>,
    pub event: LineEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    TextMessage { user_id: String, text: String },
    Postback { user_id: String, data: String },
    Follow { user_id: String },
    Unsupported { event_type: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Debug, Error)]
pub enum WebhookParseError {
    #[error("webhook body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application seam: the transport hands decoded events to whatever drives
/// the conversation. `None` means the event produced no reply.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_text(&self, user_id: &str, text: &str, ctx: &EventContext) -> Option<Reply>;
    async fn on_postback(&self, user_id: &str, data: &str, ctx: &EventContext) -> Option<Reply>;
    async fn on_follow(&self, user_id: &str, ctx: &EventContext) -> Option<Reply>;
}

/// Route one envelope to the handler. Unsupported events and events
/// without a user are dropped quietly; the platform expects a 200 for the
/// batch either way.
pub async fn dispatch(
    envelope: &LineEnvelope,
    handler: &dyn EventHandler,
    ctx: &EventContext,
) -> Option<Reply> {
    match &envelope.event {
        LineEvent::TextMessage { user_id, text } => handler.on_text(user_id, text, ctx).await,
        LineEvent::Postback { user_id, data } => handler.on_postback(user_id, data, ctx).await,
        LineEvent::Follow { user_id } => handler.on_follow(user_id, ctx).await,
        LineEvent::Unsupported { event_type } => {
            debug!(
                event_name = "ingress.line.unsupported_event",
                event_type = %event_type,
                correlation_id = %ctx.correlation_id,
                "ignoring unsupported event"
            );
            None
        }
    }
}

/// Decode a webhook body into envelopes. Events we do not handle are kept
/// as `Unsupported` so the caller can log them; non-text messages land
/// there too.
pub fn parse_webhook_body(body: &str) -> Result<Vec<LineEnvelope>, WebhookParseError> {
    let raw: RawWebhookBody = serde_json::from_str(body)?;
    Ok(raw.events.into_iter().map(into_envelope).collect())
}

fn into_envelope(raw: RawEvent) -> LineEnvelope {
    let user_id = raw.source.and_then(|source| source.user_id);
    let event = match (raw.kind.as_str(), user_id) {
        ("message", Some(user_id)) => match raw.message {
            Some(message) if message.kind == "text" => {
                LineEvent::TextMessage { user_id, text: message.text.unwrap_or_default() }
            }
            Some(message) => {
                LineEvent::Unsupported { event_type: format!("message:{}", message.kind) }
            }
            None => LineEvent::Unsupported { event_type: "message".to_string() },
        },
        ("postback", Some(user_id)) => LineEvent::Postback {
            user_id,
            data: raw.postback.map(|postback| postback.data).unwrap_or_default(),
        },
        ("follow", Some(user_id)) => LineEvent::Follow { user_id },
        (kind, _) => LineEvent::Unsupported { event_type: kind.to_string() },
    };

    LineEnvelope { reply_token: raw.reply_token, event }
}

#[derive(Debug, Deserialize)]
struct RawWebhookBody {
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "replyToken")]
    reply_token: Option<String>,
    source: Option<RawSource>,
    message: Option<RawMessage>,
    postback: Option<RawPostback>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPostback {
    data: String,
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use meshitomo_core::Reply;

    use super::{
        dispatch, parse_webhook_body, EventContext, EventHandler, LineEvent,
    };

    struct EchoHandler;

    #[async_trait]
    impl EventHandler for EchoHandler {
        async fn on_text(&self, user_id: &str, text: &str, _ctx: &EventContext) -> Option<Reply> {
            Some(Reply::Text(format!("{user_id}:{text}")))
        }

        async fn on_postback(
            &self,
            _user_id: &str,
            data: &str,
            _ctx: &EventContext,
        ) -> Option<Reply> {
            Some(Reply::Text(data.to_string()))
        }

        async fn on_follow(&self, _user_id: &str, _ctx: &EventContext) -> Option<Reply> {
            Some(Reply::Text("ようこそ".to_string()))
        }
    }

    fn ctx() -> EventContext {
        EventContext { correlation_id: "corr-1".to_string() }
    }

    #[test]
    fn parses_text_message_events() {
        let body = r#"{
            "destination": "Uxxx",
            "events": [{
                "type": "message",
                "replyToken": "rt-1",
                "source": {"type": "user", "userId": "U1"},
                "message": {"id": "m1", "type": "text", "text": "渋谷で焼肉"}
            }]
        }"#;

        let envelopes = parse_webhook_body(body).expect("parse");
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].reply_token.as_deref(), Some("rt-1"));
        assert_eq!(
            envelopes[0].event,
            LineEvent::TextMessage { user_id: "U1".to_string(), text: "渋谷で焼肉".to_string() }
        );
    }

    #[test]
    fn parses_postback_and_follow_events() {
        let body = r#"{
            "events": [
                {
                    "type": "postback",
                    "replyToken": "rt-2",
                    "source": {"userId": "U1"},
                    "postback": {"data": "plan:light"}
                },
                {
                    "type": "follow",
                    "replyToken": "rt-3",
                    "source": {"userId": "U2"}
                }
            ]
        }"#;

        let envelopes = parse_webhook_body(body).expect("parse");
        assert_eq!(
            envelopes[0].event,
            LineEvent::Postback { user_id: "U1".to_string(), data: "plan:light".to_string() }
        );
        assert_eq!(envelopes[1].event, LineEvent::Follow { user_id: "U2".to_string() });
    }

    #[test]
    fn non_text_messages_become_unsupported() {
        let body = r#"{
            "events": [{
                "type": "message",
                "replyToken": "rt-4",
                "source": {"userId": "U1"},
                "message": {"id": "m2", "type": "sticker"}
            }]
        }"#;

        let envelopes = parse_webhook_body(body).expect("parse");
        assert_eq!(
            envelopes[0].event,
            LineEvent::Unsupported { event_type: "message:sticker".to_string() }
        );
    }

    #[test]
    fn empty_events_array_parses_to_nothing() {
        assert!(parse_webhook_body(r#"{"events": []}"#).expect("parse").is_empty());
        assert!(parse_webhook_body(r#"{}"#).expect("parse").is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_webhook_body("not json").is_err());
    }

    #[tokio::test]
    async fn dispatch_routes_by_event_kind() {
        let envelopes = parse_webhook_body(
            r#"{
            "events": [
                {"type": "message", "replyToken": "rt", "source": {"userId": "U1"},
                 "message": {"type": "text", "text": "hi"}},
                {"type": "unfollow", "source": {"userId": "U1"}}
            ]}"#,
        )
        .expect("parse");

        let replied = dispatch(&envelopes[0], &EchoHandler, &ctx()).await;
        assert_eq!(replied, Some(Reply::Text("U1:hi".to_string())));

        let ignored = dispatch(&envelopes[1], &EchoHandler, &ctx()).await;
        assert_eq!(ignored, None);
    }
}
