use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use meshitomo_agent::AgentRuntime;
use meshitomo_core::Reply;
use meshitomo_line::client::ReplyChannel;
use meshitomo_line::events::{
    dispatch, parse_webhook_body, EventContext, EventHandler, LineEnvelope,
};
use meshitomo_line::flex::render_reply;
use meshitomo_line::signature::verify_signature;

use crate::billing::{parse_subscription_change, verify_stripe_signature};

#[derive(Clone)]
pub struct WebhookState {
    pub runtime: Arc<AgentRuntime>,
    pub reply_channel: Arc<dyn ReplyChannel>,
    pub line_channel_secret: String,
    pub stripe_webhook_secret: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", post(line_webhook))
        .route("/webhook/stripe", post(stripe_webhook))
        .with_state(state)
}

/// Adapts the agent runtime to the transport's event seam.
struct RuntimeHandler {
    runtime: Arc<AgentRuntime>,
}

#[async_trait]
impl EventHandler for RuntimeHandler {
    async fn on_text(&self, user_id: &str, text: &str, ctx: &EventContext) -> Option<Reply> {
        Some(self.runtime.handle_message(user_id, text, &ctx.correlation_id).await)
    }

    async fn on_postback(&self, user_id: &str, data: &str, ctx: &EventContext) -> Option<Reply> {
        self.runtime.handle_postback(user_id, data, &ctx.correlation_id).await
    }

    async fn on_follow(&self, _user_id: &str, _ctx: &EventContext) -> Option<Reply> {
        Some(self.runtime.welcome())
    }
}

/// LINE webhook ingress. Each event runs as its own task so one failure
/// cannot poison its siblings; the batch is acknowledged with 200 either
/// way because redelivery would replay events whose reply tokens are
/// already spent.
async fn line_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let signature = headers
        .get("x-line-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&state.line_channel_secret, body.as_bytes(), signature) {
        warn!(
            event_name = "ingress.line.signature_rejected",
            correlation_id = "unverified",
            "webhook signature verification failed"
        );
        return StatusCode::UNAUTHORIZED;
    }

    let envelopes = match parse_webhook_body(&body) {
        Ok(envelopes) => envelopes,
        Err(parse_error) => {
            warn!(
                event_name = "ingress.line.body_rejected",
                error = %parse_error,
                "webhook body could not be parsed"
            );
            return StatusCode::BAD_REQUEST;
        }
    };

    let mut tasks = JoinSet::new();
    for envelope in envelopes {
        let runtime = state.runtime.clone();
        let reply_channel = state.reply_channel.clone();
        tasks.spawn(handle_envelope(envelope, runtime, reply_channel));
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(join_error) = joined {
            error!(
                event_name = "ingress.line.event_task_panicked",
                error = %join_error,
                "event task aborted"
            );
        }
    }

    StatusCode::OK
}

async fn handle_envelope(
    envelope: LineEnvelope,
    runtime: Arc<AgentRuntime>,
    reply_channel: Arc<dyn ReplyChannel>,
) {
    let ctx = EventContext { correlation_id: Uuid::new_v4().to_string() };
    info!(
        event_name = "ingress.line.event_received",
        correlation_id = %ctx.correlation_id,
        event = ?envelope.event,
        "handling webhook event"
    );

    let handler = RuntimeHandler { runtime };
    let Some(reply) = dispatch(&envelope, &handler, &ctx).await else {
        return;
    };
    let Some(reply_token) = &envelope.reply_token else {
        return;
    };

    if let Err(transport_error) = reply_channel.reply(reply_token, render_reply(&reply)).await {
        // The reply token is single-shot; nothing to do but record it.
        error!(
            event_name = "ingress.line.reply_failed",
            correlation_id = %ctx.correlation_id,
            error = %transport_error,
            "reply delivery failed"
        );
    }
}

/// Payment provider webhook. Unlike the chat ingress, a persistence
/// failure here returns a non-2xx so the provider redelivers: the handler
/// is idempotent, so replays are safe.
async fn stripe_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    if let Some(secret) = &state.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !verify_stripe_signature(secret, &body, signature) {
            warn!(
                event_name = "ingress.stripe.signature_rejected",
                "stripe webhook signature verification failed"
            );
            return StatusCode::UNAUTHORIZED;
        }
    }

    let Some(change) = parse_subscription_change(&body) else {
        return StatusCode::OK;
    };

    info!(
        event_name = "ingress.stripe.subscription_change",
        customer_ref = %change.customer_ref,
        active = change.active,
        "applying subscription change"
    );

    match state
        .runtime
        .subscription_changed(
            change.user_id.as_deref(),
            &change.customer_ref,
            change.plan_id,
            change.active,
        )
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(app_error) => {
            error!(
                event_name = "ingress.stripe.subscription_change_failed",
                customer_ref = %change.customer_ref,
                error = %app_error,
                "subscription change could not be applied"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
