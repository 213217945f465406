use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use meshitomo_agent::UserNotifier;
use meshitomo_core::config::LineConfig;
use meshitomo_line::client::{ReplyChannel, TransportError};
use meshitomo_line::flex::MessagePayload;

/// HTTP client for the LINE Messaging API reply/push endpoints.
pub struct LineApiClient {
    http: reqwest::Client,
    access_token: SecretString,
    base_url: String,
}

#[derive(Serialize)]
struct ReplyRequest<'a> {
    #[serde(rename = "replyToken")]
    reply_token: &'a str,
    messages: &'a [MessagePayload],
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: &'a [MessagePayload],
}

impl LineApiClient {
    pub fn from_config(config: &LineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building line http client")?;

        Ok(Self {
            http,
            access_token: config.channel_access_token.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize>(&self, path: &str, request: &T) -> Result<(), String> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(self.access_token.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("line api returned {status}: {body}"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReplyChannel for LineApiClient {
    async fn reply(
        &self,
        reply_token: &str,
        messages: Vec<MessagePayload>,
    ) -> Result<(), TransportError> {
        self.post("/v2/bot/message/reply", &ReplyRequest { reply_token, messages: &messages })
            .await
            .map_err(TransportError::Reply)
    }

    async fn push(
        &self,
        user_id: &str,
        messages: Vec<MessagePayload>,
    ) -> Result<(), TransportError> {
        self.post("/v2/bot/message/push", &PushRequest { to: user_id, messages: &messages })
            .await
            .map_err(TransportError::Push)
    }
}

/// Adapts the reply channel's push endpoint to the agent's notifier seam.
pub struct PushNotifier {
    channel: Arc<dyn ReplyChannel>,
}

impl PushNotifier {
    pub fn new(channel: Arc<dyn ReplyChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl UserNotifier for PushNotifier {
    async fn notify(&self, user_id: &str, text: &str) -> Result<()> {
        self.channel
            .push(user_id, vec![MessagePayload::text(text)])
            .await
            .map_err(|error| anyhow::anyhow!(error))
    }
}
