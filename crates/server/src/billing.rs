use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::Sha256;

use meshitomo_agent::BillingClient;
use meshitomo_core::config::BillingConfig;
use meshitomo_core::plans::PlanId;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_RETURN_URL: &str = "https://line.me/R/";

/// Stripe link factory: checkout sessions for plan sign-up and billing
/// portal sessions for cancellation. Subscription state itself flows back
/// through the webhook, never through these calls.
pub struct StripeBilling {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    prices: HashMap<String, String>,
    return_url: String,
}

impl StripeBilling {
    pub fn from_config(config: &BillingConfig) -> Result<Self> {
        let api_key =
            config.api_key.clone().ok_or_else(|| anyhow!("billing.api_key is not configured"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building billing http client")?;

        Ok(Self {
            http,
            api_key,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            prices: config.prices.clone(),
            return_url: config
                .portal_return_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RETURN_URL.to_string()),
        })
    }

    async fn create_session(&self, path: &str, form: &[(String, String)]) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .basic_auth(self.api_key.expose_secret(), Option::<&str>::None)
            .form(form)
            .send()
            .await
            .context("billing request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("billing api returned {status}: {body}"));
        }

        let payload: Value = response.json().await.context("billing body was not JSON")?;
        payload["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("billing session response carried no url"))
    }
}

#[async_trait]
impl BillingClient for StripeBilling {
    async fn checkout_link(&self, user_id: &str, plan_id: &PlanId) -> Result<String> {
        let price = self
            .prices
            .get(&plan_id.0)
            .ok_or_else(|| anyhow!("no price configured for plan `{}`", plan_id.0))?;

        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("line_items[0][price]".to_string(), price.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("client_reference_id".to_string(), user_id.to_string()),
            ("metadata[line_user_id]".to_string(), user_id.to_string()),
            ("metadata[plan_id]".to_string(), plan_id.0.clone()),
            ("success_url".to_string(), self.return_url.clone()),
            ("cancel_url".to_string(), self.return_url.clone()),
        ];
        self.create_session("/v1/checkout/sessions", &form).await
    }

    async fn portal_link(&self, customer_ref: &str) -> Result<String> {
        let form = vec![
            ("customer".to_string(), customer_ref.to_string()),
            ("return_url".to_string(), self.return_url.clone()),
        ];
        self.create_session("/v1/billing_portal/sessions", &form).await
    }
}

/// A subscription transition decoded from a provider webhook event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub user_id: Option<String>,
    pub customer_ref: String,
    pub plan_id: Option<PlanId>,
    pub active: bool,
}

/// Decode the webhook events we act on; everything else is `None` and gets
/// acknowledged without side effects.
pub fn parse_subscription_change(body: &str) -> Option<SubscriptionChange> {
    let event: Value = serde_json::from_str(body).ok()?;
    let object = &event["data"]["object"];

    match event["type"].as_str()? {
        "checkout.session.completed" => Some(SubscriptionChange {
            user_id: object["metadata"]["line_user_id"]
                .as_str()
                .or_else(|| object["client_reference_id"].as_str())
                .map(str::to_string),
            customer_ref: object["customer"].as_str()?.to_string(),
            plan_id: object["metadata"]["plan_id"].as_str().map(PlanId::new),
            active: true,
        }),
        "customer.subscription.deleted" => Some(SubscriptionChange {
            user_id: None,
            customer_ref: object["customer"].as_str()?.to_string(),
            plan_id: None,
            active: false,
        }),
        _ => None,
    }
}

/// Verify a `Stripe-Signature` header (`t=...,v1=...`) against the raw
/// body. Any malformed header fails closed.
pub fn verify_stripe_signature(secret: &str, body: &str, header: &str) -> bool {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value.to_string()),
            Some(("v1", value)) => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let Some(timestamp) = timestamp else {
        return false;
    };
    if signatures.is_empty() {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{timestamp}.{body}").as_bytes());
    let expected = hex_encode(mac.finalize().into_bytes().as_slice());

    signatures.iter().any(|signature| signature == &expected)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}
