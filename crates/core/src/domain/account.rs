use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plans::PlanId;

/// Persistent billing/usage record for one LINE user. `usage_count` is only
/// meaningful while `usage_month` matches the current calendar month; a
/// stale month must be reset before any ceiling comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: String,
    pub subscribed: bool,
    pub plan_id: Option<PlanId>,
    pub usage_count: u32,
    pub usage_month: String,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            subscribed: false,
            plan_id: None,
            usage_count: 0,
            usage_month: month_key(now),
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Calendar-month bucket key, e.g. `2026-08`.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("user store unavailable: {0}")]
    Unavailable(String),
    #[error("user store decode failure: {0}")]
    Decode(String),
}

/// External entity store for user accounts. Billing-affecting callers must
/// treat any error as fatal for the turn; there is no default-allow.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError>;
    async fn find_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<UserAccount>, StoreError>;
    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError>;
}
