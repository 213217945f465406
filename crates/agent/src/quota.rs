use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use meshitomo_core::quota::{check_and_consume, QuotaDecision};
use meshitomo_core::{ApplicationError, PlanCatalog, UserStore};

/// Metering gate in front of every inbound message. Wraps the pure quota
/// decision with the entity-store read and the single persistence write it
/// prescribes. Store failures are loud: a broken store must never turn
/// into a default-allow.
pub struct QuotaLedger {
    store: Arc<dyn UserStore>,
    catalog: PlanCatalog,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn UserStore>, catalog: PlanCatalog) -> Self {
        Self { store, catalog }
    }

    pub fn plan_catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub async fn check_and_consume(
        &self,
        user_id: &str,
    ) -> Result<QuotaDecision, ApplicationError> {
        let existing = self
            .store
            .find(user_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let outcome = check_and_consume(existing, user_id, Utc::now(), &self.catalog);

        if let Some(account) = outcome.persist {
            let usage_count = account.usage_count;
            self.store
                .upsert(account)
                .await
                .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
            info!(
                event_name = "agent.quota.consumed",
                user_id = %user_id,
                usage_count,
                "usage counter advanced"
            );
        } else {
            info!(
                event_name = "agent.quota.denied",
                user_id = %user_id,
                "usage ceiling reached"
            );
        }

        Ok(outcome.decision)
    }
}
