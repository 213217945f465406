use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use meshitomo_core::plans::PlanId;
use meshitomo_core::{
    month_key, ApplicationError, DomainError, PlanCatalog, Reply, UserAccount, UserStore,
};

use crate::billing::BillingClient;

/// Cancellation, plan-change, and plan-selection flows, plus the inbound
/// subscription-change notification from the payment collaborator.
pub struct AccountActionHandler {
    store: Arc<dyn UserStore>,
    billing: Arc<dyn BillingClient>,
    catalog: PlanCatalog,
}

impl AccountActionHandler {
    pub fn new(
        store: Arc<dyn UserStore>,
        billing: Arc<dyn BillingClient>,
        catalog: PlanCatalog,
    ) -> Self {
        Self { store, billing, catalog }
    }

    /// Cancel intent: hand the user their billing-portal URL. Without a
    /// recorded customer reference there is nothing to cancel, which is a
    /// user-level answer rather than an error.
    pub async fn cancel(&self, user_id: &str) -> Result<Reply, ApplicationError> {
        let account = self
            .store
            .find(user_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        let Some(customer_ref) = account.and_then(|account| account.stripe_customer_id) else {
            return Ok(Reply::Text(
                "現在ご契約中のプランが見つかりませんでした。解約のお手続きは不要です🙏".to_string(),
            ));
        };

        let url = self
            .billing
            .portal_link(&customer_ref)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        Ok(Reply::Link { message: "解約のお手続きはこちらから行えます👇".to_string(), url })
    }

    /// ChangePlan intent: present the static plan catalog as options.
    pub fn plan_menu(&self) -> Reply {
        Reply::PlanMenu {
            message: "ご希望のプランをお選びください👇".to_string(),
            offers: self.catalog.offers(),
        }
    }

    /// A plan was chosen from the menu: answer with its checkout URL.
    pub async fn select_plan(
        &self,
        user_id: &str,
        plan_id: &PlanId,
    ) -> Result<Reply, ApplicationError> {
        let Some(plan) = self.catalog.get(plan_id) else {
            return Err(DomainError::UnknownPlan(plan_id.0.clone()).into());
        };

        let url = self
            .billing
            .checkout_link(user_id, plan_id)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        Ok(Reply::Link {
            message: format!("{}のお申し込みはこちらから👇", plan.label),
            url,
        })
    }

    /// Subscription lifecycle notification from the payment provider. May
    /// arrive multiple times for the same transition; re-applying it
    /// produces the same stored state (the update timestamp aside).
    pub async fn subscription_changed(
        &self,
        user_id: Option<&str>,
        customer_ref: &str,
        plan_id: Option<PlanId>,
        active: bool,
    ) -> Result<(), ApplicationError> {
        let persistence = |error: meshitomo_core::StoreError| {
            ApplicationError::Persistence(error.to_string())
        };

        let existing = match user_id {
            Some(user_id) => self.store.find(user_id).await.map_err(persistence)?,
            None => None,
        };
        let existing = match existing {
            Some(account) => Some(account),
            None => self.store.find_by_customer_ref(customer_ref).await.map_err(persistence)?,
        };

        let now = Utc::now();
        let mut account = match (existing, user_id) {
            (Some(account), _) => account,
            (None, Some(user_id)) => UserAccount::new(user_id, now),
            (None, None) => {
                // Deactivation for a customer we never recorded: nothing to
                // update, and replaying it stays a no-op.
                info!(
                    event_name = "agent.account.subscription_change_unmatched",
                    customer_ref = %customer_ref,
                    active,
                    "subscription change for unknown customer ignored"
                );
                return Ok(());
            }
        };

        account.subscribed = active;
        account.plan_id = if active { plan_id } else { None };
        account.stripe_customer_id = Some(customer_ref.to_string());
        account.usage_count = 0;
        account.usage_month = month_key(now);
        account.updated_at = now;

        let log_user_id = account.user_id.clone();
        self.store.upsert(account).await.map_err(persistence)?;
        info!(
            event_name = "agent.account.subscription_changed",
            user_id = %log_user_id,
            customer_ref = %customer_ref,
            active,
            "subscription state applied"
        );
        Ok(())
    }
}
