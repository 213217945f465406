use anyhow::Result;
use async_trait::async_trait;

use meshitomo_core::plans::PlanId;

/// Payment collaborator: link creation only. Subscription state changes
/// arrive asynchronously through the provider's webhook, not through this
/// trait.
#[async_trait]
pub trait BillingClient: Send + Sync {
    /// Checkout URL for subscribing the given user to the given plan.
    async fn checkout_link(&self, user_id: &str, plan_id: &PlanId) -> Result<String>;

    /// Self-service billing portal URL for an existing customer.
    async fn portal_link(&self, customer_ref: &str) -> Result<String>;
}
