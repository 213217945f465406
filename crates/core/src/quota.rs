use chrono::{DateTime, Utc};

use crate::domain::account::{month_key, UserAccount};
use crate::domain::reply::PlanOffer;
use crate::plans::PlanCatalog;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny { offers: Vec<PlanOffer> },
}

/// Result of one metering check. `persist` is the single account row the
/// caller must write — creation, combined reset-and-consume, or plain
/// consume. A deny writes nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotaOutcome {
    pub decision: QuotaDecision,
    pub persist: Option<UserAccount>,
}

/// Pure quota decision over the stored counters. The first message from an
/// unknown user is always allowed and counted; a stale `usage_month` is
/// reset before the ceiling comparison, folded into the same write as the
/// consume so the check stays a single persistence operation.
pub fn check_and_consume(
    existing: Option<UserAccount>,
    user_id: &str,
    now: DateTime<Utc>,
    catalog: &PlanCatalog,
) -> QuotaOutcome {
    let Some(mut account) = existing else {
        let mut account = UserAccount::new(user_id, now);
        account.usage_count = 1;
        return QuotaOutcome { decision: QuotaDecision::Allow, persist: Some(account) };
    };

    let current_month = month_key(now);
    if account.usage_month != current_month {
        account.usage_count = 0;
        account.usage_month = current_month;
    }

    let ceiling = catalog.ceiling_for(account.subscribed, account.plan_id.as_ref());
    if !ceiling.allows(account.usage_count) {
        return QuotaOutcome {
            decision: QuotaDecision::Deny { offers: catalog.offers() },
            persist: None,
        };
    }

    account.usage_count += 1;
    account.updated_at = now;
    QuotaOutcome { decision: QuotaDecision::Allow, persist: Some(account) }
}
