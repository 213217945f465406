use serde::{Deserialize, Serialize};

use crate::domain::reply::PlanOffer;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageCeiling {
    Limited(u32),
    Unlimited,
}

impl UsageCeiling {
    pub fn allows(&self, usage_count: u32) -> bool {
        match self {
            Self::Limited(ceiling) => usage_count < *ceiling,
            Self::Unlimited => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub label: String,
    pub ceiling: UsageCeiling,
}

/// Static, process-wide plan configuration. Unsubscribed users fall outside
/// the catalog and get the single free introduction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

/// Ceiling for users with no active subscription: the first introduction is
/// free, everything after it is gated.
pub const FREE_CEILING: u32 = 1;

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            plans: vec![
                Plan {
                    id: PlanId::new("light"),
                    label: "ライトプラン（月30回）".to_string(),
                    ceiling: UsageCeiling::Limited(30),
                },
                Plan {
                    id: PlanId::new("standard"),
                    label: "スタンダードプラン（月100回）".to_string(),
                    ceiling: UsageCeiling::Limited(100),
                },
                Plan {
                    id: PlanId::new("premium"),
                    label: "プレミアムプラン（無制限）".to_string(),
                    ceiling: UsageCeiling::Unlimited,
                },
            ],
        }
    }
}

impl PlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    pub fn get(&self, id: &PlanId) -> Option<&Plan> {
        self.plans.iter().find(|plan| &plan.id == id)
    }

    /// Resolve the usage ceiling for an account. An unknown or missing plan
    /// on a subscribed account falls back to the free ceiling rather than
    /// granting unlimited use.
    pub fn ceiling_for(&self, subscribed: bool, plan_id: Option<&PlanId>) -> UsageCeiling {
        if !subscribed {
            return UsageCeiling::Limited(FREE_CEILING);
        }
        plan_id
            .and_then(|id| self.get(id))
            .map(|plan| plan.ceiling)
            .unwrap_or(UsageCeiling::Limited(FREE_CEILING))
    }

    /// The enumerated upsell choices, in catalog order.
    pub fn offers(&self) -> Vec<PlanOffer> {
        self.plans
            .iter()
            .map(|plan| PlanOffer { id: plan.id.clone(), label: plan.label.clone() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{PlanCatalog, PlanId, UsageCeiling, FREE_CEILING};

    #[test]
    fn unsubscribed_users_get_the_free_ceiling() {
        let catalog = PlanCatalog::default();
        let ceiling = catalog.ceiling_for(false, Some(&PlanId::new("premium")));
        assert_eq!(ceiling, UsageCeiling::Limited(FREE_CEILING));
    }

    #[test]
    fn subscribed_unknown_plan_does_not_grant_unlimited() {
        let catalog = PlanCatalog::default();
        let ceiling = catalog.ceiling_for(true, Some(&PlanId::new("legacy-gold")));
        assert_eq!(ceiling, UsageCeiling::Limited(FREE_CEILING));
    }

    #[test]
    fn unlimited_ceiling_always_allows() {
        assert!(UsageCeiling::Unlimited.allows(u32::MAX));
        assert!(UsageCeiling::Limited(2).allows(1));
        assert!(!UsageCeiling::Limited(2).allows(2));
    }

    #[test]
    fn offers_enumerate_every_plan_in_order() {
        let offers = PlanCatalog::default().offers();
        let ids: Vec<_> = offers.iter().map(|offer| offer.id.0.as_str()).collect();
        assert_eq!(ids, vec!["light", "standard", "premium"]);
    }
}
