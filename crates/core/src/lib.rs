pub mod codes;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod parse;
pub mod plans;
pub mod quota;

pub use domain::account::{month_key, StoreError, UserAccount, UserStore};
pub use domain::filter::SearchFilter;
pub use domain::reply::{PlanOffer, RecommendedShop, Reply};
pub use domain::session::SessionState;
pub use domain::shop::ShopRecord;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intent::{Intent, Lexicons};
pub use parse::{BracketSections, LabeledLines};
pub use plans::{Plan, PlanCatalog, PlanId, UsageCeiling};
pub use quota::{check_and_consume, QuotaDecision, QuotaOutcome};
