pub mod account;
pub mod billing;
pub mod catalog;
pub mod enrich;
pub mod extractor;
pub mod llm;
pub mod pipeline;
pub mod quota;
pub mod runtime;
pub mod selection;
pub mod session;

pub use account::AccountActionHandler;
pub use billing::BillingClient;
pub use catalog::{CatalogQuery, ShopCatalog};
pub use enrich::Enricher;
pub use extractor::StructuredExtractor;
pub use llm::LlmClient;
pub use pipeline::RecommendationPipeline;
pub use quota::QuotaLedger;
pub use runtime::{AgentRuntime, UserNotifier};
pub use selection::CandidateSelector;
pub use session::{InMemorySessionStore, SessionRepository, SessionStoreError};
