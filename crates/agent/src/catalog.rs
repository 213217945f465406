use anyhow::Result;
use async_trait::async_trait;

use meshitomo_core::ShopRecord;

/// Search request for the restaurant catalog collaborator. Free text plus
/// optional structured code filters; empty fields are omitted from the
/// upstream query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub free_text: String,
    pub genre_code: Option<String>,
    pub budget_code: Option<String>,
}

/// Restaurant catalog collaborator. Pagination is the collaborator's
/// concern; the pipeline sees the capped full result set or nothing.
#[async_trait]
pub trait ShopCatalog: Send + Sync {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<ShopRecord>>;
}
