use std::sync::Arc;

use tracing::info;

use meshitomo_core::codes;
use meshitomo_core::{
    ApplicationError, RecommendedShop, Reply, SessionState, ShopRecord,
};

use crate::catalog::{CatalogQuery, ShopCatalog};
use crate::enrich::Enricher;
use crate::extractor::StructuredExtractor;
use crate::selection::CandidateSelector;
use crate::session::SessionRepository;

const NO_RESULTS_MESSAGE: &str = "条件に合うお店が見つかりませんでした🙏";
const NO_MATCH_MESSAGE: &str = "条件に近いお店が見つかりませんでした🙏";
const EXHAUSTED_MESSAGE: &str =
    "すでにすべてのお店をご紹介しました！また最初から条件を送ってください🙏";

/// Orchestrates one recommendation turn: extraction, catalog search or
/// pool reuse, model-driven selection, and per-shop enrichment. Session
/// state is only written after a turn fully succeeds, so recoverable
/// failures leave the conversation where it was.
pub struct RecommendationPipeline {
    extractor: StructuredExtractor,
    selector: CandidateSelector,
    enricher: Enricher,
    catalog: Arc<dyn ShopCatalog>,
    sessions: Arc<dyn SessionRepository>,
}

impl RecommendationPipeline {
    pub fn new(
        extractor: StructuredExtractor,
        selector: CandidateSelector,
        enricher: Enricher,
        catalog: Arc<dyn ShopCatalog>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self { extractor, selector, enricher, catalog, sessions }
    }

    /// A genuinely new request: fresh extraction, fresh catalog search,
    /// and a wholesale session replacement on success. Zero catalog
    /// results end the turn without touching any existing session.
    pub async fn new_search(&self, user_id: &str, text: &str) -> Result<Reply, ApplicationError> {
        let filter = self
            .extractor
            .extract(text, None)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        let query = CatalogQuery {
            free_text: free_text(&filter.location, &filter.keyword),
            genre_code: codes::genre_code(&filter.genre).map(str::to_string),
            budget_code: codes::budget_code(&filter.budget).map(str::to_string),
        };
        let pool = self
            .catalog
            .search(&query)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        info!(
            event_name = "agent.pipeline.catalog_searched",
            user_id = %user_id,
            result_count = pool.len(),
            genre_code = query.genre_code.as_deref().unwrap_or(""),
            "catalog search completed"
        );

        if pool.is_empty() {
            return Ok(Reply::Text(NO_RESULTS_MESSAGE.to_string()));
        }

        let mut selected = self
            .selector
            .select_new(text, &filter.keyword, &pool)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;
        if selected.is_empty() {
            return Ok(Reply::Text(NO_MATCH_MESSAGE.to_string()));
        }

        for shop in &mut selected {
            self.enricher.enrich(shop, None).await;
        }

        let mut pool = pool;
        write_back_enrichment(&mut pool, &selected);

        let shown = selected.iter().map(|shop| shop.name.clone()).collect::<Vec<_>>();
        let session = SessionState::new(text, pool, shown, filter)?;
        self.sessions
            .put(user_id, session)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        Ok(Reply::Shops {
            shops: selected.iter().map(RecommendedShop::from_record).collect(),
            offer_another: true,
        })
    }

    /// Refinement over the session's existing candidate pool: no catalog
    /// call, shown accounting restarts with the fresh selection, and the
    /// new preference text joins the running request.
    pub async fn refine(
        &self,
        user_id: &str,
        text: &str,
        session: SessionState,
    ) -> Result<Reply, ApplicationError> {
        let merged = self
            .extractor
            .extract(text, Some(&session.filter))
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;

        let mut selected = self
            .selector
            .select_refine(&session, text)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;
        if selected.is_empty() {
            return Ok(Reply::Text(NO_MATCH_MESSAGE.to_string()));
        }

        for shop in &mut selected {
            self.enricher.enrich(shop, Some(text)).await;
        }

        let mut session = session;
        session.filter = merged;
        write_back_enrichment(&mut session.candidates, &selected);
        session.replace_shown(selected.iter().map(|shop| shop.name.clone()))?;
        session.append_request(text);

        self.sessions
            .put(user_id, session)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        Ok(Reply::Shops {
            shops: selected.iter().map(RecommendedShop::from_record).collect(),
            offer_another: false,
        })
    }

    /// Show-me-another: choose from the not-yet-shown remainder only. An
    /// empty remainder is the exhaustion answer and consumes nothing.
    pub async fn next_candidate(
        &self,
        user_id: &str,
        session: SessionState,
    ) -> Result<Reply, ApplicationError> {
        if session.remaining().is_empty() {
            return Ok(Reply::Text(EXHAUSTED_MESSAGE.to_string()));
        }

        let mut selected = self
            .selector
            .select_next(&session)
            .await
            .map_err(|error| ApplicationError::Collaborator(error.to_string()))?;
        if selected.is_empty() {
            return Ok(Reply::Text(NO_MATCH_MESSAGE.to_string()));
        }

        for shop in &mut selected {
            self.enricher.enrich(shop, None).await;
        }

        let mut session = session;
        write_back_enrichment(&mut session.candidates, &selected);
        session.append_shown(selected.iter().map(|shop| shop.name.clone()))?;

        self.sessions
            .put(user_id, session)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;

        Ok(Reply::Shops {
            shops: selected.iter().map(RecommendedShop::from_record).collect(),
            offer_another: false,
        })
    }
}

fn free_text(location: &str, keyword: &str) -> String {
    [location, keyword]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Enrichment mutates the shops shown to the user; the session pool keeps
/// the same records, so a later turn sees the generated content too.
fn write_back_enrichment(pool: &mut [ShopRecord], enriched: &[ShopRecord]) {
    for shop in enriched {
        if let Some(stored) = pool.iter_mut().find(|candidate| candidate.name == shop.name) {
            *stored = shop.clone();
        }
    }
}
