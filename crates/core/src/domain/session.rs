use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::domain::filter::SearchFilter;
use crate::domain::shop::ShopRecord;
use crate::errors::DomainError;

/// Per-user conversational state. Volatile: lives only as long as the
/// process, replaced wholesale when a genuinely new search arrives.
///
/// Invariant: every name in `shown` refers to a shop in `candidates`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    pub original_request: String,
    pub candidates: Vec<ShopRecord>,
    pub shown: BTreeSet<String>,
    pub filter: SearchFilter,
    pub started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(
        original_request: impl Into<String>,
        candidates: Vec<ShopRecord>,
        shown: impl IntoIterator<Item = String>,
        filter: SearchFilter,
    ) -> Result<Self, DomainError> {
        let session = Self {
            original_request: original_request.into(),
            candidates,
            shown: shown.into_iter().collect(),
            filter,
            started_at: Utc::now(),
        };
        session.check_shown_invariant()?;
        Ok(session)
    }

    /// Candidates not yet surfaced to the user, in catalog order.
    pub fn remaining(&self) -> Vec<&ShopRecord> {
        self.candidates.iter().filter(|shop| !self.shown.contains(&shop.name)).collect()
    }

    /// NextCandidate semantics: the shown set only ever grows.
    pub fn append_shown(
        &mut self,
        names: impl IntoIterator<Item = String>,
    ) -> Result<(), DomainError> {
        self.shown.extend(names);
        self.check_shown_invariant()
    }

    /// Refine semantics: the shown accounting restarts with the fresh
    /// selection even though the candidate pool is retained.
    pub fn replace_shown(
        &mut self,
        names: impl IntoIterator<Item = String>,
    ) -> Result<(), DomainError> {
        self.shown = names.into_iter().collect();
        self.check_shown_invariant()
    }

    /// Refinement text is folded into the running request so later prompts
    /// see the whole preference history.
    pub fn append_request(&mut self, text: &str) {
        self.original_request.push(' ');
        self.original_request.push_str(text);
    }

    fn check_shown_invariant(&self) -> Result<(), DomainError> {
        for name in &self.shown {
            if !self.candidates.iter().any(|shop| &shop.name == name) {
                return Err(DomainError::SessionInvariant(format!(
                    "shown shop `{name}` is not in the candidate pool"
                )));
            }
        }
        Ok(())
    }
}
