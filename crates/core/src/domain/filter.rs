use serde::{Deserialize, Serialize};

/// Structured view of what the user is asking for, accumulated across a
/// refinement chain. Empty strings mean "not specified".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub location: String,
    pub genre: String,
    pub budget: String,
    pub keyword: String,
    /// こだわり条件 — free-form constraints that have no structured slot.
    pub preferences: String,
}

impl SearchFilter {
    /// Merge rule for refinement turns: a freshly extracted field wins only
    /// when non-empty, otherwise the accumulated value is retained.
    pub fn merged_onto(&self, previous: &SearchFilter) -> SearchFilter {
        SearchFilter {
            location: pick(&self.location, &previous.location),
            genre: pick(&self.genre, &previous.genre),
            budget: pick(&self.budget, &previous.budget),
            keyword: pick(&self.keyword, &previous.keyword),
            preferences: pick(&self.preferences, &previous.preferences),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.location.is_empty()
            && self.genre.is_empty()
            && self.budget.is_empty()
            && self.keyword.is_empty()
            && self.preferences.is_empty()
    }
}

fn pick(fresh: &str, accumulated: &str) -> String {
    if fresh.trim().is_empty() {
        accumulated.to_string()
    } else {
        fresh.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::SearchFilter;

    fn base() -> SearchFilter {
        SearchFilter {
            location: "渋谷".to_string(),
            genre: "焼肉".to_string(),
            budget: "安い".to_string(),
            keyword: String::new(),
            preferences: String::new(),
        }
    }

    #[test]
    fn empty_extraction_never_erases_prior_values() {
        let merged = SearchFilter::default().merged_onto(&base());
        assert_eq!(merged, base());
    }

    #[test]
    fn non_empty_fields_overwrite() {
        let fresh = SearchFilter { budget: "高級".to_string(), ..SearchFilter::default() };
        let merged = fresh.merged_onto(&base());
        assert_eq!(merged.budget, "高級");
        assert_eq!(merged.location, "渋谷");
        assert_eq!(merged.genre, "焼肉");
    }

    #[test]
    fn whitespace_only_counts_as_empty() {
        let fresh = SearchFilter { location: "  ".to_string(), ..SearchFilter::default() };
        assert_eq!(fresh.merged_onto(&base()).location, "渋谷");
    }
}
