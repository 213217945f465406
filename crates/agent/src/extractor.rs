use std::sync::Arc;

use anyhow::Result;

use meshitomo_core::{LabeledLines, SearchFilter};

use crate::llm::LlmClient;

const EXTRACT_PROMPT: &str =
    "次の日本語文から以下を抽出してください：\n場所:\nジャンル:\n予算:\nキーワード:\nこだわり条件:";

const FILTER_LABELS: &[&str] = &["場所", "ジャンル", "予算", "キーワード", "こだわり条件"];

/// Turns free text into a partial [`SearchFilter`] via the language model.
/// The model's labeled-line response is parsed tolerantly; a label the
/// model dropped simply leaves that field empty.
pub struct StructuredExtractor {
    llm: Arc<dyn LlmClient>,
}

impl StructuredExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Extract a filter from `text`. With `previous` given, fields merge
    /// under the overwrite-if-non-empty rule so a refinement chain only
    /// accumulates.
    pub async fn extract(
        &self,
        text: &str,
        previous: Option<&SearchFilter>,
    ) -> Result<SearchFilter> {
        let response = self.llm.complete(EXTRACT_PROMPT, text).await?;
        let fresh = parse_filter(&response);

        Ok(match previous {
            Some(previous) => fresh.merged_onto(previous),
            None => fresh,
        })
    }
}

fn parse_filter(response: &str) -> SearchFilter {
    let lines = LabeledLines::parse(response, FILTER_LABELS);
    SearchFilter {
        location: lines.value("場所"),
        genre: lines.value("ジャンル"),
        budget: lines.value("予算"),
        keyword: lines.value("キーワード"),
        preferences: lines.value("こだわり条件"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use meshitomo_core::SearchFilter;

    use super::StructuredExtractor;
    use crate::llm::LlmClient;

    struct ScriptedLlm {
        response: String,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _system_prompt: &str, _user_content: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    fn extractor(response: &str) -> StructuredExtractor {
        StructuredExtractor::new(Arc::new(ScriptedLlm { response: response.to_string() }))
    }

    #[tokio::test]
    async fn extracts_labeled_fields() {
        let extractor = extractor("場所: 渋谷\nジャンル: 焼肉\n予算: 安い\nキーワード:\n");
        let filter = extractor.extract("渋谷で安い焼肉", None).await.expect("extract");

        assert_eq!(filter.location, "渋谷");
        assert_eq!(filter.genre, "焼肉");
        assert_eq!(filter.budget, "安い");
        assert_eq!(filter.keyword, "");
    }

    #[tokio::test]
    async fn merge_keeps_previous_values_for_empty_fields() {
        let previous = SearchFilter {
            location: "渋谷".to_string(),
            genre: "焼肉".to_string(),
            budget: "安い".to_string(),
            keyword: String::new(),
            preferences: String::new(),
        };

        let extractor = extractor("こだわり条件: 静かな個室\n");
        let merged =
            extractor.extract("もっと静かな店", Some(&previous)).await.expect("extract");

        assert_eq!(merged.location, "渋谷");
        assert_eq!(merged.genre, "焼肉");
        assert_eq!(merged.budget, "安い");
        assert_eq!(merged.preferences, "静かな個室");
    }

    #[tokio::test]
    async fn commentary_only_response_yields_empty_filter() {
        let extractor = extractor("条件が読み取れませんでした。");
        let filter = extractor.extract("んー", None).await.expect("extract");
        assert!(filter.is_empty());
    }
}
