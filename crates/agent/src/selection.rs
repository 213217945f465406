use std::sync::Arc;

use anyhow::Result;

use meshitomo_core::parse::all_labeled_values;
use meshitomo_core::{SessionState, ShopRecord};

use crate::llm::LlmClient;

/// Asks the model to pick shops from a candidate pool by name and resolves
/// the emitted names back onto the pool. Everything the model says that is
/// not a resolvable `店名:` line is ignored; an empty resolution is the
/// caller's recoverable no-match case, never an error.
pub struct CandidateSelector {
    llm: Arc<dyn LlmClient>,
    pick_limit: u32,
}

impl CandidateSelector {
    pub fn new(llm: Arc<dyn LlmClient>, pick_limit: u32) -> Self {
        Self { llm, pick_limit: pick_limit.max(1) }
    }

    /// Fresh-search selection over the full catalog result set.
    pub async fn select_new(
        &self,
        request_text: &str,
        keyword: &str,
        pool: &[ShopRecord],
    ) -> Result<Vec<ShopRecord>> {
        let keyword_clause = if keyword.trim().is_empty() {
            String::new()
        } else {
            format!("できれば「{keyword}」の要素が入っているものを優先してください。")
        };
        let prompt = format!(
            "ユーザーの希望は「{request_text}」です。以下のお店から希望に合いそうな{limit}件を選んでください。{keyword_clause}\n形式：\n- 店名: ○○○\n- 理由: ○○○",
            limit = self.pick_limit,
        );
        self.pick(&prompt, pool).await
    }

    /// Refinement selection: same candidate pool as the original search,
    /// genre pinned to what the session was built from.
    pub async fn select_refine(
        &self,
        session: &SessionState,
        new_text: &str,
    ) -> Result<Vec<ShopRecord>> {
        let location = &session.filter.location;
        let genre = &session.filter.genre;
        let prompt = format!(
            "前回の検索場所: {location}\n前回の検索ジャンル: {genre}\n（ジャンルは必ず「{genre}」の範囲で選んでください）\n追加のご希望: {new_text}\n\n上記をもとに、以下の店舗リストから{limit}件選び、理由を添えてください。\n形式：\n- 店名: ○○○\n- 理由: ○○○",
            limit = self.pick_limit,
        );
        self.pick(&prompt, &session.candidates).await
    }

    /// Next-candidate selection, restricted to shops not yet shown.
    pub async fn select_next(&self, session: &SessionState) -> Result<Vec<ShopRecord>> {
        let remaining: Vec<ShopRecord> = session.remaining().into_iter().cloned().collect();
        let prompt = format!(
            "ユーザーの希望は「{request}」です。\n場所「{location}」・ジャンル「{genre}」・キーワード「{keyword}」の条件は変えずに、以下の残り候補から違う{limit}件を選び、理由を添えてください。\n形式：\n- 店名: ○○\n- 理由: ○○",
            request = session.original_request,
            location = session.filter.location,
            genre = session.filter.genre,
            keyword = session.filter.keyword,
            limit = self.pick_limit,
        );
        self.pick(&prompt, &remaining).await
    }

    async fn pick(&self, prompt: &str, pool: &[ShopRecord]) -> Result<Vec<ShopRecord>> {
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        let response = self.llm.complete(prompt, &shop_list(pool)).await?;
        let emitted = all_labeled_values(&response, "店名");
        Ok(match_in_pool(pool, &emitted))
    }
}

fn shop_list(pool: &[ShopRecord]) -> String {
    pool.iter()
        .map(|shop| format!("店名: {} / 紹介: {}", shop.name, shop.catch_phrase))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve emitted names onto the pool, preserving pool order and dropping
/// duplicates. Comparison strips whitespace and decorative quotes so that
/// `《炭火焼肉 とら》` still finds `炭火焼肉 とら`.
pub fn match_in_pool(pool: &[ShopRecord], emitted: &[String]) -> Vec<ShopRecord> {
    let normalized_emitted: Vec<String> =
        emitted.iter().map(|name| normalize_name(name)).filter(|name| !name.is_empty()).collect();

    pool.iter()
        .filter(|shop| {
            let pool_name = normalize_name(&shop.name);
            normalized_emitted.iter().any(|candidate| {
                candidate == &pool_name
                    || pool_name.contains(candidate.as_str())
                    || candidate.contains(pool_name.as_str())
            })
        })
        .cloned()
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace() && !matches!(ch, '《' | '》' | '「' | '」' | '『' | '』'))
        .collect()
}
