use std::sync::Arc;

use tracing::warn;

use meshitomo_core::{BracketSections, ShopRecord};

use crate::llm::LlmClient;

const INTRO_PROMPT: &str = "以下の飲食店情報をもとに、【紹介文】と【おすすめの一品】をユーザーの印象に残るよう魅力的に自然な日本語で簡潔に生成してください。また、ユーザーが一目で見やすいように紹介文を工夫してください。\n▼出力フォーマット：\n【紹介文】\n・店名のあとには必ず改行し、次の説明文へ\n・顔文字や絵文字も1つ添えると魅力的です\n・全体で2行以内を目安にまとめてください\n・店名を《店名》で囲ってください\n\n【おすすめの一品】\n・料理名のあとに必ず改行し、次の説明文へ\n・全体で1行以内を目安にまとめてください\n・料理名を《料理名》で囲ってください";

const SHOP_TAGS_PROMPT: &str = "以下の飲食店情報から、Instagram風のハッシュタグとして使える、もっとも最適なそのお店の特徴をキーワードを3つ日本語で抽出してください。\n#記号をつけて1行で出力してください（例：#デート #夜景 #コスパ）";

const PREFERENCE_TAGS_PROMPT: &str = "以下のユーザー希望から、ハッシュタグにできるキーワードを1〜2個だけ日本語で抽出してください。#記号付き・1行（例：#個室 #おしゃれ）";

const DEFAULT_INTRO: &str = "雰囲気の良いおすすめ店です。";
const DEFAULT_HIGHLIGHT: &str = "料理のおすすめ情報は取得できませんでした。";
const DEFAULT_TAGS: &str = "#おすすめ";

/// Generates per-shop presentation content: intro, highlighted dish, and
/// hashtag-style tags. Enrichment never fails a turn — every model error or
/// unparsable response degrades to a field default.
pub struct Enricher {
    llm: Arc<dyn LlmClient>,
}

impl Enricher {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Fill `intro`, `highlight`, and `tags` in place. When
    /// `preference_text` is given (refinement turns), tags additionally
    /// reflect the user's stated preference.
    pub async fn enrich(&self, shop: &mut ShopRecord, preference_text: Option<&str>) {
        let (intro, highlight) = self.intro_and_highlight(shop).await;
        shop.intro = Some(intro);
        shop.highlight = Some(highlight);
        shop.tags = Some(self.tags(shop, preference_text).await);
    }

    async fn intro_and_highlight(&self, shop: &ShopRecord) -> (String, String) {
        match self.llm.complete(INTRO_PROMPT, &shop_profile(shop, true)).await {
            Ok(response) => {
                let sections = BracketSections::parse(&response);
                (
                    sections.get_or("紹介文", DEFAULT_INTRO).to_string(),
                    sections.get_or("おすすめの一品", DEFAULT_HIGHLIGHT).to_string(),
                )
            }
            Err(error) => {
                warn!(
                    event_name = "agent.enrich.intro_degraded",
                    shop_name = %shop.name,
                    error = %error,
                    "intro generation failed, using placeholders"
                );
                (DEFAULT_INTRO.to_string(), DEFAULT_HIGHLIGHT.to_string())
            }
        }
    }

    async fn tags(&self, shop: &ShopRecord, preference_text: Option<&str>) -> String {
        let shop_tags = match self.llm.complete(SHOP_TAGS_PROMPT, &shop_profile(shop, false)).await
        {
            Ok(response) => response.trim().to_string(),
            Err(error) => {
                warn!(
                    event_name = "agent.enrich.tags_degraded",
                    shop_name = %shop.name,
                    error = %error,
                    "shop tag generation failed"
                );
                String::new()
            }
        };

        let preference_tags = match preference_text {
            Some(text) => match self.llm.complete(PREFERENCE_TAGS_PROMPT, text).await {
                Ok(response) => response.trim().to_string(),
                Err(_) => String::new(),
            },
            None => String::new(),
        };

        let combined = format!("{preference_tags} {shop_tags}").trim().to_string();
        if combined.is_empty() {
            DEFAULT_TAGS.to_string()
        } else {
            combined
        }
    }
}

fn shop_profile(shop: &ShopRecord, with_hours: bool) -> String {
    let mut profile = format!(
        "店名: {}\nジャンル: {}\n紹介: {}\n予算: {}",
        shop.name, shop.genre, shop.catch_phrase, shop.budget,
    );
    if with_hours {
        if let Some(hours) = &shop.open_hours {
            profile.push_str("\n営業時間: ");
            profile.push_str(hours);
        }
    }
    profile
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use meshitomo_core::ShopRecord;

    use super::Enricher;
    use crate::llm::LlmClient;

    /// Answers the intro prompt and the tag prompt differently, or fails
    /// every call.
    struct ScriptedLlm {
        intro_response: Option<String>,
        tag_response: Option<String>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system_prompt: &str, _user_content: &str) -> Result<String> {
            let scripted = if system_prompt.contains("【紹介文】") {
                &self.intro_response
            } else {
                &self.tag_response
            };
            scripted.clone().ok_or_else(|| anyhow!("model unavailable"))
        }
    }

    fn shop() -> ShopRecord {
        ShopRecord {
            name: "炭火焼肉 とら".to_string(),
            genre: "焼肉・ホルモン".to_string(),
            budget: "3001〜4000円".to_string(),
            address: "東京都渋谷区".to_string(),
            smoking: None,
            photo_url: None,
            detail_url: "https://example.com".to_string(),
            catch_phrase: "厳選和牛を炭火で".to_string(),
            open_hours: Some("17:00〜23:00".to_string()),
            intro: None,
            highlight: None,
            tags: None,
        }
    }

    #[tokio::test]
    async fn enrichment_fills_all_generated_fields() {
        let enricher = Enricher::new(Arc::new(ScriptedLlm {
            intro_response: Some(
                "【紹介文】\n《炭火焼肉 とら》\n落ち着いた店内です🔥\n【おすすめの一品】\n《特選カルビ》\nとろける味わい"
                    .to_string(),
            ),
            tag_response: Some("#焼肉 #渋谷 #デート".to_string()),
        }));

        let mut record = shop();
        enricher.enrich(&mut record, None).await;

        assert!(record.intro.as_deref().is_some_and(|intro| intro.contains("炭火焼肉")));
        assert!(record.highlight.as_deref().is_some_and(|item| item.contains("特選カルビ")));
        assert_eq!(record.tags.as_deref(), Some("#焼肉 #渋谷 #デート"));
    }

    #[tokio::test]
    async fn model_failure_degrades_to_placeholders() {
        let enricher =
            Enricher::new(Arc::new(ScriptedLlm { intro_response: None, tag_response: None }));

        let mut record = shop();
        enricher.enrich(&mut record, None).await;

        assert_eq!(record.intro.as_deref(), Some("雰囲気の良いおすすめ店です。"));
        assert_eq!(
            record.highlight.as_deref(),
            Some("料理のおすすめ情報は取得できませんでした。")
        );
        assert_eq!(record.tags.as_deref(), Some("#おすすめ"));
    }

    #[tokio::test]
    async fn missing_sections_fall_back_per_field() {
        let enricher = Enricher::new(Arc::new(ScriptedLlm {
            intro_response: Some("【紹介文】\n《炭火焼肉 とら》は良い店".to_string()),
            tag_response: Some(String::new()),
        }));

        let mut record = shop();
        enricher.enrich(&mut record, None).await;

        assert!(record.intro.as_deref().is_some_and(|intro| intro.contains("良い店")));
        assert_eq!(
            record.highlight.as_deref(),
            Some("料理のおすすめ情報は取得できませんでした。")
        );
        assert_eq!(record.tags.as_deref(), Some("#おすすめ"));
    }

    #[tokio::test]
    async fn preference_text_prepends_user_tags() {
        let enricher = Enricher::new(Arc::new(ScriptedLlm {
            intro_response: Some("【紹介文】良い店\n【おすすめの一品】名物".to_string()),
            tag_response: Some("#個室".to_string()),
        }));

        let mut record = shop();
        enricher.enrich(&mut record, Some("もっと静かな店")).await;

        // Both tag calls are scripted with the same response here; the
        // point is that the combination is non-empty and space-joined.
        assert_eq!(record.tags.as_deref(), Some("#個室 #個室"));
    }
}
