use serde::{Deserialize, Serialize};

use crate::domain::shop::ShopRecord;
use crate::plans::PlanId;

/// One plan presented as a selectable option in an upsell or plan-change
/// reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOffer {
    pub id: PlanId,
    pub label: String,
}

/// Presentation data for one recommended shop, fully resolved: every field
/// here is ready to display, placeholders already applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendedShop {
    pub name: String,
    pub tags: String,
    pub intro: String,
    pub highlight: String,
    pub price_band: String,
    pub smoking: String,
    pub address: String,
    pub detail_url: String,
    pub photo_url: Option<String>,
}

impl RecommendedShop {
    pub fn from_record(record: &ShopRecord) -> Self {
        Self {
            name: record.name.clone(),
            tags: record.tags.clone().unwrap_or_default(),
            intro: record
                .intro
                .clone()
                .unwrap_or_else(|| "雰囲気の良いおすすめ店です。".to_string()),
            highlight: record
                .highlight
                .clone()
                .unwrap_or_else(|| "料理のおすすめ情報は取得できませんでした。".to_string()),
            price_band: record.price_band_label().to_string(),
            smoking: record.smoking_label().to_string(),
            address: record.address_label().to_string(),
            detail_url: record.detail_url.clone(),
            photo_url: record.photo_url.clone(),
        }
    }
}

/// What a handled turn sends back to the user. The transport crate decides
/// how each variant renders (text bubble, flex carousel, buttons).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Recommended shops; `offer_another` adds the 違う店 quick reply.
    Shops { shops: Vec<RecommendedShop>, offer_another: bool },
    /// Plan options, used both for the quota upsell and the plan-change
    /// menu.
    PlanMenu { message: String, offers: Vec<PlanOffer> },
    /// A billing URL (checkout or portal) with a lead-in sentence.
    Link { message: String, url: String },
}

#[cfg(test)]
mod tests {
    use super::RecommendedShop;
    use crate::domain::shop::ShopRecord;

    #[test]
    fn unenriched_record_falls_back_to_placeholders() {
        let record = ShopRecord {
            name: "大衆酒場 まる".to_string(),
            genre: "居酒屋".to_string(),
            budget: "謎".to_string(),
            address: String::new(),
            smoking: None,
            photo_url: None,
            detail_url: "https://example.com".to_string(),
            catch_phrase: String::new(),
            open_hours: None,
            intro: None,
            highlight: None,
            tags: None,
        };

        let shop = RecommendedShop::from_record(&record);
        assert_eq!(shop.intro, "雰囲気の良いおすすめ店です。");
        assert_eq!(shop.highlight, "料理のおすすめ情報は取得できませんでした。");
        assert_eq!(shop.price_band, "情報未定");
        assert_eq!(shop.smoking, "喫煙情報なし");
        assert_eq!(shop.address, "住所情報なし");
        assert!(shop.tags.is_empty());
    }
}
