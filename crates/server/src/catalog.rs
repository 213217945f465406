use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use meshitomo_agent::{CatalogQuery, ShopCatalog};
use meshitomo_core::config::HotpepperConfig;
use meshitomo_core::ShopRecord;

/// Hot Pepper gourmet search client. Pages through the API in fixed steps
/// until the result cap or an empty page, and flattens everything into the
/// pipeline's capped full result set.
pub struct HotpepperCatalog {
    http: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    page_size: u32,
    result_cap: u32,
}

impl HotpepperCatalog {
    pub fn from_config(config: &HotpepperConfig) -> Result<Self> {
        let api_key =
            config.api_key.clone().ok_or_else(|| anyhow!("hotpepper.api_key is not configured"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building catalog http client")?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.clone(),
            page_size: config.page_size.max(1),
            result_cap: config.result_cap.max(1),
        })
    }

    async fn fetch_page(&self, query: &CatalogQuery, start: u32) -> Result<Vec<ShopRecord>> {
        let mut params: Vec<(&str, String)> = vec![
            ("key", self.api_key.expose_secret().to_string()),
            ("format", "json".to_string()),
            ("count", self.page_size.to_string()),
            ("start", start.to_string()),
        ];
        if !query.free_text.trim().is_empty() {
            params.push(("keyword", query.free_text.clone()));
        }
        if let Some(genre_code) = &query.genre_code {
            params.push(("genre", genre_code.clone()));
        }
        if let Some(budget_code) = &query.budget_code {
            params.push(("budget", budget_code.clone()));
        }

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .context("catalog request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("catalog returned {status}"));
        }

        let payload: Value = response.json().await.context("catalog body was not JSON")?;
        Ok(parse_shops(&payload))
    }
}

#[async_trait]
impl ShopCatalog for HotpepperCatalog {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<ShopRecord>> {
        let mut all = Vec::new();
        let mut start = 1u32;

        while start <= self.result_cap {
            let page = self.fetch_page(query, start).await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            all.extend(page);
            debug!(
                event_name = "catalog.hotpepper.page_fetched",
                start,
                page_len,
                total = all.len(),
                "catalog page fetched"
            );
            start += self.page_size;
        }

        all.truncate(self.result_cap as usize);
        Ok(all)
    }
}

fn parse_shops(payload: &Value) -> Vec<ShopRecord> {
    let Some(shops) = payload["results"]["shop"].as_array() else {
        return Vec::new();
    };
    shops.iter().filter_map(map_shop).collect()
}

fn map_shop(value: &Value) -> Option<ShopRecord> {
    let name = value["name"].as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    Some(ShopRecord {
        name: name.to_string(),
        genre: text_at(value, &["genre", "name"]),
        budget: text_at(value, &["budget", "name"]),
        address: text_at(value, &["address"]),
        smoking: optional_text_at(value, &["non_smoking"]),
        photo_url: optional_text_at(value, &["photo", "pc", "l"]),
        detail_url: text_at(value, &["urls", "pc"]),
        catch_phrase: text_at(value, &["catch"]),
        open_hours: optional_text_at(value, &["open"]),
        intro: None,
        highlight: None,
        tags: None,
    })
}

fn text_at(value: &Value, path: &[&str]) -> String {
    optional_text_at(value, path).unwrap_or_default()
}

fn optional_text_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = &current[*key];
    }
    current.as_str().map(str::to_string).filter(|text| !text.is_empty())
}
