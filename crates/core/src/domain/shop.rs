use serde::{Deserialize, Serialize};

/// One restaurant as returned by the catalog collaborator. The name is the
/// join key for all selection logic; it is unique within a search result
/// set but carries no global identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopRecord {
    pub name: String,
    pub genre: String,
    pub budget: String,
    pub address: String,
    pub smoking: Option<String>,
    pub photo_url: Option<String>,
    pub detail_url: String,
    pub catch_phrase: String,
    pub open_hours: Option<String>,
    /// Filled by the enrichment pass, absent until then.
    pub intro: Option<String>,
    pub highlight: Option<String>,
    pub tags: Option<String>,
}

impl ShopRecord {
    /// Price band as shown to the user. The catalog sometimes returns
    /// free-text blurbs in the budget field; only the `NNN〜NNNN円` range
    /// shape is trusted for display.
    pub fn price_band_label(&self) -> &str {
        if is_price_band(&self.budget) {
            &self.budget
        } else {
            "情報未定"
        }
    }

    pub fn smoking_label(&self) -> &str {
        match self.smoking.as_deref() {
            Some(policy) if !policy.trim().is_empty() => policy,
            _ => "喫煙情報なし",
        }
    }

    pub fn address_label(&self) -> &str {
        if self.address.trim().is_empty() {
            "住所情報なし"
        } else {
            &self.address
        }
    }
}

/// Accepts `500〜1000円` style ranges: 3-4 digits, a range dash, 3-4
/// digits, the yen suffix. Everything else renders as undetermined.
pub fn is_price_band(raw: &str) -> bool {
    let Some(body) = raw.strip_suffix('円') else {
        return false;
    };

    let mut chars = body.chars().peekable();
    let lower = count_leading_digits(&mut chars);
    if !(3..=4).contains(&lower) {
        return false;
    }

    match chars.next() {
        Some('〜' | '~' | 'ー' | '−' | '－') => {}
        _ => return false,
    }

    let upper = count_leading_digits(&mut chars);
    (3..=4).contains(&upper) && chars.next().is_none()
}

fn count_leading_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> usize {
    let mut count = 0;
    while chars.peek().is_some_and(|ch| ch.is_ascii_digit()) {
        chars.next();
        count += 1;
    }
    count
}
