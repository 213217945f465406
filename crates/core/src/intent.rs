use serde::{Deserialize, Serialize};

/// What a single inbound message is asking for. Classification is a
/// prioritized keyword match, deliberately high-recall: account actions
/// outrank content refinement because they are financial/safety actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Cancel,
    ChangePlan,
    Refine,
    NextCandidate,
    NewSearch,
}

/// Keyword lexicons driving the router. Kept as data so recall can be
/// tuned without touching pipeline logic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicons {
    pub cancel: Vec<String>,
    pub change_plan: Vec<String>,
    pub refine: Vec<String>,
    pub next_candidate: Vec<String>,
}

impl Default for Lexicons {
    fn default() -> Self {
        Self {
            cancel: to_owned(&["解約", "退会", "キャンセル", "解除"]),
            change_plan: to_owned(&["プラン", "料金", "アップグレード", "有料"]),
            refine: to_owned(&[
                "もっと",
                "もう少し",
                "もう",
                "ちょっと",
                "できる",
                "静か",
                "個室",
                "夜",
                "おしゃれ",
                "雰囲気の良い",
                "映え",
                "インスタ映え",
                "美味しい",
                "高級",
                "安い",
                "コスパ",
                "駅近",
                "口コミ",
                "評判",
                "賑やか",
                "飲み放題",
                "予約",
                "落ち着いた",
                "子連れ",
                "駐車場",
                "深夜",
                "使える",
                "同じ",
                "条件",
                "場所",
                "ランチ",
                "ヘルシー",
                "健康志向",
                "ペット",
                "テラス",
                "地元",
                "ご当地",
                "記念日",
                "誕生日",
                "デート",
                "流行り",
                "バイキング",
                "食べ放題",
                "喫煙",
                "禁煙",
                "分煙",
                "Wi-Fi",
                "老舗",
                "名店",
                "スイーツ",
                "デザート",
                "貸切",
            ]),
            next_candidate: to_owned(&["違う", "他", "別の", "次"]),
        }
    }
}

impl Lexicons {
    /// Pure priority routing: first matching rule wins. Refine and
    /// NextCandidate require an existing session; everything else falls
    /// through to NewSearch, which replaces any session.
    pub fn classify(&self, text: &str, has_session: bool) -> Intent {
        if contains_any(text, &self.cancel) {
            return Intent::Cancel;
        }
        if contains_any(text, &self.change_plan) {
            return Intent::ChangePlan;
        }
        if has_session && contains_any(text, &self.refine) {
            return Intent::Refine;
        }
        if has_session && contains_any(text, &self.next_candidate) {
            return Intent::NextCandidate;
        }
        Intent::NewSearch
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword.as_str()))
}

fn to_owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| (*word).to_string()).collect()
}
