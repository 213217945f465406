//! Tolerant parsers for the two response shapes the language model is asked
//! to emit: labeled lines (`場所: 渋谷`) and bracketed sections
//! (`【紹介文】...`). The model may omit labels, reorder them, or wrap them
//! in commentary; a missing field is an absence, never an error.

use std::collections::HashMap;

/// Values the model emits when it has nothing to say for a field. Treated
/// as empty so they never overwrite accumulated filter state.
const UNSPECIFIED_MARKERS: &[&str] = &["未指定", "なし", "特になし", "不明"];

pub fn scrub_unspecified(value: &str) -> &str {
    let trimmed = value.trim();
    if UNSPECIFIED_MARKERS.contains(&trimmed) {
        ""
    } else {
        trimmed
    }
}

/// Labeled-line response parser. Each requested label captures the
/// remainder of the first line it appears on; everything else in the
/// response is ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabeledLines {
    fields: HashMap<String, String>,
}

impl LabeledLines {
    pub fn parse(text: &str, labels: &[&str]) -> Self {
        let mut fields = HashMap::new();
        for line in text.lines() {
            for label in labels {
                if fields.contains_key(*label) {
                    continue;
                }
                if let Some(value) = labeled_value(line, label) {
                    fields.insert((*label).to_string(), value);
                }
            }
        }
        Self { fields }
    }

    /// `None` means the label never appeared; `Some("")` means it appeared
    /// with no usable value.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(label).map(String::as_str)
    }

    /// Field value with unspecified markers scrubbed to empty.
    pub fn value(&self, label: &str) -> String {
        self.get(label).map(scrub_unspecified).unwrap_or_default().to_string()
    }
}

/// Every value for a repeated label, e.g. each `店名:` line of a selection
/// response. Bullet prefixes are tolerated.
pub fn all_labeled_values(text: &str, label: &str) -> Vec<String> {
    text.lines().filter_map(|line| labeled_value(line, label)).filter(|v| !v.is_empty()).collect()
}

fn labeled_value(line: &str, label: &str) -> Option<String> {
    let start = line.find(label)?;
    let after_label = &line[start + label.len()..];
    let rest = after_label.strip_prefix(':').or_else(|| after_label.strip_prefix('：'))?;
    Some(scrub_unspecified(rest).to_string())
}

/// Bracketed-section response parser: `【紹介文】` style headers, each body
/// running until the next header or end of text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BracketSections {
    sections: HashMap<String, String>,
}

impl BracketSections {
    pub fn parse(text: &str) -> Self {
        let mut sections = HashMap::new();
        let mut remainder = text;

        while let Some(open) = remainder.find('【') {
            let after_open = &remainder[open + '【'.len_utf8()..];
            let Some(close) = after_open.find('】') else {
                break;
            };
            let name = after_open[..close].trim().to_string();
            let body_start = &after_open[close + '】'.len_utf8()..];
            let (body, rest) = match body_start.find('【') {
                Some(next) => (&body_start[..next], &body_start[next..]),
                None => (body_start, ""),
            };
            sections.entry(name).or_insert_with(|| body.trim().to_string());
            remainder = rest;
        }

        Self { sections }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str).filter(|body| !body.is_empty())
    }

    /// Section body, or the given default when the section is missing or
    /// empty.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }
}
