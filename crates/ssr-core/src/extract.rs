//! Pull encoded suspension reasons out of fixture JSON.
//!
//! Feed payloads nest markets, lines and selections arbitrarily deep
//! (`body.p[].m[].l[].s[]`). Selection reasons live under `ssr`, line reasons
//! under `lsr`. The walk is bounded by [`ExtractOptions::max_depth`]; subtrees
//! below the limit are ignored.

use crate::error::Result;
use crate::io;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

pub const SELECTION_KEY: &str = "ssr";
pub const LINE_KEY: &str = "lsr";
pub const DECODED_SELECTION_KEY: &str = "dssr";
pub const DECODED_LINE_KEY: &str = "dlsr";

/// Encoded key → the sibling key its decoding is written to.
const CODE_KEYS: [(&str, &str); 2] = [
    (SELECTION_KEY, DECODED_SELECTION_KEY),
    (LINE_KEY, DECODED_LINE_KEY),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub max_depth: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { max_depth: 64 }
    }
}

/// Every non-empty string found under an `ssr` or `lsr` key.
pub fn extract_codes(value: &Value, opts: &ExtractOptions) -> BTreeSet<String> {
    let mut codes = BTreeSet::new();
    let mut stack: Vec<(&Value, usize)> = vec![(value, 0)];

    while let Some((node, depth)) = stack.pop() {
        if depth > opts.max_depth {
            continue;
        }
        match node {
            Value::Object(map) => {
                for (key, child) in map {
                    match child {
                        Value::String(code) if is_code_key(key) => {
                            if !code.is_empty() {
                                codes.insert(code.clone());
                            }
                        }
                        Value::Object(_) | Value::Array(_) => stack.push((child, depth + 1)),
                        _ => {}
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    stack.push((item, depth + 1));
                }
            }
            _ => {}
        }
    }
    codes
}

fn is_code_key(key: &str) -> bool {
    CODE_KEYS.iter().any(|(k, _)| *k == key)
}

/// Write `dssr`/`dlsr` next to every `ssr`/`lsr` that `lookup` can decode.
///
/// Returns how many decoded fields were written.
pub fn annotate<F>(value: &mut Value, opts: &ExtractOptions, mut lookup: F) -> usize
where
    F: FnMut(&str) -> Option<String>,
{
    annotate_at(value, 0, opts.max_depth, &mut lookup)
}

fn annotate_at<F>(value: &mut Value, depth: usize, max_depth: usize, lookup: &mut F) -> usize
where
    F: FnMut(&str) -> Option<String>,
{
    if depth > max_depth {
        return 0;
    }
    let mut written = 0;
    match value {
        Value::Object(map) => {
            for (code_key, decoded_key) in CODE_KEYS {
                let decoded = match map.get(code_key) {
                    Some(Value::String(code)) if !code.is_empty() => lookup(code.as_str()),
                    _ => None,
                };
                if let Some(decoded) = decoded {
                    map.insert(decoded_key.to_string(), Value::String(decoded));
                    written += 1;
                }
            }
            for child in map.values_mut() {
                if matches!(child, Value::Object(_) | Value::Array(_)) {
                    written += annotate_at(child, depth + 1, max_depth, lookup);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                written += annotate_at(item, depth + 1, max_depth, lookup);
            }
        }
        _ => {}
    }
    written
}

/// Parse a fixture file, tolerating a leading byte-order mark.
pub fn read_fixture(path: &Path) -> Result<Value> {
    let text = io::read_text(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// The payload of a fixture document: its `body` member, or the whole
/// document when there is none.
pub fn fixture_body(doc: &Value) -> &Value {
    doc.get("body").unwrap_or(doc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Value {
        json!({
            "body": {
                "p": [{
                    "m": [{
                        "lsr": "C",
                        "l": [{
                            "lsr": "AB",
                            "s": [
                                {"ssr": "A", "price": 1.5},
                                {"ssr": "", "price": 2.0},
                                {"ssr": null},
                                {"ssr": "K"}
                            ]
                        }]
                    }]
                }],
                "ssr": 7
            }
        })
    }

    #[test]
    fn collects_ssr_and_lsr_strings() {
        let codes = extract_codes(&sample(), &ExtractOptions::default());
        let expected: BTreeSet<String> =
            ["A", "AB", "C", "K"].iter().map(|s| s.to_string()).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn depth_limit_stops_descent() {
        let codes = extract_codes(&sample(), &ExtractOptions { max_depth: 5 });
        // body(1) p(2) p[0](3) m(4) m[0](5): the market is the deepest object read
        assert!(!codes.contains("AB"));
        assert!(codes.contains("C"));
        assert!(!codes.contains("A"));
    }

    #[test]
    fn annotate_writes_decoded_siblings() {
        let mut doc = sample();
        let written = annotate(&mut doc, &ExtractOptions::default(), |code| {
            Some(format!("decoded-{code}"))
        });
        assert_eq!(written, 4);
        let line = &doc["body"]["p"][0]["m"][0]["l"][0];
        assert_eq!(line["dlsr"], "decoded-AB");
        assert_eq!(line["s"][0]["dssr"], "decoded-A");
        assert!(line["s"][1].get("dssr").is_none());
    }

    #[test]
    fn annotate_skips_codes_lookup_cannot_decode() {
        let mut doc = json!({"ssr": "A", "l": [{"lsr": "B"}]});
        let written = annotate(&mut doc, &ExtractOptions::default(), |code| {
            (code == "B").then(|| "Settled".to_string())
        });
        assert_eq!(written, 1);
        assert!(doc.get("dssr").is_none());
        assert_eq!(doc["l"][0]["dlsr"], "Settled");
    }

    #[test]
    fn read_fixture_handles_bom_and_body() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(&path, "\u{feff}{\"body\": {\"ssr\": \"B\"}}").unwrap();
        let doc = read_fixture(&path).unwrap();
        assert_eq!(fixture_body(&doc), &json!({"ssr": "B"}));
    }

    #[test]
    fn fixture_without_body_is_whole_document() {
        let doc = json!({"ssr": "B"});
        assert_eq!(fixture_body(&doc), &doc);
    }
}
