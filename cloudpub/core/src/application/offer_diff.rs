// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offer Diff
//!
//! Structural diff between two JSON documents, used to log what a
//! submission changes compared to the remote offer.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Implements offer_diff

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Paths ignored when comparing Azure offers (asset URLs are re-signed on every read)
pub const AZURE_DIFF_EXCLUDES: &[&str] = &[r"root\['resources'\]\[[0-9]+\]\['url'\]"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    Added { path: String, value: Value },
    Removed { path: String, value: Value },
    Changed { path: String, old: Value, new: Value },
}

impl DiffEntry {
    pub fn path(&self) -> &str {
        match self {
            DiffEntry::Added { path, .. } | DiffEntry::Removed { path, .. } | DiffEntry::Changed { path, .. } => path,
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffEntry::Added { path, value } => write!(f, "+ {}: {}", path, value),
            DiffEntry::Removed { path, value } => write!(f, "- {}: {}", path, value),
            DiffEntry::Changed { path, old, new } => write!(f, "~ {}: {} -> {}", path, old, new),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct OfferDiff {
    pub entries: Vec<DiffEntry>,
}

impl OfferDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One change per line
    pub fn pretty(&self) -> String {
        self.entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Compile the Azure exclude patterns
pub fn azure_excludes() -> Vec<Regex> {
    AZURE_DIFF_EXCLUDES
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

/// Diff `old` against `new`, skipping any path matching one of `excludes`
pub fn diff_json(old: &Value, new: &Value, excludes: &[Regex]) -> OfferDiff {
    let mut diff = OfferDiff::default();
    walk("root", old, new, excludes, &mut diff.entries);
    diff
}

fn excluded(path: &str, excludes: &[Regex]) -> bool {
    excludes.iter().any(|re| re.is_match(path))
}

fn walk(path: &str, old: &Value, new: &Value, excludes: &[Regex], out: &mut Vec<DiffEntry>) {
    if excluded(path, excludes) {
        return;
    }

    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                let child = format!("{}['{}']", path, key);
                match b.get(key) {
                    Some(other) => walk(&child, value, other, excludes, out),
                    None if !excluded(&child, excludes) => out.push(DiffEntry::Removed {
                        path: child,
                        value: value.clone(),
                    }),
                    None => {}
                }
            }
            for (key, value) in b.iter().filter(|(k, _)| !a.contains_key(*k)) {
                let child = format!("{}['{}']", path, key);
                if !excluded(&child, excludes) {
                    out.push(DiffEntry::Added {
                        path: child,
                        value: value.clone(),
                    });
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                let child = format!("{}[{}]", path, index);
                match (a.get(index), b.get(index)) {
                    (Some(x), Some(y)) => walk(&child, x, y, excludes, out),
                    (Some(x), None) if !excluded(&child, excludes) => out.push(DiffEntry::Removed {
                        path: child,
                        value: x.clone(),
                    }),
                    (None, Some(y)) if !excluded(&child, excludes) => out.push(DiffEntry::Added {
                        path: child,
                        value: y.clone(),
                    }),
                    _ => {}
                }
            }
        }
        (a, b) if a != b => out.push(DiffEntry::Changed {
            path: path.to_string(),
            old: a.clone(),
            new: b.clone(),
        }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_documents() {
        let doc = json!({"a": [1, {"b": true}]});
        assert!(diff_json(&doc, &doc, &[]).is_empty());
    }

    #[test]
    fn test_paths() {
        let old = json!({"resources": [{"id": "plan/1", "alias": "old"}], "gone": 1});
        let new = json!({"resources": [{"id": "plan/1", "alias": "new"}, {"id": "plan/2"}], "extra": "x"});

        let diff = diff_json(&old, &new, &[]);
        let mut paths: Vec<&str> = diff.entries.iter().map(DiffEntry::path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec!["root['extra']", "root['gone']", "root['resources'][0]['alias']", "root['resources'][1]"]
        );
        assert!(diff.pretty().contains("~ root['resources'][0]['alias']: \"old\" -> \"new\""));
    }

    #[test]
    fn test_azure_excludes_asset_urls() {
        let old = json!({"resources": [{"url": "https://a?sig=1"}]});
        let new = json!({"resources": [{"url": "https://a?sig=2"}]});
        assert!(diff_json(&old, &new, &azure_excludes()).is_empty());
        assert_eq!(diff_json(&old, &new, &[]).entries.len(), 1);
    }
}
