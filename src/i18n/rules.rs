//! Detection rule tables.
//!
//! The tables are data, not code: an embedded JSON document ships with the
//! binary and `DETECTION_RULES_PATH` may point at a replacement with the
//! same shape.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const EMBEDDED_RULES: &str = include_str!("detection_rules.json");

/// A language whose script gives it away.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptRule {
    pub code: String,
    /// Individual characters that count as hits
    #[serde(default)]
    pub chars: String,
    /// Inclusive Unicode code point ranges that count as hits
    #[serde(default)]
    pub ranges: Vec<[u32; 2]>,
    #[serde(default = "default_min_hits")]
    pub min_hits: usize,
}

impl ScriptRule {
    fn is_hit(&self, c: char) -> bool {
        let cp = c as u32;
        self.chars.contains(c) || self.ranges.iter().any(|[lo, hi]| (*lo..=*hi).contains(&cp))
    }

    /// Whether at least `min_hits` characters of the sample belong to the script.
    pub fn matches(&self, sample: &str) -> bool {
        sample.chars().filter(|c| self.is_hit(*c)).take(self.min_hits).count() >= self.min_hits
    }
}

/// A language recognized by its frequent words.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordRule {
    pub code: String,
    pub threshold: usize,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    /// Number of distinct keywords present among the sample's words.
    pub fn hits(&self, words: &HashSet<String>) -> usize {
        self.keywords
            .iter()
            .filter(|keyword| words.contains(keyword.to_lowercase().as_str()))
            .count()
    }

    pub fn matches(&self, words: &HashSet<String>) -> bool {
        self.threshold > 0 && self.hits(words) >= self.threshold
    }
}

/// Ordered rule tables plus the statistical remap table.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRules {
    #[serde(default)]
    pub script: Vec<ScriptRule>,
    #[serde(default)]
    pub keywords: Vec<KeywordRule>,
    /// Statistical guesses known to be confused with a higher-priority language
    #[serde(default)]
    pub remap: BTreeMap<String, String>,
}

impl DetectionRules {
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(EMBEDDED_RULES).context("Embedded detection rules are invalid")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read detection rules from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse detection rules in {}", path.display()))
    }

    /// Rules from `path` when given, otherwise the embedded tables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::embedded(),
        }
    }
}

fn default_min_hits() -> usize {
    1
}
