//! Language detection for page collections.
//!
//! A sample is classified by an ordered rule table: script rules, then
//! keyword rules, then the `whatlang` statistical guesser. The first rule
//! that matches decides. Samples too short to judge resolve to the
//! configured default.

use crate::config::Config;
use crate::i18n::rules::{DetectionRules, KeywordRule, ScriptRule};
use crate::i18n::LanguageCode;
use crate::markup;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

static WORD_REGEX: OnceLock<Regex> = OnceLock::new();

/// Which stage of the cascade produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionSource {
    Default,
    Script,
    Keyword,
    Statistical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub code: LanguageCode,
    pub source: DetectionSource,
}

/// Tunables that are not part of the rule tables.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub default_language: LanguageCode,
    pub min_sample_chars: usize,
    pub sample_cap_chars: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            default_language: LanguageCode::new("uk"),
            min_sample_chars: 50,
            sample_cap_chars: 3000,
        }
    }
}

/// One entry of the ordered rule table.
enum Rule {
    Script(ScriptRule),
    Keyword(KeywordRule),
}

impl Rule {
    fn code(&self) -> &str {
        match self {
            Rule::Script(rule) => &rule.code,
            Rule::Keyword(rule) => &rule.code,
        }
    }

    fn source(&self) -> DetectionSource {
        match self {
            Rule::Script(_) => DetectionSource::Script,
            Rule::Keyword(_) => DetectionSource::Keyword,
        }
    }

    fn matches(&self, sample: &str, words: &HashSet<String>) -> bool {
        match self {
            Rule::Script(rule) => rule.matches(sample),
            Rule::Keyword(rule) => rule.matches(words),
        }
    }
}

pub struct LanguageDetector {
    settings: DetectorSettings,
    rules: Vec<Rule>,
    remap: std::collections::BTreeMap<String, String>,
}

impl LanguageDetector {
    pub fn new(settings: DetectorSettings, rules: DetectionRules) -> Self {
        let table = rules
            .script
            .into_iter()
            .map(Rule::Script)
            .chain(rules.keywords.into_iter().map(Rule::Keyword))
            .collect();

        Self {
            settings,
            rules: table,
            remap: rules.remap,
        }
    }

    /// Detector with the configured settings and rule tables.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let rules = DetectionRules::load(config.detection_rules_path.as_deref())?;
        let settings = DetectorSettings {
            default_language: LanguageCode::new(&config.default_language),
            min_sample_chars: config.min_sample_chars,
            sample_cap_chars: config.sample_cap_chars,
        };
        Ok(Self::new(settings, rules))
    }

    fn fallback(&self) -> Detection {
        Detection {
            code: self.settings.default_language.clone(),
            source: DetectionSource::Default,
        }
    }

    /// Classify a page (markup allowed) or a plain-text sample.
    pub fn detect(&self, text: &str) -> Detection {
        let sample = markup::text_sample(text, self.settings.sample_cap_chars);

        if sample.chars().count() < self.settings.min_sample_chars {
            debug!(
                "Sample has fewer than {} characters, using default",
                self.settings.min_sample_chars
            );
            return self.fallback();
        }

        let words = word_set(&sample);
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(&sample, &words)) {
            debug!("Rule for '{}' matched ({:?})", rule.code(), rule.source());
            return Detection {
                code: LanguageCode::new(rule.code()),
                source: rule.source(),
            };
        }

        match statistical_guess(&sample) {
            Some(code) => {
                let code = self.remap.get(code).map(String::as_str).unwrap_or(code);
                Detection {
                    code: LanguageCode::new(code),
                    source: DetectionSource::Statistical,
                }
            }
            None => {
                debug!("Statistical detector had no confident guess, using default");
                self.fallback()
            }
        }
    }

    /// Most frequent language across documents.
    ///
    /// Documents that fell back to the default do not vote. Ties go to the
    /// language seen first; no votes at all yields the default.
    pub fn detect_dominant<I, S>(&self, documents: I) -> LanguageCode
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tally: Vec<(LanguageCode, usize)> = Vec::new();

        for document in documents {
            let detection = self.detect(document.as_ref());
            if detection.source == DetectionSource::Default {
                continue;
            }
            match tally.iter_mut().find(|(code, _)| *code == detection.code) {
                Some((_, count)) => *count += 1,
                None => tally.push((detection.code, 1)),
            }
        }

        let mut best: Option<&(LanguageCode, usize)> = None;
        for entry in &tally {
            if best.map_or(true, |(_, count)| entry.1 > *count) {
                best = Some(entry);
            }
        }

        best.map(|(code, _)| code.clone())
            .unwrap_or_else(|| self.settings.default_language.clone())
    }
}

fn word_set(sample: &str) -> HashSet<String> {
    let regex = WORD_REGEX.get_or_init(|| Regex::new(r"[\p{L}']+").unwrap());
    regex
        .find_iter(sample)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// ISO 639-1 code for a `whatlang` guess, when the guess is usable.
fn statistical_guess(sample: &str) -> Option<&'static str> {
    let info = whatlang::detect(sample)?;
    if !info.is_reliable() {
        return None;
    }
    lang_to_code(info.lang())
}

fn lang_to_code(lang: whatlang::Lang) -> Option<&'static str> {
    use whatlang::Lang::*;
    let code = match lang {
        Eng => "en",
        Ukr => "uk",
        Rus => "ru",
        Deu => "de",
        Fra => "fr",
        Spa => "es",
        Ita => "it",
        Pol => "pl",
        Por => "pt",
        Nld => "nl",
        Dan => "da",
        Swe => "sv",
        Ces => "cs",
        Tur => "tr",
        Ell => "el",
        Ara => "ar",
        Bul => "bg",
        Ron => "ro",
        Hun => "hu",
        _ => return None,
    };
    Some(code)
}
