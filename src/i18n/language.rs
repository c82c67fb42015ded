//! Language codes and validated languages.
//!
//! `LanguageCode` is whatever detection produced; it may name a language the
//! registry does not know. `Language` only exists for registered
//! languages, so holding one guarantees locale facts are available.

use crate::error::LocaleError;
use crate::i18n::{LanguageConfig, LanguageRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lowercase ISO 639-1 code as produced by detection or operator input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        LanguageCode(code.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageCode {
    fn from(code: &str) -> Self {
        LanguageCode::new(code)
    }
}

/// A validated, supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    code: &'static str,
}

impl Language {
    /// Resolve a code against the registry.
    ///
    /// Unknown languages are `LocaleError::Unmapped`: the caller must never
    /// fall back to another locale silently.
    pub fn from_code(code: &str) -> Result<Language, LocaleError> {
        match LanguageRegistry::get().get_by_code(code) {
            Some(config) => Ok(Language { code: config.code }),
            None => Err(LocaleError::Unmapped(code.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// # Panics
    /// Never, as long as the `Language` came from `from_code`.
    pub fn config(&self) -> &'static LanguageConfig {
        LanguageRegistry::get()
            .get_by_code(self.code)
            .expect("Language code should always be valid")
    }

    /// English name of the language (e.g., "German").
    pub fn name(&self) -> &'static str {
        self.config().name
    }

    /// Native name of the language (e.g., "Deutsch").
    pub fn native_name(&self) -> &'static str {
        self.config().native_name
    }
}

impl TryFrom<&LanguageCode> for Language {
    type Error = LocaleError;

    fn try_from(code: &LanguageCode) -> Result<Self, Self::Error> {
        Language::from_code(code.as_str())
    }
}
