//! Locale facts for a language: candidate countries and phone prefix.

use crate::error::LocaleError;
use crate::i18n::Language;
use rand::seq::IndexedRandom;

/// The {countries, phone prefix} bundle handed to the rewrite prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocaleFacts {
    pub countries: &'static [&'static str],
    pub phone_prefix: &'static str,
}

/// Static lookups over the language registry.
pub struct LocaleProfile;

impl LocaleProfile {
    pub fn facts_for(code: &str) -> Result<LocaleFacts, LocaleError> {
        let config = Language::from_code(code)?.config();
        Ok(LocaleFacts {
            countries: config.countries,
            phone_prefix: config.phone_prefix,
        })
    }

    /// Ordered, non-empty candidate countries for a language.
    pub fn countries_for(code: &str) -> Result<&'static [&'static str], LocaleError> {
        Ok(Self::facts_for(code)?.countries)
    }

    /// E.164 calling code (e.g. "+380") for a language.
    pub fn phone_code_for(code: &str) -> Result<&'static str, LocaleError> {
        Ok(Self::facts_for(code)?.phone_prefix)
    }

    /// Uniformly random country for a language, different per call.
    pub fn pick_country(code: &str) -> Result<&'static str, LocaleError> {
        let countries = Self::countries_for(code)?;
        countries
            .choose(&mut rand::rng())
            .copied()
            .ok_or_else(|| LocaleError::Unmapped(code.to_string()))
    }
}
