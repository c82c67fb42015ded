//! Language registry: single source of truth for supported languages.
//!
//! Each entry carries the locale facts the rewrite step needs to fabricate
//! consistent contact data: candidate countries and the phone prefix shared
//! by all of them. The registry is initialized once behind a `OnceLock`.

use std::sync::OnceLock;

/// Configuration for a supported language.
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// ISO 639-1 language code (e.g., "uk", "de")
    pub code: &'static str,

    /// English name of the language (e.g., "Ukrainian", "German")
    pub name: &'static str,

    /// Native name of the language (e.g., "Українська", "Deutsch")
    pub native_name: &'static str,

    /// Countries whose addresses may be fabricated for this language
    pub countries: &'static [&'static str],

    /// E.164 calling code shared by every country above
    pub phone_prefix: &'static str,
}

/// Global language registry singleton.
pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

static REGISTRY: OnceLock<LanguageRegistry> = OnceLock::new();

impl LanguageRegistry {
    /// Get the global language registry instance.
    pub fn get() -> &'static LanguageRegistry {
        REGISTRY.get_or_init(|| LanguageRegistry {
            languages: default_languages(),
        })
    }

    /// Get a language configuration by its code.
    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    /// Check if a language code has a locale profile.
    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code).is_some()
    }
}

fn default_languages() -> Vec<LanguageConfig> {
    vec![
        LanguageConfig {
            code: "uk",
            name: "Ukrainian",
            native_name: "Українська",
            countries: &["Ukraine"],
            phone_prefix: "+380",
        },
        LanguageConfig {
            code: "ru",
            name: "Russian",
            native_name: "Русский",
            countries: &["Russia", "Kazakhstan"],
            phone_prefix: "+7",
        },
        LanguageConfig {
            code: "en",
            name: "English",
            native_name: "English",
            countries: &["United States", "Canada"],
            phone_prefix: "+1",
        },
        LanguageConfig {
            code: "de",
            name: "German",
            native_name: "Deutsch",
            countries: &["Germany"],
            phone_prefix: "+49",
        },
        LanguageConfig {
            code: "fr",
            name: "French",
            native_name: "Français",
            countries: &["France"],
            phone_prefix: "+33",
        },
        LanguageConfig {
            code: "es",
            name: "Spanish",
            native_name: "Español",
            countries: &["Spain"],
            phone_prefix: "+34",
        },
        LanguageConfig {
            code: "it",
            name: "Italian",
            native_name: "Italiano",
            countries: &["Italy"],
            phone_prefix: "+39",
        },
        LanguageConfig {
            code: "pl",
            name: "Polish",
            native_name: "Polski",
            countries: &["Poland"],
            phone_prefix: "+48",
        },
        LanguageConfig {
            code: "el",
            name: "Greek",
            native_name: "Ελληνικά",
            countries: &["Greece"],
            phone_prefix: "+30",
        },
        LanguageConfig {
            code: "ar",
            name: "Arabic",
            native_name: "العربية",
            countries: &["Saudi Arabia"],
            phone_prefix: "+966",
        },
    ]
}
