//! Language support: detection, the language registry and locale facts.
//!
//! # Architecture
//!
//! - `registry`: single source of truth for supported languages and their locale data
//! - `language`: `LanguageCode` (detected, unvalidated) and `Language` (registered)
//! - `locale`: country and phone-prefix lookups for the rewrite prompt
//! - `rules`: JSON-backed script, keyword and remap tables
//! - `detector`: ordered rule cascade with a statistical fallback
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::i18n::{DetectionRules, DetectorSettings, LanguageDetector, LocaleProfile};
//!
//! let detector = LanguageDetector::new(DetectorSettings::default(), DetectionRules::embedded()?);
//! let code = detector.detect_dominant(&pages);
//! let prefix = LocaleProfile::phone_code_for(code.as_str())?;
//! ```

mod detector;
mod language;
mod locale;
mod registry;
mod rules;

pub use detector::{Detection, DetectionSource, DetectorSettings, LanguageDetector};
pub use language::{Language, LanguageCode};
pub use locale::{LocaleFacts, LocaleProfile};
pub use registry::{LanguageConfig, LanguageRegistry};
pub use rules::{DetectionRules, KeywordRule, ScriptRule};
