use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use crate::i18n::LanguageRegistry;

#[derive(Debug, Clone)]
pub struct Config {
    // Rewrite service
    pub rewrite_api_url: String,
    pub rewrite_model: String,
    pub rewrite_temperature: f32,
    pub rewrite_temperature_step: f32,
    pub rewrite_max_tokens: u32,
    pub rewrite_timeout_secs: u64,
    pub rewrite_max_attempts: u32,
    pub rewrite_concurrency: usize,
    pub structure_check: bool,

    // Language detection
    pub default_language: String,
    pub min_sample_chars: usize,
    pub sample_cap_chars: usize,
    pub sample_documents: usize,
    pub detection_rules_path: Option<PathBuf>,

    // Runs
    pub max_variants: u32,
    pub work_dir: PathBuf,
    pub max_extracted_mb: u64,

    // Server
    pub port: u16,
    pub access_token: Option<String>,
    pub max_upload_mb: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            // Rewrite service
            rewrite_api_url: std::env::var("REWRITE_API_URL")
                .unwrap_or_else(|_| "https://api.x.ai/v1/chat/completions".to_string()),
            rewrite_model: std::env::var("REWRITE_MODEL")
                .unwrap_or_else(|_| "grok-code-fast-1".to_string()),
            rewrite_temperature: parse_var("REWRITE_TEMPERATURE", 0.7)?,
            rewrite_temperature_step: parse_var("REWRITE_TEMPERATURE_STEP", 0.05)?,
            rewrite_max_tokens: parse_var("REWRITE_MAX_TOKENS", 8192)?,
            rewrite_timeout_secs: parse_var("REWRITE_TIMEOUT_SECS", 300)?,
            rewrite_max_attempts: parse_var("REWRITE_MAX_ATTEMPTS", 1u32)?.clamp(1, 5),
            rewrite_concurrency: parse_var("REWRITE_CONCURRENCY", 1usize)?.clamp(1, 8),
            structure_check: parse_var("STRUCTURE_CHECK", true)?,

            // Language detection
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_else(|_| "uk".to_string()),
            min_sample_chars: parse_var("MIN_SAMPLE_CHARS", 50)?,
            sample_cap_chars: parse_var("SAMPLE_CAP_CHARS", 3000)?,
            sample_documents: parse_var("SAMPLE_DOCUMENTS", 20usize)?.max(1),
            detection_rules_path: std::env::var("DETECTION_RULES_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            // Runs
            max_variants: parse_var("MAX_VARIANTS", 20u32)?.max(1),
            work_dir: std::env::var("WORK_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            max_extracted_mb: parse_var("MAX_EXTRACTED_MB", 1024u64)?.max(1),

            // Server
            port: parse_var("PORT", 8080)?,
            access_token: std::env::var("ACCESS_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_upload_mb: parse_var("MAX_UPLOAD_MB", 200)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if !LanguageRegistry::get().is_supported(&self.default_language) {
            bail!(
                "DEFAULT_LANGUAGE '{}' is not a supported language",
                self.default_language
            );
        }
        if self.sample_cap_chars < self.min_sample_chars {
            bail!(
                "SAMPLE_CAP_CHARS ({}) must not be below MIN_SAMPLE_CHARS ({})",
                self.sample_cap_chars,
                self.min_sample_chars
            );
        }
        if !(0.0..=2.0).contains(&self.rewrite_temperature) {
            bail!(
                "REWRITE_TEMPERATURE must be within 0.0..=2.0, got {}",
                self.rewrite_temperature
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rewrite_api_url: "https://api.x.ai/v1/chat/completions".to_string(),
            rewrite_model: "grok-code-fast-1".to_string(),
            rewrite_temperature: 0.7,
            rewrite_temperature_step: 0.05,
            rewrite_max_tokens: 8192,
            rewrite_timeout_secs: 300,
            rewrite_max_attempts: 1,
            rewrite_concurrency: 1,
            structure_check: true,
            default_language: "uk".to_string(),
            min_sample_chars: 50,
            sample_cap_chars: 3000,
            sample_documents: 20,
            detection_rules_path: None,
            max_variants: 20,
            work_dir: std::env::temp_dir(),
            max_extracted_mb: 1024,
            port: 8080,
            access_token: None,
            max_upload_mb: 200,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: '{}'", name, value)),
        _ => Ok(default),
    }
}
