//! Page rewriting through the completion service.
//!
//! The remote service is told to keep markup intact but is never trusted to
//! do so. Any failure, including a response that does not pass validation,
//! leaves the page exactly as it was.

use crate::config::Config;
use crate::error::{LocaleError, RewriteError};
use crate::i18n::{Language, LanguageCode, LocaleProfile};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::markup::{self, StructureValidator};
use tracing::{debug, warn};

const MAX_TEMPERATURE: f32 = 1.5;

/// Sampling and validation settings for rewrite calls.
#[derive(Debug, Clone)]
pub struct RewriteSettings {
    pub temperature: f32,
    pub temperature_step: f32,
    pub max_tokens: u32,
    pub structure_check: bool,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            temperature_step: 0.05,
            max_tokens: 8192,
            structure_check: true,
        }
    }
}

impl From<&Config> for RewriteSettings {
    fn from(config: &Config) -> Self {
        Self {
            temperature: config.rewrite_temperature,
            temperature_step: config.rewrite_temperature_step,
            max_tokens: config.rewrite_max_tokens,
            structure_check: config.structure_check,
        }
    }
}

impl RewriteSettings {
    /// Later variants sample hotter so their wording drifts further apart.
    pub fn temperature_for(&self, variant: u32) -> f32 {
        (self.temperature + self.temperature_step * variant as f32).min(MAX_TEMPERATURE)
    }
}

/// Everything a single page rewrite needs besides the page itself.
#[derive(Debug, Clone)]
pub struct RewriteRequest<'a> {
    pub language: &'a LanguageCode,
    pub target_name: &'a str,
    pub variant: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteStatus {
    Rewritten,
    /// Failed-Preserved: the original content is returned untouched
    Preserved(RewriteError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub content: String,
    pub status: RewriteStatus,
}

impl RewriteOutcome {
    fn preserved(original: &str, error: RewriteError) -> Self {
        Self {
            content: original.to_string(),
            status: RewriteStatus::Preserved(error),
        }
    }
}

pub struct ContentRewriter<C> {
    client: C,
    settings: RewriteSettings,
}

impl<C: CompletionClient> ContentRewriter<C> {
    pub fn new(client: C, settings: RewriteSettings) -> Self {
        Self { client, settings }
    }

    /// Rewrite one page.
    ///
    /// An unmapped language is an error and no call is made. Every other
    /// failure yields `RewriteStatus::Preserved` with the original content.
    pub async fn rewrite(
        &self,
        content: &str,
        request: &RewriteRequest<'_>,
    ) -> Result<RewriteOutcome, LocaleError> {
        let language = Language::try_from(request.language)?;
        let country = LocaleProfile::pick_country(language.code())?;
        let phone_prefix = LocaleProfile::phone_code_for(language.code())?;

        let completion = CompletionRequest {
            system: build_system_prompt(language, country, phone_prefix, request.target_name),
            user: build_user_prompt(content, markup::site_name_hint(content).as_deref()),
            temperature: self.settings.temperature_for(request.variant),
            max_tokens: self.settings.max_tokens,
        };

        let outcome = match self.client.complete(&completion).await {
            Ok(response) => match self.validate(content, &response) {
                Ok(rewritten) => RewriteOutcome {
                    content: rewritten,
                    status: RewriteStatus::Rewritten,
                },
                Err(e) => RewriteOutcome::preserved(content, e),
            },
            Err(e) => RewriteOutcome::preserved(content, e),
        };

        if let RewriteStatus::Preserved(e) = &outcome.status {
            warn!("Rewrite failed, keeping original page: {}", e);
        } else {
            debug!(
                "Rewrote page for variant {} in {} ({})",
                request.variant,
                language.name(),
                country
            );
        }

        Ok(outcome)
    }

    fn validate(&self, original: &str, response: &str) -> Result<String, RewriteError> {
        // A page that shows fences itself must come back verbatim.
        let rewritten = if original.contains(FENCE) {
            response.trim()
        } else {
            strip_wrapping(response)
        };

        if rewritten.is_empty() {
            return Err(RewriteError::EmptyResponse);
        }
        if markup::has_markup(original) {
            if !markup::has_markup(rewritten) {
                return Err(RewriteError::InvalidResponse);
            }
            if adds_outer_text(original, rewritten) {
                return Err(RewriteError::ExtraText);
            }
        }
        if self.settings.structure_check {
            let report = StructureValidator::validate(original, rewritten);
            if !report.is_clean() {
                return Err(RewriteError::StructureMismatch(report.errors.join("; ")));
            }
        }

        Ok(rewritten.to_string())
    }
}

const FENCE: &str = "```";

/// Trim surrounding whitespace. If the response holds a Markdown code fence,
/// keep only the body of the first one and drop whatever surrounds it.
fn strip_wrapping(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(start) = trimmed.find(FENCE) else {
        return trimmed;
    };
    let rest = &trimmed[start + FENCE.len()..];
    let Some(end) = rest.find(FENCE) else {
        return trimmed;
    };
    let body = &rest[..end];
    // Drop the info string ("html") on the opening fence line.
    match body.split_once('\n') {
        Some((info, inner)) if !info.contains('<') => inner.trim(),
        _ => body.trim(),
    }
}

/// Prose before the first or after the last tag where the original has none.
fn adds_outer_text(original: &str, rewritten: &str) -> bool {
    let (before, after) = markup::outer_text(original);
    let (new_before, new_after) = markup::outer_text(rewritten);
    (before.trim().is_empty() && !new_before.trim().is_empty())
        || (after.trim().is_empty() && !new_after.trim().is_empty())
}

fn build_system_prompt(
    language: Language,
    country: &str,
    phone_prefix: &str,
    target_name: &str,
) -> String {
    format!(
        r#"You rewrite the visible text of an HTML page so that it reads as a unique, natural and attractive page written in {language} ({native}).

## Rules

### Change ONLY natural-language text:
- Rephrase text between tags; keep the meaning and roughly the same length
- Write every rewritten text in {language}
- Do not add or remove sections, sentences or list items

### Return byte-identical:
- Every tag and every attribute, including event handlers, ids, classes, form field names and values
- Every link and resource target (href, src, action)
- The complete contents of <script> and <style> elements
- Comments, doctype and whitespace between tags

### Contact data:
- Replace every street address with a plausible but invented address in {country}
- Replace every phone number with a plausible but invented number starting with {phone_prefix}
- If the page contains no address or phone number, do not add any

### Site name:
- The site's name appears in titles, headings and text; replace every occurrence with "{target_name}"

### Response format:
- Respond with the complete HTML document and nothing else
- No explanations, no quotes, no Markdown code fences"#,
        language = language.name(),
        native = language.native_name(),
        country = country,
        phone_prefix = phone_prefix,
        target_name = target_name,
    )
}

fn build_user_prompt(content: &str, current_name: Option<&str>) -> String {
    match current_name {
        Some(name) => format!(
            "The site's current name is probably \"{}\".\n\nRewrite this page:\n\n{}",
            name, content
        ),
        None => format!("Rewrite this page:\n\n{}", content),
    }
}
