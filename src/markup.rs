//! Markup helpers: visible-text extraction and structural comparison.
//!
//! Pages are never parsed into a tree. A document is split into its markup
//! skeleton (tags, comments, script and style blocks, in order) and the text
//! between them. Rewriting may change the text only, so the skeleton before
//! and after must be identical.

use regex::Regex;
use std::sync::OnceLock;

static SKELETON_REGEX: OnceLock<Regex> = OnceLock::new();
static TITLE_REGEX: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();

fn skeleton_regex() -> &'static Regex {
    SKELETON_REGEX.get_or_init(|| {
        Regex::new(
            r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>|<!--.*?-->|<[!/?a-z][^>]*>",
        )
            .unwrap()
    })
}

/// Whether the text contains at least one tag.
pub fn has_markup(text: &str) -> bool {
    skeleton_regex().is_match(text)
}

/// Text before the first and after the last markup token.
pub fn outer_text(html: &str) -> (&str, &str) {
    let mut tokens = skeleton_regex().find_iter(html);
    let Some(first) = tokens.next() else {
        return (html, "");
    };
    let end = tokens.last().map_or(first.end(), |token| token.end());
    (&html[..first.start()], &html[end..])
}

/// Human-visible text of a page with markup removed and whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    let stripped = skeleton_regex().replace_all(html, " ");
    let decoded = decode_entities(&stripped);
    let whitespace = WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").unwrap());
    whitespace.replace_all(&decoded, " ").trim().to_string()
}

/// Visible text limited to `max_chars` characters.
pub fn text_sample(html: &str, max_chars: usize) -> String {
    visible_text(html).chars().take(max_chars).collect()
}

/// The page title, used as a hint for the site's current name.
pub fn title(html: &str) -> Option<String> {
    let regex = TITLE_REGEX.get_or_init(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap());
    let raw = regex.captures(html)?.get(1)?.as_str();
    let text = visible_text(raw);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// The part of a title that usually names the site ("Home | Acme" → "Acme").
pub fn site_name_hint(html: &str) -> Option<String> {
    let title = title(html)?;
    let segments: Vec<&str> = title
        .split(['|', '–', '—', '·'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [.., last] => Some(last.to_string()),
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Ordered markup tokens of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSkeleton {
    tokens: Vec<String>,
}

impl MarkupSkeleton {
    pub fn of(html: &str) -> Self {
        Self {
            tokens: skeleton_regex()
                .find_iter(html)
                .map(|m| m.as_str().to_string())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Outcome of comparing two skeletons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureReport {
    pub errors: Vec<String>,
}

impl StructureReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks that a rewrite left every tag, attribute, script and style intact.
pub struct StructureValidator;

impl StructureValidator {
    pub fn validate(original: &str, rewritten: &str) -> StructureReport {
        let before = MarkupSkeleton::of(original);
        let after = MarkupSkeleton::of(rewritten);
        let mut errors = Vec::new();

        if before.len() != after.len() {
            errors.push(format!(
                "token count changed from {} to {}",
                before.len(),
                after.len()
            ));
        }

        // Only the first divergence is reported; later ones are usually knock-on.
        if let Some((index, (old, new))) = before
            .tokens
            .iter()
            .zip(after.tokens.iter())
            .enumerate()
            .find(|(_, (old, new))| old != new)
        {
            errors.push(format!(
                "token {} changed from {} to {}",
                index + 1,
                abbreviate(old),
                abbreviate(new)
            ));
        }

        StructureReport { errors }
    }
}

fn abbreviate(token: &str) -> String {
    const MAX: usize = 80;
    if token.chars().count() <= MAX {
        token.to_string()
    } else {
        format!("{}...", token.chars().take(MAX).collect::<String>())
    }
}
