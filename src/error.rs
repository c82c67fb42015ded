//! Error types for every boundary the pipeline crosses.
//!
//! Library code returns these enums so callers can pattern-match on the
//! failure kind. Binaries wrap them in `anyhow` at the edges.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single remote rewrite call or of its response validation.
///
/// Every variant resolves to Failed-Preserved: the document keeps its
/// original content and the run continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RewriteError {
    #[error("request to rewrite service failed: {0}")]
    Transport(String),

    #[error("rewrite service timed out after {0:?}")]
    Timeout(Duration),

    #[error("rewrite service rejected the credential ({status})")]
    Auth { status: u16 },

    #[error("rewrite service rate limit reached")]
    RateLimited,

    #[error("rewrite service error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("malformed response from rewrite service: {0}")]
    MalformedResponse(String),

    #[error("rewrite service returned an empty response")]
    EmptyResponse,

    #[error("response contains no markup although the document does")]
    InvalidResponse,

    #[error("response adds text outside the page markup")]
    ExtraText,

    #[error("response altered the markup structure: {0}")]
    StructureMismatch(String),

    #[error("document could not be read or written: {0}")]
    Io(String),
}

impl RewriteError {
    /// Whether a further attempt could reasonably succeed.
    ///
    /// Timeouts, transport errors, 429 and 5xx are retryable. Credential
    /// problems, other 4xx responses and bad content are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RewriteError::Transport(_) | RewriteError::Timeout(_) | RewriteError::RateLimited => {
                true
            }
            RewriteError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A language code with no locale profile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocaleError {
    #[error("no locale profile for language '{0}'")]
    Unmapped(String),
}

/// Failure to read an uploaded archive or to write the output package.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{operation} failed for {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed for '{archive}': {source}")]
    Zip {
        operation: &'static str,
        archive: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive '{archive}' has unsupported format '{format}'")]
    Unsupported { archive: String, format: String },

    #[error("archive '{archive}' contains unsafe entry '{entry}'")]
    UnsafeEntry { archive: String, entry: String },

    #[error("archive '{archive}' expands beyond {limit} bytes")]
    TooLarge { archive: String, limit: u64 },

    #[error("archive '{archive}' already has an entry '{entry}'")]
    DuplicateEntry { archive: String, entry: String },
}

impl ArchiveError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        archive: impl Into<String>,
        source: zip::result::ZipError,
    ) -> Self {
        ArchiveError::Zip {
            operation,
            archive: archive.into(),
            source,
        }
    }
}

/// Conditions that fail a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("API credential is missing")]
    MissingCredential,

    #[error("API credential is malformed: {0}")]
    MalformedCredential(&'static str),

    #[error("no archives were uploaded")]
    NoArchives,

    #[error("variant count {requested} is outside 1..={max}")]
    VariantCount { requested: u32, max: u32 },

    #[error("forced language is not supported: {0}")]
    UnsupportedLanguage(#[from] LocaleError),

    #[error("no HTML documents found in the uploaded archives")]
    NoDocuments,

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("rewrite client could not be created: {0}")]
    Client(#[from] RewriteError),
}

impl RunError {
    /// Errors caused by operator input rather than by the machine.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            RunError::Archive(ArchiveError::Io { .. })
                | RunError::Archive(ArchiveError::Zip { .. })
                | RunError::Archive(ArchiveError::DuplicateEntry { .. })
                | RunError::Client(_)
        )
    }
}
