//! Multi-variant rewrite runs.
//!
//! A run takes M uploaded archives and produces N rewritten variants of each.
//! Every (variant, archive) pair gets its own workspace, detected language
//! and site name. Failures below the run level (one archive, one page) are
//! recorded in the summary and never abort the batch.

use crate::archive::{Archive, OutputArtifact, OutputPackage};
use crate::config::Config;
use crate::error::{ArchiveError, LocaleError, RewriteError, RunError};
use crate::i18n::{Language, LanguageCode, LanguageDetector};
use crate::llm::{CompletionClient, Credential, OpenAiClient};
use crate::names::NameGenerator;
use crate::rewriter::{ContentRewriter, RewriteRequest, RewriteSettings, RewriteStatus};
use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const SAVED_PROGRESS: f32 = 0.05;
const DETECTED_PROGRESS: f32 = 0.10;
const REWRITTEN_PROGRESS: f32 = 0.95;

/// Run-level limits and resources.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub max_variants: u32,
    pub work_dir: PathBuf,
    pub sample_documents: usize,
    pub concurrency: usize,
    /// Uncompressed bytes one archive may expand to
    pub max_extracted_bytes: u64,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_variants: config.max_variants,
            work_dir: config.work_dir.clone(),
            sample_documents: config.sample_documents,
            concurrency: config.rewrite_concurrency,
            max_extracted_bytes: config.max_extracted_mb.saturating_mul(1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Saving,
    Detecting,
    Rewriting,
    Packaging,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagingMode {
    /// One archive holding every variant under `variant_{n}/`
    Combined,
    /// One archive per variant
    PerVariant,
}

/// Operator input for one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub archives: Vec<Archive>,
    pub variants: u32,
    pub theme: Option<String>,
    /// Accepted and reported; domain rewriting is not implemented
    pub domain_zone: Option<String>,
    /// Skip detection and use this language for every archive
    pub language: Option<LanguageCode>,
    /// Seed for name generation, for reproducible runs
    pub seed: Option<u64>,
    pub packaging: PackagingMode,
}

/// Result for one (variant, archive) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub variant: u32,
    /// 1-based position of the archive in the upload
    pub position: usize,
    pub archive: String,
    pub language: LanguageCode,
    pub language_name: Option<String>,
    pub site_name: String,
    pub rewritten: usize,
    pub preserved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub variants: u32,
    pub documents_rewritten: usize,
    pub documents_preserved: usize,
    /// Documents left untouched because their language has no locale profile
    pub documents_rejected: usize,
    pub archives: Vec<ArchiveReport>,
    pub warnings: Vec<String>,
    pub domain_zone: Option<String>,
}

impl RunSummary {
    fn new(request: &RunRequest) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            variants: request.variants,
            documents_rewritten: 0,
            documents_preserved: 0,
            documents_rejected: 0,
            archives: Vec::new(),
            warnings: Vec::new(),
            domain_zone: request.domain_zone.clone(),
        }
    }

    fn record(&mut self, report: ArchiveReport) {
        self.documents_rewritten += report.rewritten;
        self.documents_preserved += report.preserved;
        self.documents_rejected += report.rejected;
        self.archives.push(report);
    }

    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Everything a run produced, passed through the run and handed back.
#[derive(Debug)]
pub struct RunState {
    pub phase: RunPhase,
    pub progress: f32,
    pub summary: RunSummary,
    pub artifacts: Vec<OutputArtifact>,
    pub error: Option<RunError>,
}

impl RunState {
    fn new(request: &RunRequest) -> Self {
        Self {
            phase: RunPhase::Idle,
            progress: 0.0,
            summary: RunSummary::new(request),
            artifacts: Vec::new(),
            error: None,
        }
    }

    fn advance(&mut self, phase: RunPhase, progress: f32, message: &str, sink: &dyn ProgressSink) {
        self.phase = phase;
        self.progress = progress;
        sink.report(phase, progress, message);
    }

    pub fn into_result(self) -> Result<(RunSummary, Vec<OutputArtifact>), RunError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.summary, self.artifacts)),
        }
    }
}

/// Receives progress updates; purely observational.
pub trait ProgressSink: Send + Sync {
    fn report(&self, phase: RunPhase, fraction: f32, message: &str);
}

/// Logs progress through `tracing`.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, phase: RunPhase, fraction: f32, message: &str) {
        info!("[{:>3.0}%] {:?}: {}", fraction * 100.0, phase, message);
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _phase: RunPhase, _fraction: f32, _message: &str) {}
}

/// An archive that extracted cleanly.
struct SourceArchive {
    index: usize,
    archive: Arc<Archive>,
    /// Detected in the variant 1 workspace
    language: LanguageCode,
    /// Variant 1 workspace, taken when that variant is rewritten
    workspace: Option<Workspace>,
}

enum DocumentOutcome {
    Rewritten,
    Preserved(RewriteError),
    Rejected(LocaleError),
}

pub struct VariantOrchestrator<C> {
    settings: RunSettings,
    detector: Arc<LanguageDetector>,
    rewriter: ContentRewriter<C>,
}

impl VariantOrchestrator<OpenAiClient> {
    /// Production orchestrator; validates the credential before anything else.
    pub fn for_credential(
        config: &Config,
        detector: Arc<LanguageDetector>,
        credential: &str,
    ) -> Result<Self, RunError> {
        let credential = Credential::parse(credential)?;
        let client = OpenAiClient::new(config, credential)?;
        Ok(Self::new(
            RunSettings::from(config),
            detector,
            ContentRewriter::new(client, RewriteSettings::from(config)),
        ))
    }
}

impl<C: CompletionClient> VariantOrchestrator<C> {
    pub fn new(settings: RunSettings, detector: Arc<LanguageDetector>, rewriter: ContentRewriter<C>) -> Self {
        Self {
            settings,
            detector,
            rewriter,
        }
    }

    /// Execute a run. Never panics on bad input; inspect `RunState::error`.
    pub async fn run(&self, request: RunRequest, progress: &dyn ProgressSink) -> RunState {
        let mut state = RunState::new(&request);

        match self.execute(request, &mut state, progress).await {
            Ok(()) => {
                let message = format!(
                    "{} rewritten, {} preserved, {} rejected",
                    state.summary.documents_rewritten,
                    state.summary.documents_preserved,
                    state.summary.documents_rejected
                );
                state.advance(RunPhase::Done, 1.0, &message, progress);
            }
            Err(e) => {
                error!("Run failed: {}", e);
                let message = e.to_string();
                state.error = Some(e);
                state.phase = RunPhase::Failed;
                progress.report(RunPhase::Failed, state.progress, &message);
            }
        }

        state.summary.finished_at = Some(Utc::now());
        state
    }

    /// Archives are extracted once up front to count and sample their
    /// documents. Those workspaces serve variant 1; every later variant
    /// extracts its own copy just before it is rewritten and drops it once
    /// packaged.
    async fn execute(
        &self,
        request: RunRequest,
        state: &mut RunState,
        progress: &dyn ProgressSink,
    ) -> Result<(), RunError> {
        let forced_language = self.validate(&request)?;
        let RunRequest {
            archives,
            variants,
            theme,
            seed,
            packaging,
            ..
        } = request;
        let archive_count = archives.len();

        // Saving
        state.advance(RunPhase::Saving, 0.0, "extracting archives", progress);
        tokio::fs::create_dir_all(&self.settings.work_dir)
            .await
            .map_err(|e| ArchiveError::io("run.create_work_dir", &self.settings.work_dir, e))?;
        let run_root = tempfile::Builder::new()
            .prefix("site-rewriter-")
            .tempdir_in(&self.settings.work_dir)
            .map_err(|e| ArchiveError::io("run.create_root", &self.settings.work_dir, e))?;

        let mut extracted = Vec::with_capacity(archive_count);
        for (index, archive) in archives.into_iter().enumerate() {
            let archive = Arc::new(archive);
            match self.materialize(run_root.path(), 1, index, &archive).await {
                Ok(workspace) => extracted.push((index, archive, workspace)),
                Err(e) => state
                    .summary
                    .warn(format!("Skipping archive '{}': {}", archive.file_name, e)),
            }
        }

        let total_documents: usize = extracted
            .iter()
            .map(|(_, _, workspace)| workspace.documents().len())
            .sum();
        if total_documents == 0 {
            return Err(RunError::NoDocuments);
        }
        state.advance(
            RunPhase::Saving,
            SAVED_PROGRESS,
            &format!("{} archives, {} documents per variant", extracted.len(), total_documents),
            progress,
        );

        // Detecting
        state.advance(RunPhase::Detecting, SAVED_PROGRESS, "detecting languages", progress);
        let mut sources = Vec::with_capacity(extracted.len());
        for (index, archive, workspace) in extracted {
            let language = self.language_for(&workspace, forced_language.as_ref()).await;
            sources.push(SourceArchive {
                index,
                archive,
                language,
                workspace: Some(workspace),
            });
        }
        state.advance(RunPhase::Detecting, DETECTED_PROGRESS, "languages detected", progress);

        // Rewriting
        let mut generator = match seed {
            Some(seed) => NameGenerator::seeded(seed),
            None => NameGenerator::from_entropy(),
        };
        let names = generator.generate_names(theme.as_deref(), variants as usize * archive_count);

        state.advance(RunPhase::Rewriting, DETECTED_PROGRESS, "rewriting documents", progress);
        let pair_count = sources.len() * variants as usize;
        let mut done = 0;
        let mut combined = match packaging {
            PackagingMode::Combined => Some(OutputPackage::new("rewritten_variants.zip")),
            PackagingMode::PerVariant => None,
        };

        for variant in 1..=variants {
            let mut package = match combined.take() {
                Some(package) => package,
                None => OutputPackage::new(format!("rewritten_var_{}.zip", variant)),
            };

            for source in &mut sources {
                let (workspace, language) = match source.workspace.take() {
                    Some(workspace) => (workspace, source.language.clone()),
                    None => {
                        let workspace = self
                            .materialize(run_root.path(), variant, source.index, &source.archive)
                            .await?;
                        let language = self.language_for(&workspace, forced_language.as_ref()).await;
                        (workspace, language)
                    }
                };
                let name_index = (variant as usize - 1) * archive_count + source.index;
                let site_name = names.get(name_index).cloned().unwrap_or_default();

                let report = self
                    .process_workspace(&workspace, &language, &site_name, &mut state.summary)
                    .await;
                state.summary.record(report);

                let prefix = match packaging {
                    PackagingMode::Combined => workspace.combined_prefix(),
                    PackagingMode::PerVariant if archive_count == 1 => String::new(),
                    PackagingMode::PerVariant => workspace.archive_label(),
                };
                package = append_workspace(package, prefix, workspace).await?;

                done += 1;
                let fraction = DETECTED_PROGRESS
                    + (REWRITTEN_PROGRESS - DETECTED_PROGRESS) * done as f32 / pair_count as f32;
                state.advance(
                    RunPhase::Rewriting,
                    fraction,
                    &format!("variant {} / {} done", variant, source.archive.file_name),
                    progress,
                );
            }

            match packaging {
                PackagingMode::Combined => combined = Some(package),
                PackagingMode::PerVariant => state.artifacts.push(package.finish()?),
            }
        }

        // Packaging
        state.advance(RunPhase::Packaging, REWRITTEN_PROGRESS, "packaging output", progress);
        if let Some(package) = combined {
            state.artifacts.push(package.finish()?);
        }

        Ok(())
    }

    /// Top-level checks, all before any extraction or remote call.
    fn validate(&self, request: &RunRequest) -> Result<Option<LanguageCode>, RunError> {
        if request.archives.is_empty() {
            return Err(RunError::NoArchives);
        }
        if request.variants == 0 || request.variants > self.settings.max_variants {
            return Err(RunError::VariantCount {
                requested: request.variants,
                max: self.settings.max_variants,
            });
        }
        for archive in &request.archives {
            archive.ensure_supported()?;
        }
        match &request.language {
            Some(code) => {
                Language::try_from(code)?;
                Ok(Some(code.clone()))
            }
            None => Ok(None),
        }
    }

    /// Extract on the blocking pool.
    async fn materialize(
        &self,
        base: &Path,
        variant: u32,
        index: usize,
        archive: &Arc<Archive>,
    ) -> Result<Workspace, ArchiveError> {
        let target = base.to_path_buf();
        let archive = Arc::clone(archive);
        let max_bytes = self.settings.max_extracted_bytes;

        tokio::task::spawn_blocking(move || {
            Workspace::materialize(&target, variant, index, &archive, max_bytes)
        })
        .await
        .map_err(|e| {
            ArchiveError::io("workspace.extract", base, io::Error::new(io::ErrorKind::Other, e))
        })?
    }

    async fn language_for(&self, workspace: &Workspace, forced: Option<&LanguageCode>) -> LanguageCode {
        let language = match forced {
            Some(code) => code.clone(),
            None => {
                let documents = workspace.documents();
                let samples = read_samples(&documents, self.settings.sample_documents).await;
                self.detector.detect_dominant(&samples)
            }
        };
        info!(
            "Variant {} / {}: language '{}'",
            workspace.variant, workspace.archive_name, language
        );
        language
    }

    async fn process_workspace(
        &self,
        workspace: &Workspace,
        language: &LanguageCode,
        site_name: &str,
        summary: &mut RunSummary,
    ) -> ArchiveReport {
        let documents = workspace.documents();
        let mut report = ArchiveReport {
            variant: workspace.variant,
            position: workspace.archive_index + 1,
            archive: workspace.archive_name.clone(),
            language: language.clone(),
            language_name: Language::try_from(language).ok().map(|l| l.native_name().to_string()),
            site_name: site_name.to_string(),
            rewritten: 0,
            preserved: 0,
            rejected: 0,
        };

        if let Err(e) = Language::try_from(language) {
            error!(
                "Variant {} / {}: {}; leaving {} documents untouched",
                workspace.variant,
                workspace.archive_name,
                e,
                documents.len()
            );
            summary.warnings.push(format!(
                "Variant {} / {}: {}",
                workspace.variant, workspace.archive_name, e
            ));
            report.rejected = documents.len();
            return report;
        }

        let pending: Vec<_> = documents
            .iter()
            .map(|path| {
                self.rewrite_document(path, language, site_name, workspace.variant)
                    .boxed()
            })
            .collect();
        let outcomes: Vec<DocumentOutcome> = stream::iter(pending)
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        for (path, outcome) in documents.iter().zip(outcomes) {
            match outcome {
                DocumentOutcome::Rewritten => report.rewritten += 1,
                DocumentOutcome::Preserved(e) => {
                    report.preserved += 1;
                    summary.warn(format!(
                        "Variant {} / {} / {}: kept original ({})",
                        workspace.variant,
                        workspace.archive_name,
                        workspace.relative(path).display(),
                        e
                    ));
                }
                DocumentOutcome::Rejected(e) => {
                    report.rejected += 1;
                    summary.warn(format!(
                        "Variant {} / {} / {}: {}",
                        workspace.variant,
                        workspace.archive_name,
                        workspace.relative(path).display(),
                        e
                    ));
                }
            }
        }

        report
    }

    async fn rewrite_document(
        &self,
        path: &Path,
        language: &LanguageCode,
        site_name: &str,
        variant: u32,
    ) -> DocumentOutcome {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => return DocumentOutcome::Preserved(RewriteError::Io(e.to_string())),
        };

        let request = RewriteRequest {
            language,
            target_name: site_name,
            variant,
        };
        let outcome = match self.rewriter.rewrite(&content, &request).await {
            Ok(outcome) => outcome,
            Err(e) => return DocumentOutcome::Rejected(e),
        };

        match outcome.status {
            RewriteStatus::Preserved(e) => DocumentOutcome::Preserved(e),
            RewriteStatus::Rewritten => match replace_file(path, &outcome.content).await {
                Ok(()) => DocumentOutcome::Rewritten,
                Err(e) => DocumentOutcome::Preserved(RewriteError::Io(e.to_string())),
            },
        }
    }
}

/// Contents of up to `limit` documents. Unreadable ones are logged and skipped.
async fn read_samples(paths: &[PathBuf], limit: usize) -> Vec<String> {
    let mut samples = Vec::new();
    for path in paths.iter().take(limit) {
        match tokio::fs::read(path).await {
            Ok(bytes) => samples.push(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => warn!("Skipping {} during detection: {}", path.display(), e),
        }
    }
    samples
}

/// Package a workspace on the blocking pool. The workspace is removed there too.
async fn append_workspace(
    mut package: OutputPackage,
    prefix: String,
    workspace: Workspace,
) -> Result<OutputPackage, ArchiveError> {
    let root = workspace.root().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<OutputPackage, ArchiveError> {
        package.append_tree(&prefix, workspace.root())?;
        Ok(package)
    })
    .await
    .map_err(|e| ArchiveError::io("package.append", root, io::Error::new(io::ErrorKind::Other, e)))?
}

/// Write through a sibling temp file so a failed write never truncates the page.
async fn replace_file(path: &Path, content: &str) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.rewrite", file_name));

    let result = async {
        tokio::fs::write(&temp, content).await?;
        tokio::fs::rename(&temp, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    result
}
