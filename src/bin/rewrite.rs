//! Rewrite site archives from disk without the web form.
//!
//! Usage:
//!   rewrite site.zip [more.zip ...] [--variants N] [--theme T] [--language xx]
//!           [--seed N] [--domain-zone Z] [--combined] [--out DIR]
//!
//! Required environment variables:
//! - REWRITE_API_KEY
//!
//! Every other setting comes from the same environment variables as the server.
//! Writes the packaged archive(s) and `summary.json` into `--out` (default: `.`).

use anyhow::{bail, Context, Result};
use site_rewriter::archive::Archive;
use site_rewriter::config::Config;
use site_rewriter::i18n::{LanguageCode, LanguageDetector};
use site_rewriter::orchestrator::{PackagingMode, RunRequest, TracingProgress, VariantOrchestrator};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "Usage: rewrite <archive.zip>... [--variants N] [--theme T] [--language xx] \
[--seed N] [--domain-zone Z] [--combined] [--out DIR]";

#[derive(Debug, PartialEq)]
struct CliArgs {
    archives: Vec<PathBuf>,
    variants: u32,
    theme: Option<String>,
    language: Option<String>,
    seed: Option<u64>,
    domain_zone: Option<String>,
    combined: bool,
    out: PathBuf,
}

impl CliArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = CliArgs {
            archives: Vec::new(),
            variants: 1,
            theme: None,
            language: None,
            seed: None,
            domain_zone: None,
            combined: false,
            out: PathBuf::from("."),
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .cloned()
                    .with_context(|| format!("{} needs a value\n{}", flag, USAGE))
            };
            match arg.as_str() {
                "--variants" => {
                    parsed.variants = value("--variants")?
                        .parse()
                        .context("--variants must be a positive number")?
                }
                "--theme" => parsed.theme = Some(value("--theme")?),
                "--language" => parsed.language = Some(value("--language")?),
                "--seed" => {
                    parsed.seed = Some(value("--seed")?.parse().context("--seed must be a number")?)
                }
                "--domain-zone" => parsed.domain_zone = Some(value("--domain-zone")?),
                "--out" => parsed.out = PathBuf::from(value("--out")?),
                "--combined" => parsed.combined = true,
                "-h" | "--help" => bail!("{}", USAGE),
                flag if flag.starts_with("--") => bail!("Unknown option {}\n{}", flag, USAGE),
                path => parsed.archives.push(PathBuf::from(path)),
            }
        }

        if parsed.archives.is_empty() {
            bail!("No archives given\n{}", USAGE);
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("site_rewriter=info".parse()?)
                .add_directive("rewrite=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = CliArgs::parse(&args)?;

    let config = Config::from_env()?;
    let detector = Arc::new(LanguageDetector::from_config(&config)?);
    let api_key = std::env::var("REWRITE_API_KEY").unwrap_or_default();
    let orchestrator = VariantOrchestrator::for_credential(&config, detector, &api_key)?;

    let mut archives = Vec::with_capacity(cli.archives.len());
    for path in &cli.archives {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "site.zip".to_string());
        archives.push(Archive::new(file_name, bytes));
    }

    let request = RunRequest {
        archives,
        variants: cli.variants,
        theme: cli.theme,
        domain_zone: cli.domain_zone,
        language: cli.language.map(LanguageCode::new),
        seed: cli.seed,
        packaging: if cli.combined {
            PackagingMode::Combined
        } else {
            PackagingMode::PerVariant
        },
    };

    let (summary, artifacts) = orchestrator.run(request, &TracingProgress).await.into_result()?;

    fs::create_dir_all(&cli.out)
        .with_context(|| format!("Failed to create output directory {}", cli.out.display()))?;
    for artifact in &artifacts {
        let path = cli.out.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {}", path.display());
    }

    let summary_path = cli.out.join("summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    info!(
        "Done: {} rewritten, {} preserved, {} rejected, {} warning(s)",
        summary.documents_rewritten,
        summary.documents_preserved,
        summary.documents_rejected,
        summary.warnings.len()
    );
    Ok(())
}
