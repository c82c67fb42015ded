//! HTTP front end: an upload form and the endpoint that runs a rewrite.

use crate::archive::Archive;
use crate::config::Config;
use crate::error::RunError;
use crate::i18n::{LanguageCode, LanguageDetector};
use crate::orchestrator::{PackagingMode, RunRequest, RunSummary, TracingProgress, VariantOrchestrator};
use crate::security::access_allowed;
use anyhow::Result;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderName, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const FORM_PAGE: &str = include_str!("form.html");

/// Run summary written at the root of every returned archive.
const SUMMARY_ENTRY: &str = "rewrite_summary.json";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub detector: Arc<LanguageDetector>,
}

#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    BadRequest(String),
    Internal(String),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        if err.is_configuration_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(format!("invalid upload: {}", err.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "invalid access token".to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/", get(form_page))
        .route("/rewrite", post(rewrite))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Config, detector: LanguageDetector) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState {
        config: Arc::new(config),
        detector: Arc::new(detector),
    };

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn form_page() -> Html<&'static str> {
    Html(FORM_PAGE)
}

async fn health() -> &'static str {
    "OK"
}

/// Raw form fields as submitted.
#[derive(Default)]
struct UploadForm {
    archives: Vec<Archive>,
    api_key: String,
    variants: Option<String>,
    theme: Option<String>,
    domain_zone: Option<String>,
    language: Option<String>,
    seed: Option<String>,
    access_token: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "archives" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let bytes = field.bytes().await?;
                    // Browsers send an empty part when no file was chosen
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.archives.push(Archive::new(file_name, bytes.to_vec()));
                }
                "api_key" => form.api_key = field.text().await?,
                "variants" => form.variants = non_empty(field.text().await?),
                "theme" => form.theme = non_empty(field.text().await?),
                "domain_zone" => form.domain_zone = non_empty(field.text().await?),
                "language" => form.language = non_empty(field.text().await?),
                "seed" => form.seed = non_empty(field.text().await?),
                "access_token" => form.access_token = non_empty(field.text().await?),
                other => warn!("Ignoring unknown form field '{}'", other),
            }
        }

        Ok(form)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_field<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, AppError> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| AppError::BadRequest(format!("{} must be a number, got '{}'", name, v)))
        })
        .transpose()
}

fn authorize(config: &Config, provided: Option<&str>) -> Result<(), AppError> {
    if access_allowed(config.access_token.as_deref(), provided) {
        Ok(())
    } else {
        Err(AppError::Unauthorized)
    }
}

async fn rewrite(State(state): State<AppState>, multipart: Multipart) -> Result<Response, AppError> {
    let form = UploadForm::read(multipart).await?;
    authorize(&state.config, form.access_token.as_deref())?;

    let variants = parse_field::<u32>("variants", form.variants)?.unwrap_or(1);
    let seed = parse_field::<u64>("seed", form.seed)?;
    let orchestrator =
        VariantOrchestrator::for_credential(&state.config, state.detector.clone(), &form.api_key)?;

    info!(
        "Rewrite requested: {} archive(s), {} variant(s)",
        form.archives.len(),
        variants
    );

    let request = RunRequest {
        archives: form.archives,
        variants,
        theme: form.theme,
        domain_zone: form.domain_zone,
        language: form.language.map(LanguageCode::new),
        seed,
        packaging: if variants == 1 {
            PackagingMode::PerVariant
        } else {
            PackagingMode::Combined
        },
    };

    let (summary, mut artifacts) = orchestrator.run(request, &TracingProgress).await.into_result()?;
    let mut artifact = artifacts
        .pop()
        .ok_or_else(|| AppError::Internal("run produced no output".to_string()))?;

    match serde_json::to_vec_pretty(&summary) {
        Ok(json) => {
            if let Err(e) = artifact.append_entry(SUMMARY_ENTRY, &json) {
                warn!("Summary not added to {}: {}", artifact.file_name, e);
            }
        }
        Err(e) => warn!("Summary could not be serialized: {}", e),
    }

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        ),
        (
            HeaderName::from_static("x-documents-rewritten"),
            summary.documents_rewritten.to_string(),
        ),
        (
            HeaderName::from_static("x-documents-preserved"),
            summary.documents_preserved.to_string(),
        ),
        (
            HeaderName::from_static("x-documents-rejected"),
            summary.documents_rejected.to_string(),
        ),
        (
            HeaderName::from_static("x-detected-languages"),
            detected_languages(&summary),
        ),
    ];

    Ok((headers, artifact.bytes).into_response())
}

/// `position=code` for every archive that was processed, in upload order.
fn detected_languages(summary: &RunSummary) -> String {
    summary
        .archives
        .iter()
        .filter(|report| report.variant == 1)
        .map(|report| format!("{}={}", report.position, report.language))
        .collect::<Vec<_>>()
        .join(",")
}
