//! Integration tests for the site rewriter
//!
//! These tests drive complete runs, through the HTTP router and through the
//! orchestrator, against a mocked completion endpoint.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use site_rewriter::{
    archive::{zip_from_entries, Archive},
    config::Config,
    i18n::{DetectionRules, DetectorSettings, LanguageCode, LanguageDetector},
    orchestrator::{NoProgress, PackagingMode, RunPhase, RunRequest, VariantOrchestrator},
    server::{router, AppState},
};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_string_contains, header as header_matcher, method, path},
    Mock, MockServer, ResponseTemplate,
};

// ==================== Test Helpers ====================

const BOUNDARY: &str = "integration-boundary";
const API_KEY: &str = "sk-integration-0123456789";

const PAGE: &str = "<html><head><title>Home | Acme Bakery</title></head><body><h1>Welcome</h1><p>Fresh bread every morning.</p><p>Call 555-0100.</p></body></html>";
const REWRITTEN: &str = "<html><head><title>Startseite | Brotkel</title></head><body><h1>Willkommen</h1><p>Jeden Morgen frisches Brot.</p><p>Rufen Sie +49 30 123456 an.</p></body></html>";

const GERMAN_PAGE: &str = "<html><head><title>Bäckerei Müller</title></head><body><h1>Willkommen</h1><p>Schöne Grüße aus unserer Bäckerei. Wir backen jeden Morgen frisches Brot für Sie und Ihre Familie.</p></body></html>";

/// Create a test config pointing at the mock server
fn create_test_config(api_url: &str, work_dir: &TempDir) -> Config {
    Config {
        rewrite_api_url: format!("{}/v1/chat/completions", api_url),
        rewrite_model: "test-model".to_string(),
        rewrite_timeout_secs: 5,
        work_dir: work_dir.path().to_path_buf(),
        ..Config::default()
    }
}

fn detector() -> Arc<LanguageDetector> {
    Arc::new(LanguageDetector::new(
        DetectorSettings::default(),
        DetectionRules::embedded().expect("embedded rules"),
    ))
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn site_archive(page: &str) -> Vec<u8> {
    zip_from_entries([
        ("index.html", page),
        ("css/site.css", "body { color: #333; }"),
    ])
    .expect("zip should build")
}

fn multipart_body(fields: &[(&str, &str)], files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"archives\"; filename=\"{}\"\r\nContent-Type: application/zip\r\n\r\n",
                BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rewrite")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .expect("request should build")
}

fn app(config: Config) -> axum::Router {
    router(AppState {
        config: Arc::new(config),
        detector: detector(),
    })
}

fn unzip(bytes: &[u8]) -> Vec<(String, String)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("entry");
            let mut content = String::new();
            entry.read_to_string(&mut content).expect("utf-8 entry");
            (entry.name().to_string(), content)
        })
        .collect()
}

fn header_value(response: &axum::response::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// ==================== HTTP Workflow Tests ====================

#[tokio::test]
async fn test_upload_two_variants_returns_combined_zip() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_matcher("Authorization", format!("Bearer {}", API_KEY).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REWRITTEN)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let body = multipart_body(
        &[("api_key", API_KEY), ("variants", "2"), ("language", "de"), ("theme", "food")],
        &[("bakery.zip", site_archive(PAGE))],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "content-type"), "application/zip");
    assert!(header_value(&response, "content-disposition").contains("rewritten_variants.zip"));
    assert_eq!(header_value(&response, "x-documents-rewritten"), "2");
    assert_eq!(header_value(&response, "x-documents-preserved"), "0");
    assert_eq!(header_value(&response, "x-detected-languages"), "1=de");

    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let files = unzip(&bytes);
    let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "variant_1/01_bakery/css/site.css",
            "variant_1/01_bakery/index.html",
            "variant_2/01_bakery/css/site.css",
            "variant_2/01_bakery/index.html",
            "rewrite_summary.json",
        ]
    );
    for (name, content) in &files {
        if name.ends_with("index.html") {
            assert_eq!(content, REWRITTEN);
        } else if name.ends_with("site.css") {
            assert_eq!(content, "body { color: #333; }");
        }
    }

    // The work directory holds no leftovers once the response is built
    assert_eq!(std::fs::read_dir(work_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_single_variant_returns_per_variant_zip() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REWRITTEN)))
        .mount(&mock_server)
        .await;

    let body = multipart_body(
        &[("api_key", API_KEY), ("language", "de")],
        &[("bakery.zip", site_archive(PAGE))],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_value(&response, "content-disposition").contains("rewritten_var_1.zip"));

    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let names: Vec<String> = unzip(&bytes).into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["css/site.css", "index.html", "rewrite_summary.json"]);
}

#[tokio::test]
async fn test_service_error_preserves_documents() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = multipart_body(
        &[("api_key", API_KEY), ("language", "de")],
        &[("bakery.zip", site_archive(PAGE))],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-documents-rewritten"), "0");
    assert_eq!(header_value(&response, "x-documents-preserved"), "1");

    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let files = unzip(&bytes);
    let index = files.iter().find(|(n, _)| n == "index.html").unwrap();
    assert_eq!(index.1, PAGE);
}

#[tokio::test]
async fn test_rejected_credential_preserves_documents() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid key"})))
        .mount(&mock_server)
        .await;

    let body = multipart_body(
        &[("api_key", API_KEY), ("language", "en"), ("variants", "2")],
        &[("bakery.zip", site_archive(PAGE))],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-documents-preserved"), "2");
}

#[tokio::test]
async fn test_structure_changing_response_is_discarded() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    let restructured = REWRITTEN.replace("<h1>", "<h2>").replace("</h1>", "</h2>");
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&restructured)))
        .mount(&mock_server)
        .await;

    let body = multipart_body(
        &[("api_key", API_KEY), ("language", "de")],
        &[("bakery.zip", site_archive(PAGE))],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-documents-preserved"), "1");
}

#[tokio::test]
async fn test_response_reports_languages_and_warnings_per_archive() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let english = "<html><body><p>Welcome to our bakery. We bake fresh bread every morning and deliver it to your door with care.</p></body></html>";
    let body = multipart_body(
        &[("api_key", API_KEY)],
        &[
            ("broken.zip", b"PK\x03\x04garbage".to_vec()),
            ("mueller.zip", site_archive(GERMAN_PAGE)),
            ("bakery.zip", site_archive(english)),
        ],
    );
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, "x-detected-languages"), "2=de,3=en");
    assert_eq!(header_value(&response, "x-documents-preserved"), "2");

    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000).await.unwrap();
    let files = unzip(&bytes);
    let (_, summary) = files
        .iter()
        .find(|(name, _)| name == "rewrite_summary.json")
        .expect("summary should be packaged");
    let summary: serde_json::Value = serde_json::from_str(summary).unwrap();

    let warnings: Vec<&str> = summary["warnings"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w.as_str())
        .collect();
    assert_eq!(warnings.len(), 3);
    assert!(warnings[0].contains("broken.zip"));
    assert!(warnings[1].contains("mueller.zip") && warnings[1].contains("kept original"));
    assert!(warnings[2].contains("bakery.zip") && warnings[2].contains("kept original"));

    let archives = summary["archives"].as_array().unwrap();
    assert_eq!(archives.len(), 2);
    assert_eq!(archives[0]["archive"], "mueller.zip");
    assert_eq!(archives[0]["position"], 2);
    assert_eq!(archives[0]["language"], "de");
    assert_eq!(archives[1]["archive"], "bakery.zip");
    assert_eq!(archives[1]["language"], "en");
}

#[tokio::test]
async fn test_malformed_credential_makes_no_remote_call() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(REWRITTEN)))
        .expect(0)
        .mount(&mock_server)
        .await;

    let body = multipart_body(&[("api_key", "short")], &[("bakery.zip", site_archive(PAGE))]);
    let response = app(create_test_config(&mock_server.uri(), &work_dir))
        .oneshot(upload(body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Orchestrator Workflow Tests ====================

#[tokio::test]
async fn test_detected_language_drives_prompt() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &work_dir);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("German"))
        .and(body_string_contains("+49"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(GERMAN_PAGE)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = VariantOrchestrator::for_credential(&config, detector(), API_KEY).unwrap();
    let request = RunRequest {
        archives: vec![Archive::new("mueller.zip", site_archive(GERMAN_PAGE))],
        variants: 1,
        theme: None,
        domain_zone: Some(".de".to_string()),
        language: None,
        seed: Some(3),
        packaging: PackagingMode::PerVariant,
    };

    let state = orchestrator.run(request, &NoProgress).await;

    assert_eq!(state.phase, RunPhase::Done);
    assert_eq!(state.summary.documents_rewritten, 1);
    assert_eq!(state.summary.archives[0].language, LanguageCode::new("de"));
    assert_eq!(state.summary.archives[0].language_name.as_deref(), Some("Deutsch"));
    assert_eq!(state.summary.domain_zone.as_deref(), Some(".de"));
}

#[tokio::test]
async fn test_archives_in_different_languages_are_detected_separately() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &work_dir);

    let english = "<html><body><p>Welcome to our bakery. We bake fresh bread every morning and deliver it to your door with care.</p></body></html>";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let orchestrator = VariantOrchestrator::for_credential(&config, detector(), API_KEY).unwrap();
    let request = RunRequest {
        archives: vec![
            Archive::new("de.zip", site_archive(GERMAN_PAGE)),
            Archive::new("en.zip", site_archive(english)),
        ],
        variants: 2,
        theme: Some("food".to_string()),
        domain_zone: None,
        language: None,
        seed: Some(11),
        packaging: PackagingMode::Combined,
    };

    let (summary, artifacts) = orchestrator.run(request, &NoProgress).await.into_result().unwrap();

    let languages: Vec<&str> = summary.archives.iter().map(|r| r.language.as_str()).collect();
    assert_eq!(languages, vec!["de", "en", "de", "en"]);
    assert_eq!(summary.documents_preserved, 4);
    assert_eq!(artifacts.len(), 1);

    let serialized = serde_json::to_value(&summary).unwrap();
    assert_eq!(serialized["archives"].as_array().unwrap().len(), 4);
    assert_eq!(serialized["documents_preserved"], 4);
}

#[tokio::test]
async fn test_single_document_end_to_end() {
    let mock_server = MockServer::start().await;
    let work_dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &work_dir);

    let original = "<html><body><h1>Welcome</h1><p>Call us at 555-0000</p></body></html>";
    let french = "<html><body><h1>Bienvenue</h1><p>Appelez-nous au +33 1 23 45 67 89</p></body></html>";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("+33"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(french)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator = VariantOrchestrator::for_credential(&config, detector(), API_KEY).unwrap();
    let request = RunRequest {
        archives: vec![Archive::new(
            "site.zip",
            zip_from_entries([("index.html", original)]).unwrap(),
        )],
        variants: 1,
        theme: None,
        domain_zone: None,
        language: Some(LanguageCode::new("fr")),
        seed: None,
        packaging: PackagingMode::PerVariant,
    };

    let (summary, artifacts) = orchestrator.run(request, &NoProgress).await.into_result().unwrap();

    assert_eq!(summary.documents_rewritten, 1);
    assert_eq!(summary.documents_preserved, 0);
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].file_name, "rewritten_var_1.zip");
    assert_eq!(
        unzip(&artifacts[0].bytes),
        vec![("index.html".to_string(), french.to_string())]
    );
}
