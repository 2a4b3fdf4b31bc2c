use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use repo_packer::{
    create_router, AccessChecker, AccessStatus, AppState, Config, IngestOutput, IngestRequest,
    IngestionFailure, Ingestor, Pipeline, RateLimit, RepositoryReference, TokenizerKind,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const SEPARATOR: &str = "================================================";

struct FixedAccess(AccessStatus);

#[async_trait]
impl AccessChecker for FixedAccess {
    async fn check(&self, _reference: &RepositoryReference) -> AccessStatus {
        self.0.clone()
    }
}

/// Returns a canned result and records every request it receives.
struct RecordingIngestor {
    result: Result<IngestOutput, IngestionFailure>,
    calls: AtomicUsize,
    last: Mutex<Option<IngestRequest>>,
}

impl RecordingIngestor {
    fn new(result: Result<IngestOutput, IngestionFailure>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ingestor for RecordingIngestor {
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestOutput, IngestionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(request.clone());
        self.result.clone()
    }
}

fn output(files: u64, tokens: &str, content: &str) -> Result<IngestOutput, IngestionFailure> {
    Ok(IngestOutput {
        summary: format!("Repository: octo/demo\nFiles analyzed: {files}\n\nEstimated tokens: {tokens}"),
        tree: "Directory structure:\n└── demo/".to_string(),
        content: content.to_string(),
    })
}

fn pack(files: &[(&str, &str)]) -> String {
    files
        .iter()
        .map(|(path, text)| format!("{SEPARATOR}\nFile: {path}\n{SEPARATOR}\n{text}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn config(rate_limits: Vec<RateLimit>) -> Config {
    Config::builder()
        .auth_token(TOKEN)
        .tokenizer(TokenizerKind::Simple)
        .rate_limits(rate_limits)
        .build()
        .unwrap()
}

fn app_with(access: AccessStatus, ingestor: Arc<RecordingIngestor>, rate_limits: Vec<RateLimit>) -> Router {
    let config = config(rate_limits);
    let tokenizer = config.tokenizer.create().unwrap();
    let pipeline = Pipeline::new(&config, Arc::new(FixedAccess(access)), ingestor, tokenizer);
    create_router(Arc::new(AppState::new(config, pipeline)))
}

fn app(ingestor: Arc<RecordingIngestor>) -> Router {
    app_with(AccessStatus::Accessible, ingestor, vec![])
}

fn pack_request(auth: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/pack")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn authorized(body: &Value) -> Request<Body> {
    pack_request(Some(&format!("Bearer {TOKEN}")), body)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_missing_authorization_header() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let body = json!({"repo_url": "https://github.com/octo/demo"});

    let (status, body) = send(app(ingestor.clone()), pack_request(None, &body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "No authorization header"}));
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_basic_scheme_is_rejected() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let body = json!({"repo_url": "https://github.com/octo/demo"});

    let (status, body) = send(app(ingestor), pack_request(Some("Basic xyz"), &body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid authorization header format"}));
}

#[tokio::test]
async fn test_wrong_token() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let body = json!({"repo_url": "https://github.com/octo/demo"});

    let (status, body) = send(app(ingestor), pack_request(Some("Bearer wrong"), &body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid token"}));
}

#[tokio::test]
async fn test_pack_under_budget() {
    let content = pack(&[("README.md", "# demo"), ("src/lib.rs", "pub fn f() {}")]);
    let ingestor = RecordingIngestor::new(output(2, "50.0k", &content));

    let (status, body) = send(
        app(ingestor.clone()),
        authorized(&json!({"repo_url": "https://github.com/octo/demo.git", "exclude_patterns": ["*.md"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"files_analyzed": 2, "estimated_tokens": 50_000.0, "content": content})
    );

    let forwarded = ingestor.last.lock().unwrap().clone().unwrap();
    assert_eq!(forwarded.reference.as_str(), "https://github.com/octo/demo");
    assert_eq!(forwarded.max_file_size, 10_485_760);
    assert_eq!(forwarded.exclude_patterns.as_deref(), Some("*.md,**/*.md"));
}

#[tokio::test]
async fn test_pack_over_budget() {
    let content = pack(&[
        ("small.txt", &"a".repeat(40)),
        ("huge.txt", &"b".repeat(4000)),
        ("medium.txt", &"c".repeat(400)),
    ]);
    let ingestor = RecordingIngestor::new(output(3, "150.0k", &content));

    let (status, body) = send(
        app(ingestor),
        authorized(&json!({"repo_url": "https://github.com/octo/demo"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "error": "Token limit exceeded",
            "files_analyzed": 3,
            "estimated_tokens": 150_000.0,
            "largest_files": [
                {"path": "huge.txt", "tokens": 1000},
                {"path": "medium.txt", "tokens": 100},
                {"path": "small.txt", "tokens": 10},
            ],
        })
    );
    assert!(body.get("content").is_none());
}

#[tokio::test]
async fn test_caller_budget_overrides_default() {
    let ingestor = RecordingIngestor::new(output(1, "50.0k", &pack(&[("a", "x")])));

    let (status, body) = send(
        app(ingestor),
        authorized(&json!({"repo_url": "https://github.com/octo/demo", "max_tokens": 10_000})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Token limit exceeded");
}

#[tokio::test]
async fn test_missing_repo_url() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));

    let (status, body) = send(app(ingestor.clone()), authorized(&json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "repo_url is required"}));
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_non_github_url() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));

    let (status, body) = send(
        app(ingestor.clone()),
        authorized(&json!({"repo_url": "https://gitlab.com/octo/demo"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"error": "Invalid GitHub repository URL. Please provide a valid GitHub repository URL."})
    );
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_missing_repository_is_never_ingested() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let app = app_with(
        AccessStatus::denied(404, "Repository not found"),
        ingestor.clone(),
        vec![],
    );

    let (status, body) = send(app, authorized(&json!({"repo_url": "https://github.com/octo/nope"}))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Repository not found"}));
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_private_repository() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let app = app_with(
        AccessStatus::denied(403, "Repository is not accessible. Make sure it is public"),
        ingestor.clone(),
        vec![],
    );

    let (status, _) = send(app, authorized(&json!({"repo_url": "https://github.com/octo/secret"}))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_ingestion_failure_reports_diagnostics() {
    let ingestor = RecordingIngestor::new(Err(IngestionFailure::new(
        "Cmd('git') failed",
        "GitCommandError",
        "Traceback (most recent call last):\nGitCommandError: Cmd('git') failed",
    )));

    let (status, body) = send(
        app(ingestor),
        authorized(&json!({"repo_url": "https://github.com/octo/demo"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Cmd('git') failed");
    assert_eq!(body["type"], "GitCommandError");
    assert!(body["traceback"].as_str().unwrap().starts_with("Traceback"));
}

#[tokio::test]
async fn test_malformed_body() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let request = Request::builder()
        .method("POST")
        .uri("/api/pack")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(app(ingestor), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_invalid_exclude_pattern() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));

    let (status, body) = send(
        app(ingestor.clone()),
        authorized(&json!({"repo_url": "https://github.com/octo/demo", "exclude_patterns": ["src/[abc"]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("src/[abc"));
    assert_eq!(ingestor.calls(), 0);
}

#[tokio::test]
async fn test_rate_limit_applies_before_auth() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let app = app_with(
        AccessStatus::Accessible,
        ingestor,
        vec![RateLimit::new(2, Duration::from_secs(60))],
    );
    let body = json!({"repo_url": "https://github.com/octo/demo"});

    for _ in 0..2 {
        let (status, _) = send(app.clone(), pack_request(Some("Bearer wrong"), &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let response = app.oneshot(authorized(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_healthz_needs_no_auth() {
    let ingestor = RecordingIngestor::new(output(1, "1k", ""));
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();

    let (status, body) = send(app(ingestor), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
