use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use deploy_hook::audit::AuditLogger;
use deploy_hook::utils::github_signature;
use deploy_hook::{AppState, Project, ProjectRegistry, api};
use serde_json::Value;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "topsecret";
const PUSH_BODY: &str = r#"{"ref":"refs/heads/main","after":"abc123","repository":{"name":"site","full_name":"acme/site","default_branch":"main","pushed_at":1700000000}}"#;

struct Harness {
    _dir: TempDir,
    project_dir: PathBuf,
    audit_path: PathBuf,
    router: Router,
}

impl Harness {
    /// One project named "site" whose script drops a marker file when run.
    async fn new(script: &str, mode: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("site");
        let scripts = project_dir.join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        let script_path = scripts.join("cd.sh");
        std::fs::write(&script_path, script).unwrap();
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(mode)).unwrap();

        let mut projects = HashMap::new();
        projects.insert("site".to_string(), Project::new(SECRET, &project_dir));
        let registry = ProjectRegistry::from_projects(projects).unwrap();

        let audit_path = dir.path().join("logs").join("log.log");
        let audit = AuditLogger::open(&audit_path).await.unwrap();
        let state = Arc::new(AppState::new(registry, audit, 1024 * 1024));

        Self {
            _dir: dir,
            project_dir,
            audit_path,
            router: api::router(state),
        }
    }

    async fn marker_script() -> Self {
        Self::new("echo deployed > deployed.marker\n", 0o644).await
    }

    fn script_path(&self) -> PathBuf {
        self.project_dir.join("scripts").join("cd.sh")
    }

    fn script_ran(&self) -> bool {
        self.project_dir.join("deployed.marker").exists()
    }

    fn audit_records(&self) -> Vec<Value> {
        std::fs::read_to_string(&self.audit_path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

fn webhook_request(
    uri: &str,
    event: &str,
    content_type: &str,
    body: &str,
    signature: Option<String>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", content_type)
        .header("x-github-event", event)
        .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958");
    if let Some(signature) = signature {
        builder = builder.header("x-hub-signature-256", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed_push(uri: &str, body: &str) -> Request<Body> {
    let signature = github_signature(SECRET, body.as_bytes()).unwrap();
    webhook_request(uri, "push", "application/json", body, Some(signature))
}

fn mode_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

#[tokio::test]
async fn push_repairs_script_and_deploys() {
    let harness = Harness::marker_script().await;

    let (status, body) = harness.send(signed_push("/webhook?project=site", PUSH_BODY)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["deployed"], true);
    assert!(harness.script_ran());
    assert_eq!(mode_of(&harness.script_path()), 0o755);

    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "success");
    assert_eq!(records[0]["project_name"], "site");
    assert_eq!(records[0]["headers"]["x-github-event"], "push");
    assert_eq!(records[0]["payload"]["full_name"], "acme/site");
    assert_eq!(records[0]["payload"]["ref"], "refs/heads/main");
}

#[tokio::test]
async fn unknown_project_is_rejected_and_audited() {
    let harness = Harness::marker_script().await;

    let (status, body) = harness.send(signed_push("/webhook?project=foo", PUSH_BODY)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "invalid_project");
    assert!(!harness.script_ran());

    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "invalid project");
    assert_eq!(records[0]["project_name"], "foo");
}

#[tokio::test]
async fn wrong_signature_never_runs_script() {
    let harness = Harness::marker_script().await;
    let forged = github_signature("not-the-secret", PUSH_BODY.as_bytes()).unwrap();

    let (status, body) = harness
        .send(webhook_request(
            "/webhook?project=site",
            "push",
            "application/json",
            PUSH_BODY,
            Some(forged),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "invalid_signature");
    assert!(!harness.script_ran());
    assert_eq!(mode_of(&harness.script_path()), 0o644);

    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "invalid signature");
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let harness = Harness::marker_script().await;

    let (status, _) = harness
        .send(webhook_request(
            "/webhook?project=site",
            "push",
            "application/json",
            PUSH_BODY,
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.audit_records()[0]["status"], "invalid signature");
}

#[tokio::test]
async fn non_push_event_skips_script() {
    let harness = Harness::marker_script().await;
    let body = r#"{"zen":"Design for failure.","hook_id":1}"#;
    let signature = github_signature(SECRET, body.as_bytes()).unwrap();

    let (status, response) = harness
        .send(webhook_request(
            "/webhook?project=site",
            "ping",
            "application/json",
            body,
            Some(signature),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["deployed"], false);
    assert!(!harness.script_ran());

    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "success");
    assert!(records[0]["payload"].is_null());
}

#[tokio::test]
async fn missing_project_name_is_rejected_and_audited() {
    let harness = Harness::marker_script().await;

    for uri in ["/webhook", "/webhook?project="] {
        let (status, body) = harness.send(signed_push(uri, PUSH_BODY)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "project_name_required");
    }

    let records = harness.audit_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["status"] == "project name required"));
    assert!(!harness.script_ran());
}

#[tokio::test]
async fn malformed_json_is_rejected_before_lookup() {
    let harness = Harness::marker_script().await;

    // Unknown project as well: decoding is checked first
    let (status, body) = harness.send(signed_push("/webhook?project=foo", "{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "invalid_payload");
    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    assert!(
        records[0]["status"]
            .as_str()
            .unwrap()
            .starts_with("error parsing payload:")
    );
}

#[tokio::test]
async fn form_encoded_push_is_verified_over_raw_body() {
    let harness = Harness::marker_script().await;
    let form_body = format!("payload={}", urlencoding::encode(PUSH_BODY));
    let signature = github_signature(SECRET, form_body.as_bytes()).unwrap();

    let (status, _) = harness
        .send(webhook_request(
            "/webhook?project=site",
            "push",
            "application/x-www-form-urlencoded",
            &form_body,
            Some(signature),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(harness.script_ran());
    assert_eq!(harness.audit_records()[0]["payload"]["repository_name"], "site");
}

#[tokio::test]
async fn failing_script_returns_500_with_output_in_audit_only() {
    let harness = Harness::new("echo 'npm ERR! missing script' >&2\nexit 1\n", 0o755).await;

    let (status, body) = harness.send(signed_push("/webhook?project=site", PUSH_BODY)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["reason"], "script_failed");
    assert!(!body.to_string().contains("npm ERR!"));

    let records = harness.audit_records();
    assert_eq!(records.len(), 1);
    let audit_status = records[0]["status"].as_str().unwrap();
    assert!(audit_status.starts_with("error executing script:"));
    assert!(audit_status.contains("npm ERR! missing script"));
}

#[tokio::test]
async fn missing_script_returns_500() {
    let harness = Harness::marker_script().await;
    std::fs::remove_file(harness.script_path()).unwrap();

    let (status, body) = harness.send(signed_push("/webhook?project=site", PUSH_BODY)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["reason"], "script_failed");
    let audit_status = harness.audit_records()[0]["status"].as_str().unwrap().to_string();
    assert!(audit_status.contains("script does not exist"));
}

#[tokio::test]
async fn metrics_returns_audit_log() {
    let harness = Harness::marker_script().await;
    harness.send(signed_push("/webhook?project=foo", PUSH_BODY)).await;

    let response = harness
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; charset=utf-8"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text, std::fs::read_to_string(&harness.audit_path).unwrap());
    assert!(text.contains("invalid project"));
}

#[tokio::test]
async fn wrong_methods_are_not_allowed() {
    let harness = Harness::marker_script().await;

    let get_webhook = Request::builder().uri("/webhook?project=site").body(Body::empty()).unwrap();
    let response = harness.router.clone().oneshot(get_webhook).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let post_metrics = Request::builder()
        .method(Method::POST)
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = harness.router.clone().oneshot(post_metrics).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_check_reports_projects() {
    let harness = Harness::marker_script().await;

    let (status, body) = harness
        .send(Request::builder().uri("/?format=json").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["total_projects"], 1);
}

#[tokio::test]
async fn audit_write_failure_does_not_change_response() {
    let harness = Harness::marker_script().await;

    // Read-only handle: every audit append fails
    let audit_file = tokio::fs::File::open(&harness.audit_path).await.unwrap();
    let mut projects = HashMap::new();
    projects.insert("site".to_string(), Project::new(SECRET, &harness.project_dir));
    let registry = ProjectRegistry::from_projects(projects).unwrap();
    let state = Arc::new(AppState::new(
        registry,
        AuditLogger::from_writer(audit_file),
        1024 * 1024,
    ));
    let router = api::router(state);

    let ping_body = r#"{"zen":"Approachable is better than simple."}"#;
    let ping = webhook_request(
        "/webhook?project=site",
        "ping",
        "application/json",
        ping_body,
        github_signature(SECRET, ping_body.as_bytes()),
    );
    let response = router.clone().oneshot(ping).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let push = signed_push("/webhook?project=site", PUSH_BODY);
    let response = router.clone().oneshot(push).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.script_ran());

    let forged = webhook_request(
        "/webhook?project=site",
        "push",
        "application/json",
        PUSH_BODY,
        Some("sha256=00".to_string()),
    );
    let response = router.oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(harness.audit_records().is_empty());
}
