use async_trait::async_trait;
use audit_engine::domain::model::CompletionRequest;
use audit_engine::domain::ports::CompletionClient;
use audit_engine::{create_router, AppState, AuditConfig, AuditError};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "audit-engine-test-boundary";

/// 批次請求全部回 "Order Status"；建議請求失敗，改走範本
struct ScriptedClient;

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> audit_engine::Result<String> {
        if !request.user.contains("Messages:\n") {
            return Err(AuditError::CompletionError {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let numbered = request
            .user
            .lines()
            .filter(|line| {
                line.split_once(". ")
                    .is_some_and(|(n, _)| n.parse::<usize>().is_ok())
            })
            .count();
        let items: Vec<Value> = (1..=numbered)
            .map(|i| serde_json::json!({"index": i, "category": "Order Status"}))
            .collect();
        Ok(serde_json::to_string(&items).unwrap())
    }
}

struct TestServer {
    _dir: TempDir,
    upload_dir: std::path::PathBuf,
    app: Router,
}

fn test_server() -> TestServer {
    test_server_with(AuditConfig::default())
}

fn test_server_with(mut config: AuditConfig) -> TestServer {
    let dir = TempDir::new().unwrap();
    config.server.upload_dir = dir.path().join("uploads").display().to_string();
    config.server.output_dir = dir.path().join("output").display().to_string();

    let upload_dir = dir.path().join("uploads");
    let state = AppState::new(config, Arc::new(ScriptedClient), false).unwrap();
    TestServer {
        _dir: dir,
        upload_dir,
        app: create_router(Arc::new(state)),
    }
}

struct Part<'a> {
    filename: &'a str,
    content_type: &'a str,
    data: &'a [u8],
}

fn multipart_body(parts: &[Part], industry: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, part.filename, part.content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(industry) = industry {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"industry\"\r\n\r\n{}\r\n",
                BOUNDARY, industry
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn audit_request(parts: &[Part], industry: Option<&str>, client_ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/audit")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-forwarded-for", client_ip)
        .body(Body::from(multipart_body(parts, industry)))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn tickets() -> Part<'static> {
    Part {
        filename: "tickets.txt",
        content_type: "text/plain",
        data: b"Where is my order #1001?\nMy package is late\nAny update on shipping?\n",
    }
}

fn blocked() -> Part<'static> {
    Part {
        filename: "tool.exe",
        content_type: "application/octet-stream",
        data: b"MZ",
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let server = test_server();

    let response = server.app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().contains_key("permissions-policy"));
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_root_lists_endpoints_outside_production() {
    let server = test_server();

    let response = server.app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "running");
    assert_eq!(json["environment"], "development");
    let endpoints = json["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "POST /audit"));
}

#[tokio::test]
async fn test_root_hides_endpoints_in_production() {
    let mut config = AuditConfig::default();
    config.server.environment = "Production".to_string();
    let server = test_server_with(config);

    let response = server.app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "running");
    assert!(json.get("endpoints").is_none());
    assert!(json.get("environment").is_none());
}

#[tokio::test]
async fn test_industries_lists_builtin_taxonomies() {
    let server = test_server();

    let response = server.app.oneshot(get("/industries")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["default"], "general");
    let keys: Vec<&str> = json["industries"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|i| i["key"].as_str())
        .collect();
    assert!(keys.contains(&"general"));
    assert!(keys.contains(&"ecommerce"));
}

#[tokio::test]
async fn test_audit_success_and_report_download() {
    let server = test_server();

    let before = server.app.clone().oneshot(get("/download-report")).await.unwrap();
    assert_eq!(before.status(), StatusCode::NOT_FOUND);
    let json = json_body(before).await;
    assert_eq!(json["detail"], "Report not found. Run audit first.");

    let response = server
        .app
        .clone()
        .oneshot(audit_request(&[tickets()], Some("ecommerce"), "198.51.100.1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;

    assert_eq!(json["status"], "success");
    assert_eq!(json["files_analyzed"], 1);
    assert_eq!(json["files"][0]["filename"], "tickets.txt");
    assert_eq!(json["files"][0]["messages_extracted"], 3);
    assert_eq!(json["total_messages_analyzed"], 3);
    assert_eq!(json["audit_results"]["industry"], "ecommerce");
    assert_eq!(json["audit_results"]["category_breakdown"]["Order Status"], 3);
    assert_eq!(json["audit_results"]["automation_score"], "100/100");
    assert_eq!(json["audit_results"]["cost_reduction_annually"], "INR 1,440");
    assert_eq!(json["audit_results"]["recommendation_source"], "templated");
    assert_eq!(json["classification_batches"][0]["tier"], "batch_success");
    assert_eq!(json["pdf_available"], true);

    // 暫存上傳檔在回應後已清除
    assert!(dir_is_empty(&server.upload_dir));

    let download = server.app.oneshot(get("/download-report")).await.unwrap();
    assert_eq!(download.status(), StatusCode::OK);
    assert_eq!(download.headers()[header::CONTENT_TYPE], "application/pdf");
    let disposition = download.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("AI_Audit_Report.pdf"));
    let bytes = to_bytes(download.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn test_blocked_extension_rejects_whole_request() {
    let server = test_server();
    let parts = [tickets(), blocked()];

    let response = server
        .app
        .oneshot(audit_request(&parts, None, "198.51.100.2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], true);
    assert_eq!(json["status"], 400);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.starts_with("File 'tool.exe' rejected"));
    assert!(detail.contains("blocked for security reasons"));
    assert!(dir_is_empty(&server.upload_dir));
}

#[tokio::test]
async fn test_too_many_files_is_rejected() {
    let server = test_server();
    let parts: Vec<Part> = (0..11).map(|_| tickets()).collect();

    let response = server
        .app
        .oneshot(audit_request(&parts, None, "198.51.100.3"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["detail"], "Maximum 10 files per request. You sent 11.");
}

#[tokio::test]
async fn test_file_without_content_is_no_content_error() {
    let server = test_server();
    let parts = [Part {
        filename: "blank.txt",
        content_type: "text/plain",
        data: b"\n   \n",
    }];

    let response = server
        .app
        .oneshot(audit_request(&parts, None, "198.51.100.4"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(
        json["detail"],
        "No content could be extracted from uploaded files."
    );
}

#[tokio::test]
async fn test_eleventh_request_in_window_is_rate_limited() {
    let server = test_server();

    for _ in 0..10 {
        let response = server
            .app
            .clone()
            .oneshot(audit_request(&[blocked()], None, "203.0.113.9"))
            .await
            .unwrap();
        // 被拒絕的請求仍計入次數
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let limited = server
        .app
        .clone()
        .oneshot(audit_request(&[blocked()], None, "203.0.113.9"))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = json_body(limited).await;
    assert_eq!(json["retry_after_seconds"], 60);

    // 其他來源與其他路徑不受影響
    let other_client = server
        .app
        .clone()
        .oneshot(audit_request(&[blocked()], None, "203.0.113.10"))
        .await
        .unwrap();
    assert_eq!(other_client.status(), StatusCode::BAD_REQUEST);
    let health = server.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}
