use crate::core::audit::AuditResponse;
use crate::server::error::ApiError;
use crate::server::upload::UploadBatch;
use crate::server::AppState;
use crate::utils::error::AuditError;
use crate::utils::monitor::PhaseMonitor;
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

struct PendingUpload {
    name: String,
    content_type: Option<String>,
    data: Bytes,
}

/// 端點清單只在非 production 環境公開
pub async fn root(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mut body = json!({
        "status": "running",
        "message": "AI Audit Engine running 🚀",
        "version": VERSION,
    });
    if !state.config.is_production() {
        body["environment"] = json!(state.config.server.environment);
        body["endpoints"] = json!([
            "GET /health",
            "GET /industries",
            "POST /audit",
            "GET /download-report",
        ]);
    }
    Json(body)
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": VERSION,
    }))
}

pub async fn industries(State(state): State<Arc<AppState>>) -> Json<Value> {
    let registry = state.engine.taxonomies();
    let industries: Vec<Value> = registry
        .keys()
        .into_iter()
        .filter_map(|key| registry.get(key))
        .map(|taxonomy| {
            json!({
                "key": taxonomy.key,
                "categories": taxonomy.categories,
                "automatable": taxonomy.automatable,
            })
        })
        .collect();

    Json(json!({
        "default": registry.default_taxonomy().key,
        "industries": industries,
    }))
}

/// 先讀完整個 multipart，才能依原始檔案數回報錯誤
async fn read_multipart(
    multipart: &mut Multipart,
) -> Result<(Vec<PendingUpload>, Option<String>), ApiError> {
    let mut uploads = Vec::new();
    let mut industry = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("⚠️ Malformed multipart body: {}", e);
        ApiError::bad_request("Malformed multipart request body.")
    })? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("industry") => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| ApiError::bad_request("Could not read the industry field."))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    industry = Some(value);
                }
            }
            Some("files") | Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| {
                    tracing::warn!("⚠️ Failed to read upload {}: {}", name, e);
                    ApiError::bad_request("Upload could not be read.")
                })?;
                uploads.push(PendingUpload {
                    name,
                    content_type,
                    data,
                });
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok((uploads, industry))
}

pub async fn audit(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AuditResponse>, ApiError> {
    let (uploads, industry) = read_multipart(&mut multipart).await?;
    let policy = &state.upload_policy;

    policy.check_count(uploads.len()).map_err(ApiError::from)?;

    // batch 在函式結束時（包含所有錯誤路徑）清除暫存檔
    let mut batch = UploadBatch::new(&state.config.server.upload_dir);
    for upload in &uploads {
        policy
            .validate_file(&upload.name, upload.content_type.as_deref())
            .map_err(|e| {
                ApiError::bad_request(format!(
                    "File '{}' rejected: {}",
                    upload.name,
                    e.user_friendly_message()
                ))
            })?;

        batch
            .save(&upload.name, upload.content_type.clone(), &upload.data)
            .await
            .map_err(ApiError::from)?;

        policy.check_size(upload.data.len() as u64).map_err(|e| {
            ApiError::bad_request(format!("File '{}': {}", upload.name, e.user_friendly_message()))
        })?;
        policy
            .check_total(batch.total_bytes())
            .map_err(ApiError::from)?;
    }

    tracing::info!(
        "🔍 Auditing {} files (industry: {})",
        batch.files().len(),
        industry.as_deref().unwrap_or("default")
    );

    let monitor = PhaseMonitor::new(state.monitor_enabled);
    let response = state
        .engine
        .audit_files(batch.files(), industry.as_deref(), &monitor)
        .await?;
    monitor.log_final_stats();

    Ok(Json(response))
}

pub async fn download_report(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bytes = match state.engine.load_report().await {
        Ok(bytes) => bytes,
        Err(AuditError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Report not found. Run audit first."));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!("📄 Serving report ({} bytes)", bytes.len());
    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.server.download_filename
    );
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
