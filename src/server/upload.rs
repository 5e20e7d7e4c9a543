//! Upload validation and temporary storage of uploaded files.

use crate::config::toml_config::UploadConfig;
use crate::domain::model::UploadedFile;
use crate::utils::error::{AuditError, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_files: usize,
    allowed_extensions: Vec<String>,
    blocked_extensions: Vec<String>,
    blocked_content_types: Vec<String>,
}

fn rejection(message: String) -> AuditError {
    AuditError::ValidationError { message }
}

impl UploadPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        let normalize = |items: &[String]| {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect::<Vec<_>>()
        };
        Self {
            max_file_bytes: config.max_file_size_mb * MB,
            max_total_bytes: config.max_total_size_mb * MB,
            max_files: config.max_files,
            allowed_extensions: normalize(&config.allowed_extensions),
            blocked_extensions: normalize(&config.blocked_extensions),
            blocked_content_types: normalize(&config.blocked_content_types),
        }
    }

    pub fn check_count(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(rejection("No files provided.".to_string()));
        }
        if count > self.max_files {
            return Err(rejection(format!(
                "Maximum {} files per request. You sent {}.",
                self.max_files, count
            )));
        }
        Ok(())
    }

    /// 封鎖清單優先於允許清單
    pub fn validate_file(&self, name: &str, content_type: Option<&str>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(rejection("File has no name".to_string()));
        }

        let extension = crate::core::audit::extension_of(name);
        if self.blocked_extensions.contains(&extension) {
            return Err(rejection(format!(
                "File type '{}' is blocked for security reasons",
                extension
            )));
        }
        if !self.allowed_extensions.contains(&extension) {
            let mut allowed = self.allowed_extensions.clone();
            allowed.sort();
            return Err(rejection(format!(
                "File type '{}' is not supported. Allowed: {}",
                extension,
                allowed.join(", ")
            )));
        }

        if let Some(content_type) = content_type {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_lowercase();
            if self.blocked_content_types.contains(&essence) {
                return Err(rejection(format!(
                    "Content type '{}' is not allowed",
                    content_type
                )));
            }
        }

        Ok(())
    }

    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_bytes {
            return Err(rejection(format!(
                "File exceeds {}MB limit ({:.1}MB)",
                self.max_file_bytes / MB,
                size as f64 / MB as f64
            )));
        }
        Ok(())
    }

    pub fn check_total(&self, total: u64) -> Result<()> {
        if total > self.max_total_bytes {
            return Err(rejection(format!(
                "Total upload size exceeds {}MB limit.",
                self.max_total_bytes / MB
            )));
        }
        Ok(())
    }
}

/// 去除路徑分隔字元與 NUL，只保留 [A-Za-z0-9_.-]，並加上隨機前綴
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    let token = Uuid::new_v4().simple().to_string();
    if cleaned.is_empty() {
        format!("{}.tmp", token)
    } else {
        format!("{}_{}", &token[..8], cleaned)
    }
}

/// 一次請求上傳的檔案；離開作用域時刪除所有暫存檔
pub struct UploadBatch {
    dir: PathBuf,
    files: Vec<UploadedFile>,
    total_bytes: u64,
}

impl UploadBatch {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
            total_bytes: 0,
        }
    }

    pub async fn save(
        &mut self,
        original_name: &str,
        content_type: Option<String>,
        data: &[u8],
    ) -> Result<&UploadedFile> {
        let stored_path = self.dir.join(sanitize_filename(original_name));
        if stored_path.parent() != Some(self.dir.as_path()) {
            return Err(rejection("Invalid file path detected.".to_string()));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        // 先登記再寫入，寫到一半失敗也會被清掉
        self.files.push(UploadedFile {
            original_name: original_name.to_string(),
            stored_path: stored_path.clone(),
            content_type,
            size: data.len() as u64,
        });
        tokio::fs::write(&stored_path, data).await?;
        self.total_bytes += data.len() as u64;

        tracing::info!(
            "✅ Uploaded: {} → {}",
            original_name,
            stored_path.display()
        );
        Ok(&self.files[self.files.len() - 1])
    }

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        for file in &self.files {
            match std::fs::remove_file(&file.stored_path) {
                Ok(()) => tracing::debug!("🧹 Removed {}", file.stored_path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    "⚠️ Could not remove {}: {}",
                    file.stored_path.display(),
                    e
                ),
            }
        }
    }
}
