//! End-to-end audit: extract → classify → summarize → recommend → render.

use crate::config::taxonomy::TaxonomyRegistry;
use crate::config::toml_config::AuditConfig;
use crate::core::classifier::{BatchClassifier, ClassifierSettings};
use crate::core::extractor::ContentExtractor;
use crate::core::recommend::RecommendationGenerator;
use crate::core::report::ReportRenderer;
use crate::core::savings::SavingsModel;
use crate::core::summary::{build_summary, AuditResultsView};
use crate::domain::model::{AuditSummary, BatchReport, FileOutcome, UploadedFile};
use crate::domain::ports::{CompletionClient, Storage};
use crate::utils::error::{AuditError, Result};
use crate::utils::monitor::PhaseMonitor;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const REPORT_UNAVAILABLE: &str = "Report unavailable";

/// `POST /audit` 與離線 CLI 共用的輸出格式
#[derive(Debug, Clone, Serialize)]
pub struct AuditResponse {
    pub status: &'static str,
    pub files_analyzed: usize,
    pub files: Vec<FileOutcome>,
    pub total_messages_analyzed: usize,
    pub audit_results: AuditResultsView,
    pub classification_batches: Vec<BatchReport>,
    pub pdf_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_message: Option<String>,
}

pub struct AuditEngine<S: Storage> {
    taxonomies: Arc<TaxonomyRegistry>,
    classifier: BatchClassifier,
    recommender: RecommendationGenerator,
    renderer: ReportRenderer,
    savings: SavingsModel,
    storage: S,
    report_filename: String,
}

impl<S: Storage> AuditEngine<S> {
    pub fn new(config: &AuditConfig, client: Arc<dyn CompletionClient>, storage: S) -> Result<Self> {
        let taxonomies = Arc::new(config.taxonomies()?);
        let savings = SavingsModel::from_config(&config.savings);

        Ok(Self {
            classifier: BatchClassifier::new(
                client.clone(),
                taxonomies.clone(),
                ClassifierSettings::from_config(config),
            ),
            recommender: RecommendationGenerator::new(
                client,
                savings.clone(),
                config.llm.recommend_max_tokens,
            ),
            renderer: ReportRenderer::new(savings.clone()),
            taxonomies,
            savings,
            storage,
            report_filename: config.server.report_filename.clone(),
        })
    }

    pub fn taxonomies(&self) -> &TaxonomyRegistry {
        &self.taxonomies
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn report_filename(&self) -> &str {
        &self.report_filename
    }

    /// 逐檔抽取文字；單檔失敗只記錄在該檔的結果中
    pub async fn extract_files(&self, files: &[UploadedFile]) -> (Vec<String>, Vec<FileOutcome>) {
        let mut fragments = Vec::new();
        let mut outcomes = Vec::with_capacity(files.len());

        for file in files {
            let path = file.stored_path.clone();
            let extension = extension_of(&file.original_name);

            let result = tokio::task::spawn_blocking(move || {
                ContentExtractor::try_extract(&path, &extension)
            })
            .await
            .unwrap_or_else(|e| {
                Err(AuditError::ValidationError {
                    message: format!("extraction task failed: {}", e),
                })
            });

            let mut outcome = FileOutcome {
                filename: file.original_name.clone(),
                content_type: file.content_type.clone(),
                size: file.size,
                messages_extracted: None,
                error: None,
            };

            match result {
                Ok(extracted) => {
                    tracing::info!(
                        "📂 {}: {} fragments extracted",
                        file.original_name,
                        extracted.len()
                    );
                    outcome.messages_extracted = Some(extracted.len());
                    fragments.extend(extracted);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Could not parse {}: {}", file.original_name, e);
                    outcome.error = Some("File could not be parsed".to_string());
                }
            }
            outcomes.push(outcome);
        }

        (fragments, outcomes)
    }

    pub async fn audit_files(
        &self,
        files: &[UploadedFile],
        industry: Option<&str>,
        monitor: &PhaseMonitor,
    ) -> Result<AuditResponse> {
        let (fragments, outcomes) = self.extract_files(files).await;
        monitor.mark("extraction");

        if fragments.is_empty() {
            return Err(AuditError::NoContent);
        }

        let (summary, batches) = self.analyze(&fragments, industry, monitor).await;
        let (pdf_available, report_message) = match self.publish_report(&summary).await {
            Ok(()) => (true, None),
            Err(e) => {
                tracing::error!("❌ Report generation failed: {}", e);
                (false, Some(REPORT_UNAVAILABLE.to_string()))
            }
        };
        monitor.mark("report");

        tracing::info!(
            "✅ Audit complete: {} messages, automation score {}/100",
            summary.total_messages,
            summary.automation_score
        );

        Ok(AuditResponse {
            status: "success",
            files_analyzed: files.len(),
            files: outcomes,
            total_messages_analyzed: summary.total_messages,
            audit_results: AuditResultsView::from_summary(&summary, &self.savings),
            classification_batches: batches,
            pdf_available,
            report_message,
        })
    }

    /// 分類並建立彙整（不含報表輸出）
    pub async fn analyze(
        &self,
        fragments: &[String],
        industry: Option<&str>,
        monitor: &PhaseMonitor,
    ) -> (AuditSummary, Vec<BatchReport>) {
        let taxonomy = self.taxonomies.resolve(industry);

        let outcome = self.classifier.classify(fragments, industry).await;
        monitor.mark("classification");

        let total = outcome.counts.total();
        let recommendations = self
            .recommender
            .recommend(&outcome.counts, total, taxonomy)
            .await;
        monitor.mark("recommendations");

        let summary = build_summary(&outcome.counts, taxonomy, &self.savings, recommendations);
        (summary, outcome.batches)
    }

    pub fn render_report(&self, summary: &AuditSummary) -> Result<Vec<u8>> {
        let generated_at = chrono::Local::now().naive_local();
        self.renderer.render(summary, generated_at)
    }

    pub async fn publish_report(&self, summary: &AuditSummary) -> Result<()> {
        let bytes = self.render_report(summary)?;
        self.storage.write_file(&self.report_filename, &bytes).await?;
        tracing::info!("📄 Report saved as {}", self.report_filename);
        Ok(())
    }

    pub async fn load_report(&self) -> Result<Vec<u8>> {
        self.storage.read_file(&self.report_filename).await
    }
}

/// 取小寫副檔名（含前導點），沒有副檔名時回傳空字串
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
