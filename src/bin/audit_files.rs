use anyhow::Context;
use audit_engine::core::audit::extension_of;
use audit_engine::core::extractor::ContentExtractor;
use audit_engine::domain::model::UploadedFile;
use audit_engine::server::upload::UploadPolicy;
use audit_engine::utils::monitor::PhaseMonitor;
use audit_engine::utils::{logger, validation::Validate};
use audit_engine::{AuditConfig, AuditEngine, LocalStorage, OpenAiClient};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "audit-files")]
#[command(about = "Run an automation audit over local files without starting the server")]
struct Args {
    /// Files to analyze (csv, xlsx, xls, pdf, txt, eml, images)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Industry taxonomy to classify against
    #[arg(short, long)]
    industry: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, default_value = "audit-config.toml")]
    config: String,

    /// Directory for the PDF report (overrides server.output_dir)
    #[arg(short, long)]
    output: Option<String>,

    /// Only extract and count messages, skip classification
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log elapsed time and memory per phase
    #[arg(long)]
    monitor: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("🚀 Starting offline audit of {} file(s)", args.files.len());
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match AuditConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(output) = &args.output {
        config.server.output_dir = output.clone();
        tracing::info!("🔧 Output directory overridden to: {}", output);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    let files = match collect_files(&args.files, &UploadPolicy::from_config(&config.upload)) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - extraction only, no LLM calls");
        perform_dry_run(&files);
        return Ok(());
    }

    if !config.api_key_configured() {
        tracing::warn!("⚠️ LLM API key is not configured; every message will land in the catch-all category");
    }

    let client = Arc::new(
        OpenAiClient::new(&config.llm).context("Failed to build the completion API client")?,
    );
    let storage = LocalStorage::new(&config.server.output_dir);
    let engine = AuditEngine::new(&config, client, storage)
        .context("Failed to initialize the audit engine")?;
    let monitor = PhaseMonitor::new(args.monitor);

    match engine
        .audit_files(&files, args.industry.as_deref(), &monitor)
        .await
    {
        Ok(response) => {
            monitor.log_final_stats();
            let json = serde_json::to_string_pretty(&response)
                .context("Failed to serialize the audit response")?;
            println!("{}", json);
            if response.pdf_available {
                let report = engine.storage().full_path(engine.report_filename());
                println!("📄 Report saved to: {}", report.display());
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Audit failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code().max(1));
        }
    }

    Ok(())
}

/// 本機檔案同樣套用上傳時的副檔名與大小限制
fn collect_files(
    paths: &[PathBuf],
    policy: &UploadPolicy,
) -> audit_engine::Result<Vec<UploadedFile>> {
    policy.check_count(paths.len())?;

    let mut files = Vec::with_capacity(paths.len());
    let mut total = 0u64;
    for path in paths {
        let name = file_name(path);
        policy.validate_file(&name, None)?;
        let size = std::fs::metadata(path)?.len();
        policy.check_size(size)?;
        total += size;
        policy.check_total(total)?;

        files.push(UploadedFile {
            original_name: name,
            stored_path: path.clone(),
            content_type: None,
            size,
        });
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn display_config_summary(config: &AuditConfig, args: &Args) {
    let industry = args
        .industry
        .clone()
        .unwrap_or_else(|| config.default_industry.clone());
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("   🤖 Model: {} @ {}", config.llm.model, config.llm.api_base);
    tracing::info!("   🏭 Industry: {}", industry);
    tracing::info!(
        "   📦 Batches of {} (max {} messages, {} chars each)",
        config.classifier.batch_size,
        config.classifier.max_fragments,
        config.classifier.max_fragment_chars
    );
    tracing::info!(
        "   💰 {} min/message at {} {}/hour",
        config.savings.minutes_per_message,
        config.savings.hourly_rate,
        config.savings.currency
    );
    tracing::info!(
        "   📁 Report: {}/{}",
        config.server.output_dir,
        config.server.report_filename
    );
}

fn perform_dry_run(files: &[UploadedFile]) {
    let mut total = 0;
    for file in files {
        let extension = extension_of(&file.original_name);
        match ContentExtractor::try_extract(&file.stored_path, &extension) {
            Ok(fragments) => {
                println!("📂 {}: {} message(s)", file.original_name, fragments.len());
                if let Some(first) = fragments.first() {
                    let preview: String = first.chars().take(80).collect();
                    println!("   ↳ {}", preview);
                }
                total += fragments.len();
            }
            Err(e) => println!("⚠️ {}: could not be parsed ({})", file.original_name, e),
        }
    }
    println!("📊 Total messages: {}", total);
}
