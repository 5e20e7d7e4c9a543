use audit_engine::utils::{logger, validation::Validate};
use audit_engine::{serve, AppState, AuditConfig, CliConfig};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_server_logger(cli.verbose, cli.json_logs);

    tracing::info!("Starting audit-engine v{}", env!("CARGO_PKG_VERSION"));
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    let mut config = match AuditConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Failed to load configuration: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };
    cli.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code());
    }

    if !config.api_key_configured() {
        tracing::warn!("⚠️ LLM API key is not configured; classification will fall back to the catch-all category");
    }
    tracing::info!("🌐 Environment: {}", config.server.environment);
    if config.is_production() && cli.verbose {
        tracing::warn!("⚠️ Verbose logging is enabled in production");
    }
    if cli.monitor {
        tracing::info!("🔍 Phase monitoring enabled");
    }

    let state = match AppState::from_config(config, cli.monitor) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("❌ Failed to initialize audit engine: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = serve(state).await {
        tracing::error!(
            "❌ Server stopped: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.exit_code().max(1));
    }

    Ok(())
}
