use crate::config::toml_config::AuditConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "audit-engine")]
#[command(about = "AI automation audit service: upload files, get category breakdown, savings and a PDF report")]
pub struct CliConfig {
    /// Path to TOML configuration file (built-in defaults when missing)
    #[arg(short, long, default_value = "audit-config.toml")]
    pub config: String,

    /// Override server.host
    #[arg(long)]
    pub host: Option<String>,

    /// Override server.port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log elapsed time and memory per audit phase")]
    pub monitor: bool,
}

impl CliConfig {
    /// 套用命令列覆蓋設定
    pub fn apply_overrides(&self, config: &mut AuditConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
            tracing::info!("🔧 server.host overridden to: {}", host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
            tracing::info!("🔧 server.port overridden to: {}", port);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = CliConfig::parse_from(["audit-engine", "--port", "9100", "--host", "127.0.0.1"]);
        let mut config = AuditConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(cli.config, "audit-config.toml");
    }
}
