use crate::config::taxonomy::{Taxonomy, TaxonomyRegistry, DEFAULT_INDUSTRY};
use crate::utils::error::{AuditError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub classifier: ClassifierConfig,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub savings: SavingsConfig,
    pub default_industry: String,
    pub industries: BTreeMap<String, IndustryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: String,
    pub output_dir: String,
    pub report_filename: String,
    pub download_filename: String,
    pub cors_origins: Vec<String>,
    /// 空清單代表不檢查 Host 標頭
    pub trusted_hosts: Vec<String>,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub classify_max_tokens: u32,
    pub recommend_max_tokens: u32,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub batch_size: usize,
    pub max_fragments: usize,
    pub max_fragment_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size_mb: u64,
    pub max_total_size_mb: u64,
    pub max_files: usize,
    pub allowed_extensions: Vec<String>,
    pub blocked_extensions: Vec<String>,
    pub blocked_content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SavingsConfig {
    pub minutes_per_message: f64,
    pub hourly_rate: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryConfig {
    pub categories: Vec<String>,
    #[serde(default)]
    pub automatable: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            classifier: ClassifierConfig::default(),
            upload: UploadConfig::default(),
            rate_limit: RateLimitConfig::default(),
            savings: SavingsConfig::default(),
            default_industry: DEFAULT_INDUSTRY.to_string(),
            industries: BTreeMap::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: "uploads".to_string(),
            output_dir: "output".to_string(),
            report_filename: "audit_report.pdf".to_string(),
            download_filename: "AI_Audit_Report.pdf".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            trusted_hosts: Vec::new(),
            environment: "development".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            classify_max_tokens: 1500,
            recommend_max_tokens: 600,
            timeout_seconds: None,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_fragments: 200,
            max_fragment_chars: 500,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            max_file_size_mb: 10,
            max_total_size_mb: 50,
            max_files: 10,
            allowed_extensions: list(&[
                ".csv", ".xlsx", ".xls", ".pdf", ".txt", ".png", ".jpg", ".jpeg", ".gif", ".bmp",
                ".eml",
            ]),
            blocked_extensions: list(&[
                ".exe", ".bat", ".cmd", ".sh", ".ps1", ".dll", ".so", ".py", ".js", ".php", ".rb",
                ".jar", ".msi",
            ]),
            blocked_content_types: list(&[
                "application/x-executable",
                "application/x-msdownload",
                "application/javascript",
            ]),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_seconds: 60,
        }
    }
}

impl Default for SavingsConfig {
    fn default() -> Self {
        Self {
            minutes_per_message: 8.0,
            hourly_rate: 300.0,
            currency: "INR".to_string(),
        }
    }
}

impl AuditConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AuditError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用內建預設值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            tracing::info!(
                "📁 Config file {} not found, using built-in defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| AuditError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| AuditError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 組合內建與設定檔中的產業分類
    pub fn taxonomies(&self) -> Result<TaxonomyRegistry> {
        let overrides = self.industries.iter().map(|(key, industry)| Taxonomy {
            key: key.trim().to_lowercase(),
            categories: industry.categories.clone(),
            automatable: industry.automatable.clone(),
        });
        TaxonomyRegistry::builtin().with_overrides(overrides, &self.default_industry)
    }

    /// API key 是否已設定（未替換的 ${VAR} 視為未設定）
    pub fn api_key_configured(&self) -> bool {
        let key = self.llm.api_key.trim();
        !key.is_empty() && !key.starts_with("${")
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.upload.max_file_size_mb * 1024 * 1024
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.upload.max_total_size_mb * 1024 * 1024
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.eq_ignore_ascii_case("production")
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("llm.api_base", &self.llm.api_base)?;
        validation::validate_non_empty_string("llm.model", &self.llm.model)?;
        validation::validate_range("llm.temperature", self.llm.temperature, 0.0, 2.0)?;
        validation::validate_positive_number(
            "llm.classify_max_tokens",
            self.llm.classify_max_tokens as usize,
            1,
        )?;
        validation::validate_positive_number(
            "llm.recommend_max_tokens",
            self.llm.recommend_max_tokens as usize,
            1,
        )?;

        validation::validate_path("server.upload_dir", &self.server.upload_dir)?;
        validation::validate_path("server.output_dir", &self.server.output_dir)?;
        validation::validate_file_name("server.report_filename", &self.server.report_filename)?;
        validation::validate_file_name(
            "server.download_filename",
            &self.server.download_filename,
        )?;

        validation::validate_positive_number("classifier.batch_size", self.classifier.batch_size, 1)?;
        validation::validate_positive_number(
            "classifier.max_fragments",
            self.classifier.max_fragments,
            1,
        )?;
        validation::validate_positive_number(
            "classifier.max_fragment_chars",
            self.classifier.max_fragment_chars,
            1,
        )?;

        validation::validate_positive_number("upload.max_files", self.upload.max_files, 1)?;
        validation::validate_positive_number(
            "upload.max_file_size_mb",
            self.upload.max_file_size_mb as usize,
            1,
        )?;
        if self.upload.max_total_size_mb < self.upload.max_file_size_mb {
            return Err(AuditError::InvalidConfigValueError {
                field: "upload.max_total_size_mb".to_string(),
                value: self.upload.max_total_size_mb.to_string(),
                reason: "Aggregate limit must not be smaller than the per-file limit".to_string(),
            });
        }
        validation::validate_extension_list(
            "upload.allowed_extensions",
            &self.upload.allowed_extensions,
        )?;
        validation::validate_extension_list(
            "upload.blocked_extensions",
            &self.upload.blocked_extensions,
        )?;

        validation::validate_positive_number(
            "rate_limit.max_requests",
            self.rate_limit.max_requests,
            1,
        )?;
        validation::validate_positive_number(
            "rate_limit.window_seconds",
            self.rate_limit.window_seconds as usize,
            1,
        )?;

        if !(self.savings.minutes_per_message > 0.0) {
            return Err(AuditError::InvalidConfigValueError {
                field: "savings.minutes_per_message".to_string(),
                value: self.savings.minutes_per_message.to_string(),
                reason: "Value must be greater than 0".to_string(),
            });
        }
        if !(self.savings.hourly_rate >= 0.0) {
            return Err(AuditError::InvalidConfigValueError {
                field: "savings.hourly_rate".to_string(),
                value: self.savings.hourly_rate.to_string(),
                reason: "Value must not be negative".to_string(),
            });
        }

        self.taxonomies()?;
        Ok(())
    }
}

impl Validate for AuditConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = AuditConfig::from_toml_str("").unwrap();
        assert_eq!(config.classifier.batch_size, 10);
        assert_eq!(config.classifier.max_fragments, 200);
        assert_eq!(config.upload.max_files, 10);
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.savings.minutes_per_message, 8.0);
        assert_eq!(config.savings.hourly_rate, 300.0);
        assert_eq!(config.default_industry, "general");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
default_industry = "ecommerce"

[server]
port = 9000
output_dir = "./reports"

[llm]
api_base = "https://llm.internal.example/v1"
model = "gpt-4o"
temperature = 0.0
timeout_seconds = 30

[classifier]
batch_size = 5

[rate_limit]
max_requests = 3
window_seconds = 10
"#;

        let config = AuditConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.output_dir, "./reports");
        assert_eq!(config.server.report_filename, "audit_report.pdf");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.timeout_seconds, Some(30));
        assert_eq!(config.classifier.batch_size, 5);
        assert_eq!(config.classifier.max_fragment_chars, 500);
        assert_eq!(config.rate_limit.max_requests, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.taxonomies().unwrap().resolve(None).key, "ecommerce");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("AUDIT_TEST_LLM_KEY", "sk-test-123");

        let toml_content = r#"
[llm]
api_key = "${AUDIT_TEST_LLM_KEY}"
"#;

        let config = AuditConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.llm.api_key, "sk-test-123");
        assert!(config.api_key_configured());

        std::env::remove_var("AUDIT_TEST_LLM_KEY");
    }

    #[test]
    fn test_unresolved_api_key_is_not_configured() {
        let toml_content = r#"
[llm]
api_key = "${AUDIT_TEST_UNSET_VARIABLE}"
"#;
        let config = AuditConfig::from_toml_str(toml_content).unwrap();
        assert!(!config.api_key_configured());
    }

    #[test]
    fn test_config_validation() {
        let bad_url = AuditConfig::from_toml_str("[llm]\napi_base = \"invalid-url\"\n").unwrap();
        assert!(bad_url.validate().is_err());

        let bad_batch = AuditConfig::from_toml_str("[classifier]\nbatch_size = 0\n").unwrap();
        assert!(bad_batch.validate().is_err());

        let bad_temp = AuditConfig::from_toml_str("[llm]\ntemperature = 3.5\n").unwrap();
        assert!(bad_temp.validate().is_err());

        let bad_industry = AuditConfig::from_toml_str("default_industry = \"mining\"\n").unwrap();
        assert!(bad_industry.validate().is_err());

        let bad_report =
            AuditConfig::from_toml_str("[server]\nreport_filename = \"../x.pdf\"\n").unwrap();
        assert!(bad_report.validate().is_err());
    }

    #[test]
    fn test_custom_industry_taxonomy() {
        let toml_content = r#"
[industries.legal]
categories = ["Contract Review", "Case Update", "Billing Inquiry", "Other"]
automatable = ["Case Update", "Billing Inquiry"]
"#;
        let config = AuditConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        let registry = config.taxonomies().unwrap();
        let legal = registry.resolve(Some("legal"));
        assert_eq!(legal.categories.len(), 4);
        assert!(legal.is_automatable("Case Update"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\nupload_dir = \"/tmp/audit-uploads\"\n")
            .unwrap();

        let config = AuditConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.server.upload_dir, "/tmp/audit-uploads");
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
