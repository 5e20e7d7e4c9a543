use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Completion API returned {status}: {message}")]
    CompletionError { status: u16, message: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Spreadsheet processing error: {0}")]
    SpreadsheetError(#[from] calamine::Error),

    #[error("PDF processing error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Could not decode model output: {message}")]
    DecodeError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("No content could be extracted from uploaded files")]
    NoContent,

    #[error("Report rendering error: {message}")]
    ReportError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Extraction,
    Network,
    Processing,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AuditError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuditError::ConfigError { .. }
            | AuditError::MissingConfigError { .. }
            | AuditError::InvalidConfigValueError { .. }
            | AuditError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AuditError::ValidationError { .. } | AuditError::NoContent => ErrorCategory::Input,
            AuditError::CsvError(_)
            | AuditError::SpreadsheetError(_)
            | AuditError::PdfError(_)
            | AuditError::ImageError(_) => ErrorCategory::Extraction,
            AuditError::ApiError(_) | AuditError::CompletionError { .. } => ErrorCategory::Network,
            AuditError::DecodeError { .. }
            | AuditError::SerializationError(_)
            | AuditError::ReportError { .. } => ErrorCategory::Processing,
            AuditError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Input => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Extraction | ErrorCategory::Processing => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 可直接顯示給使用者的訊息，不帶內部細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            AuditError::ValidationError { message } => message.clone(),
            AuditError::NoContent => {
                "No content could be extracted from uploaded files.".to_string()
            }
            AuditError::CsvError(_)
            | AuditError::SpreadsheetError(_)
            | AuditError::PdfError(_)
            | AuditError::ImageError(_) => "File could not be parsed".to_string(),
            AuditError::ReportError { .. } => "Report unavailable".to_string(),
            AuditError::ConfigError { .. }
            | AuditError::MissingConfigError { .. }
            | AuditError::InvalidConfigValueError { .. }
            | AuditError::ConfigValidationError { .. } => format!("{}", self),
            _ => "An internal error occurred. Please try again.".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the configuration file and environment variables",
            ErrorCategory::Input => "Upload supported files (csv, xlsx, pdf, txt, eml, images) within the size limits",
            ErrorCategory::Extraction => "Make sure the file is not corrupted or password protected",
            ErrorCategory::Network => "Verify the LLM API endpoint, API key and network connectivity",
            ErrorCategory::Processing => "Retry the audit; the model output may have been malformed",
            ErrorCategory::System => "Check disk space and permissions of the upload and output directories",
        }
    }

    /// 依嚴重程度對應的程序結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
