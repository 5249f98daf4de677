use crate::core::upload::UploadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Upload rejected: {0}")]
    Validation(#[from] UploadError),

    #[error("Storage quota exceeded for '{key}': {size} bytes > {quota} bytes")]
    StorageQuotaExceeded { key: String, size: usize, quota: usize },

    #[error("Prediction failed: {message}")]
    PredictionError { message: String },

    #[error("Cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Analysis cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Storage,
    Configuration,
    Input,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ChurnError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ChurnError::ApiError(_) | ChurnError::PredictionError { .. } => ErrorCategory::Network,
            ChurnError::CsvError(_) | ChurnError::SerializationError(_) => ErrorCategory::Data,
            ChurnError::IoError(_) | ChurnError::StorageQuotaExceeded { .. } => {
                ErrorCategory::Storage
            }
            ChurnError::ConfigError { .. }
            | ChurnError::InvalidConfigValueError { .. }
            | ChurnError::MissingConfigError { .. }
            | ChurnError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            ChurnError::Validation(_) => ErrorCategory::Input,
            ChurnError::InvalidTransition { .. } | ChurnError::Cancelled => ErrorCategory::State,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChurnError::Cancelled => ErrorSeverity::Low,
            ChurnError::ApiError(_)
            | ChurnError::PredictionError { .. }
            | ChurnError::StorageQuotaExceeded { .. } => ErrorSeverity::Medium,
            ChurnError::CsvError(_)
            | ChurnError::SerializationError(_)
            | ChurnError::Validation(_)
            | ChurnError::InvalidTransition { .. } => ErrorSeverity::High,
            ChurnError::IoError(_)
            | ChurnError::ConfigError { .. }
            | ChurnError::InvalidConfigValueError { .. }
            | ChurnError::MissingConfigError { .. }
            | ChurnError::ConfigValidationError { .. } => ErrorSeverity::Critical,
        }
    }

    /// 給使用者看的訊息，不帶底層細節
    pub fn user_friendly_message(&self) -> String {
        match self {
            ChurnError::Validation(e) => e.to_string(),
            ChurnError::ApiError(_)
            | ChurnError::CsvError(_)
            | ChurnError::SerializationError(_)
            | ChurnError::PredictionError { .. } => "Failed to process file".to_string(),
            ChurnError::IoError(_) => "Could not read or write a local file".to_string(),
            ChurnError::StorageQuotaExceeded { .. } => {
                "Prediction history could not be saved (storage full)".to_string()
            }
            ChurnError::ConfigError { .. }
            | ChurnError::InvalidConfigValueError { .. }
            | ChurnError::MissingConfigError { .. }
            | ChurnError::ConfigValidationError { .. } => format!("Invalid configuration: {}", self),
            ChurnError::InvalidTransition { .. } => {
                "An analysis is already in progress".to_string()
            }
            ChurnError::Cancelled => "Analysis cancelled".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check the prediction endpoint and try again",
            ErrorCategory::Data => "Please check your file format and try again",
            ErrorCategory::Storage => "Free some space or delete old history entries",
            ErrorCategory::Configuration => "Fix the configuration file or command line flags",
            ErrorCategory::Input => "Select a .csv file smaller than 10MB",
            ErrorCategory::State => "Start a new prediction and try again",
        }
    }

    /// Process exit code for the CLI; 130 follows the SIGINT convention.
    pub fn exit_code(&self) -> i32 {
        if matches!(self, ChurnError::Cancelled) {
            return 130;
        }
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChurnError>;
