use crate::core::history::{DEFAULT_HISTORY_KEY, DEFAULT_MAX_HISTORY};
use crate::core::prediction::DEFAULT_CHURN_THRESHOLD;
use crate::core::upload::MAX_UPLOAD_BYTES;
use crate::core::{ConfigProvider, ProgressSettings};
use crate::utils::error::{ChurnError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub prediction: PredictionConfig,
    pub progress: ProgressConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
    pub history_key: String,
    pub max_history: usize,
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./.churn-predict".to_string(),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            quota_bytes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMode {
    Mock,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub mode: PredictionMode,
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
    pub mock_delay_ms: u64,
    pub churn_threshold: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            mode: PredictionMode::Mock,
            endpoint: None,
            timeout_seconds: 30,
            mock_delay_ms: 2000,
            churn_threshold: DEFAULT_CHURN_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub tick_interval_ms: u64,
    pub max_step: f64,
    pub cap: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        let defaults = ProgressSettings::default();
        Self {
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            max_step: defaults.max_step,
            cap: defaults.cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_string(),
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ChurnError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ChurnError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PREDICTION_ENDPOINT})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ChurnError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("storage.data_dir", &self.storage.data_dir)?;
        validation::validate_storage_key("storage.history_key", &self.storage.history_key)?;
        validation::validate_positive_number("storage.max_history", self.storage.max_history, 1)?;
        if let Some(quota) = self.storage.quota_bytes {
            validation::validate_positive_number("storage.quota_bytes", quota, 1)?;
        }

        validation::validate_positive_number("upload.max_file_bytes", self.upload.max_file_bytes, 1)?;

        if self.prediction.mode == PredictionMode::Http {
            let endpoint =
                validation::validate_required_field("prediction.endpoint", &self.prediction.endpoint)?;
            validation::validate_url("prediction.endpoint", endpoint)?;
            validation::validate_positive_number(
                "prediction.timeout_seconds",
                self.prediction.timeout_seconds,
                1,
            )?;
        }
        validation::validate_range(
            "prediction.churn_threshold",
            self.prediction.churn_threshold,
            0.0,
            1.0,
        )?;

        validation::validate_positive_number("progress.tick_interval_ms", self.progress.tick_interval_ms, 1)?;
        validation::validate_range("progress.cap", self.progress.cap, 1.0, 100.0)?;
        if !(self.progress.max_step.is_finite() && self.progress.max_step > 0.0) {
            return Err(ChurnError::InvalidConfigValueError {
                field: "progress.max_step".to_string(),
                value: self.progress.max_step.to_string(),
                reason: "Value must be a finite number greater than 0".to_string(),
            });
        }

        validation::validate_path("output.dir", &self.output.dir)?;
        Ok(())
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.prediction.mock_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.prediction.timeout_seconds)
    }
}

impl ConfigProvider for AppConfig {
    fn data_dir(&self) -> &str {
        &self.storage.data_dir
    }

    fn history_key(&self) -> &str {
        &self.storage.history_key
    }

    fn max_history(&self) -> usize {
        self.storage.max_history
    }

    fn storage_quota_bytes(&self) -> Option<usize> {
        self.storage.quota_bytes
    }

    fn max_upload_bytes(&self) -> u64 {
        self.upload.max_file_bytes
    }

    fn progress_settings(&self) -> ProgressSettings {
        ProgressSettings {
            tick_interval: Duration::from_millis(self.progress.tick_interval_ms),
            max_step: self.progress.max_step,
            cap: self.progress.cap,
        }
    }

    fn output_dir(&self) -> &str {
        &self.output.dir
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
