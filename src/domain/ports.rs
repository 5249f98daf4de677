use crate::domain::model::{PredictionResult, Row};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// String key-value persistence, the counterpart of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<String>>> + Send;
    fn set(&self, key: &str, value: &str) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn data_dir(&self) -> &str;
    fn history_key(&self) -> &str;
    fn max_history(&self) -> usize;
    fn storage_quota_bytes(&self) -> Option<usize>;
    fn max_upload_bytes(&self) -> u64;
    fn progress_settings(&self) -> ProgressSettings;
    fn output_dir(&self) -> &str;
}

/// Shape of the synthetic progress animation shown while a prediction runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSettings {
    pub tick_interval: Duration,
    pub max_step: f64,
    pub cap: f64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(300),
            max_step: 15.0,
            cap: 90.0,
        }
    }
}

#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, rows: Vec<Row>) -> Result<PredictionResult>;
}
