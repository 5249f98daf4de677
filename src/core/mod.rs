pub mod csv_codec;
pub mod engine;
pub mod history;
pub mod prediction;
pub mod upload;

pub use crate::domain::model::{DownloadArtifact, HistoryItem, NewHistoryEntry, PredictionResult, Row};
pub use crate::domain::ports::{ConfigProvider, KeyValueStore, PredictionService, ProgressSettings};
pub use crate::utils::error::Result;
