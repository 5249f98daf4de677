pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command, HistoryCommand};

pub use config::{cli::LocalStorage, open_engine, prediction_service, toml_config::AppConfig};
pub use core::engine::{AnalysisEngine, AnalysisOutcome, ProcessingState, StatusUpdate};
pub use core::history::{HistoryStore, StoreOutcome};
pub use core::prediction::{HttpPredictionService, MockPredictionService};
pub use core::upload::{UploadCandidate, UploadError, UploadGate};
pub use utils::cancel::CancelToken;
pub use utils::error::{ChurnError, Result};
