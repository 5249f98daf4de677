pub mod cli;
pub mod toml_config;

use crate::config::cli::LocalStorage;
use crate::config::toml_config::{AppConfig, PredictionMode};
use crate::core::engine::AnalysisEngine;
use crate::core::history::HistoryStore;
use crate::core::prediction::{HttpPredictionService, MockPredictionService};
use crate::core::{ConfigProvider, PredictionService};
use crate::utils::error::Result;
use crate::utils::validation;

/// Wires storage, history and progress settings from any config source.
pub async fn open_engine<C, P>(config: &C, service: P) -> AnalysisEngine<P, LocalStorage>
where
    C: ConfigProvider,
    P: PredictionService,
{
    let storage = LocalStorage::new(config.data_dir()).with_quota(config.storage_quota_bytes());
    let history = HistoryStore::open(storage, config.history_key(), config.max_history()).await;
    AnalysisEngine::new(service, history, config.progress_settings())
        .with_max_upload_bytes(config.max_upload_bytes())
}

pub fn prediction_service(config: &AppConfig) -> Result<Box<dyn PredictionService>> {
    match config.prediction.mode {
        PredictionMode::Mock => Ok(Box::new(
            MockPredictionService::new(config.mock_delay())
                .with_threshold(config.prediction.churn_threshold),
        )),
        PredictionMode::Http => {
            let endpoint =
                validation::validate_required_field("prediction.endpoint", &config.prediction.endpoint)?;
            Ok(Box::new(HttpPredictionService::new(
                endpoint.clone(),
                config.request_timeout(),
            )?))
        }
    }
}

#[cfg(feature = "cli")]
pub use self::args::{CliConfig, Command, HistoryCommand};

#[cfg(feature = "cli")]
mod args {
    use super::toml_config::{AppConfig, PredictionMode};
    use crate::utils::error::Result;
    use clap::{Parser, Subcommand};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "churn-predict")]
    #[command(about = "Predict customer churn from a CSV file and keep a history of analyses")]
    pub struct CliConfig {
        /// Path to a TOML configuration file
        #[arg(long, global = true)]
        pub config: Option<String>,

        /// Directory holding the prediction history
        #[arg(long, global = true)]
        pub data_dir: Option<String>,

        /// Prediction service URL (switches from the mock model to HTTP)
        #[arg(long, global = true)]
        pub endpoint: Option<String>,

        #[arg(long, global = true, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, global = true, help = "Emit logs as JSON")]
        pub json_logs: bool,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum Command {
        /// Run a churn analysis on a CSV file
        Analyze {
            file: PathBuf,

            /// Where to write <name>_predictions.csv
            #[arg(long)]
            output_dir: Option<String>,
        },

        /// Browse past analyses
        #[command(subcommand)]
        History(HistoryCommand),
    }

    #[derive(Debug, Clone, Subcommand)]
    pub enum HistoryCommand {
        List,
        Download {
            id: String,

            #[arg(long)]
            output_dir: Option<String>,
        },
        Delete {
            id: String,
        },
        Clear,
    }

    impl CliConfig {
        /// File values first, then command line overrides.
        pub fn load_app_config(&self) -> Result<AppConfig> {
            let mut config = match &self.config {
                Some(path) => AppConfig::from_file(path)?,
                None => AppConfig::default(),
            };

            if let Some(data_dir) = &self.data_dir {
                config.storage.data_dir = data_dir.clone();
            }
            if let Some(endpoint) = &self.endpoint {
                config.prediction.mode = PredictionMode::Http;
                config.prediction.endpoint = Some(endpoint.clone());
            }
            if let Command::Analyze {
                output_dir: Some(dir),
                ..
            }
            | Command::History(HistoryCommand::Download {
                output_dir: Some(dir),
                ..
            }) = &self.command
            {
                config.output.dir = dir.clone();
            }

            Ok(config)
        }
    }

}
