use crate::core::csv_codec;
use crate::core::history::{HistoryStore, StoreOutcome};
use crate::core::upload::{validate_upload, UploadCandidate, MAX_UPLOAD_BYTES};
use crate::domain::model::{DownloadArtifact, HistoryItem, NewHistoryEntry, PredictionResult, Row};
use crate::domain::ports::{KeyValueStore, PredictionService, ProgressSettings};
use crate::utils::cancel::CancelToken;
use crate::utils::error::{ChurnError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

pub const PROCESSING_FAILED_MESSAGE: &str = "Failed to process file";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Idle,
    Uploading,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessingState::Idle => "idle",
            ProcessingState::Uploading => "uploading",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Error => "error",
        };
        f.write_str(name)
    }
}

/// What a progress display needs to render.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub state: ProcessingState,
    pub progress: f64,
    pub records_processed: usize,
    pub message: Option<String>,
}

impl StatusUpdate {
    fn idle() -> Self {
        Self {
            state: ProcessingState::Idle,
            progress: 0.0,
            records_processed: 0,
            message: None,
        }
    }
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: PredictionResult,
    pub history_item: HistoryItem,
    /// Set when the history entry could not be written to storage.
    pub storage_warning: Option<ChurnError>,
}

/// Drives one analysis at a time: idle -> uploading -> processing -> completed | error.
pub struct AnalysisEngine<P: PredictionService, S: KeyValueStore> {
    service: P,
    history: HistoryStore<S>,
    progress: ProgressSettings,
    max_upload_bytes: u64,
    status: watch::Sender<StatusUpdate>,
    current_filename: String,
    results: Option<PredictionResult>,
}

impl<P: PredictionService, S: KeyValueStore> AnalysisEngine<P, S> {
    pub fn new(service: P, history: HistoryStore<S>, progress: ProgressSettings) -> Self {
        let (status, _) = watch::channel(StatusUpdate::idle());
        Self {
            service,
            history,
            progress,
            max_upload_bytes: MAX_UPLOAD_BYTES,
            status,
            current_filename: String::new(),
            results: None,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusUpdate> {
        self.status.subscribe()
    }

    pub fn status(&self) -> StatusUpdate {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ProcessingState {
        self.status.borrow().state
    }

    pub fn results(&self) -> Option<&PredictionResult> {
        self.results.as_ref()
    }

    pub fn current_filename(&self) -> &str {
        &self.current_filename
    }

    pub async fn analyze(
        &mut self,
        candidate: &UploadCandidate,
        cancel: &CancelToken,
    ) -> Result<AnalysisOutcome> {
        let state = self.state();
        if state != ProcessingState::Idle {
            return Err(ChurnError::InvalidTransition {
                from: state.to_string(),
                action: "start an analysis".to_string(),
            });
        }

        // 被拒絕的檔案不會離開 idle
        validate_upload(&candidate.name, candidate.size, self.max_upload_bytes)?;

        tracing::info!("📂 Analyzing '{}'", candidate.name);
        self.current_filename = candidate.name.clone();
        self.results = None;
        self.publish(ProcessingState::Uploading, 0.0, 0, None);

        let rows = match read_rows(candidate, cancel).await {
            Ok(rows) => rows,
            Err(ChurnError::Cancelled) => return Err(self.abort()),
            Err(e) => return Err(self.fail(e)),
        };

        let records = rows.len();
        tracing::info!("📊 Parsed {} customer records", records);
        self.publish(ProcessingState::Processing, 0.0, records, None);

        let service = &self.service;
        let status = &self.status;
        let settings = self.progress;
        let stop_ticker = CancelToken::new();

        let prediction = async {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(ChurnError::Cancelled),
                result = service.predict(rows) => result,
            };
            if outcome.is_err() {
                stop_ticker.cancel();
            }
            outcome
        };
        let ticker = run_progress(status, settings, cancel, &stop_ticker);

        // 兩邊都結束才往下走
        let (_, predicted) = tokio::join!(ticker, prediction);

        if cancel.is_cancelled() {
            return Err(self.abort());
        }

        let result = match predicted {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };

        self.results = Some(result.clone());
        self.publish(
            ProcessingState::Completed,
            100.0,
            result.total_records,
            Some(format!("Processed {} customer records", result.total_records)),
        );
        tracing::info!(
            "✅ Analysis complete: {} records, {} churn, {} retain ({:.1}%)",
            result.total_records,
            result.churn_count,
            result.retain_count,
            result.churn_rate
        );

        let saved = self
            .history
            .add(NewHistoryEntry::from_result(&candidate.name, &result))
            .await;
        if let Some(warning) = &saved.warning {
            tracing::warn!("⚠️ Result not saved to history: {}", warning);
        }

        Ok(AnalysisOutcome {
            result,
            history_item: saved.value,
            storage_warning: saved.warning,
        })
    }

    /// Back to idle after a completed or failed analysis.
    pub fn new_prediction(&mut self) -> Result<()> {
        match self.state() {
            ProcessingState::Idle | ProcessingState::Completed | ProcessingState::Error => {
                self.reset();
                Ok(())
            }
            state => Err(ChurnError::InvalidTransition {
                from: state.to_string(),
                action: "start a new prediction".to_string(),
            }),
        }
    }

    pub fn export_results(&self) -> Option<DownloadArtifact> {
        self.results
            .as_ref()
            .map(|result| csv_codec::build_artifact(&self.current_filename, &result.data))
    }

    pub fn history(&self) -> Arc<[HistoryItem]> {
        self.history.snapshot()
    }

    pub fn export_history(&self, id: &str) -> Option<DownloadArtifact> {
        self.history
            .get(id)
            .map(|item| csv_codec::build_artifact(&item.filename, &item.data))
    }

    pub async fn delete_history(&mut self, id: &str) -> StoreOutcome<bool> {
        let outcome = self.history.delete(id).await;
        if outcome.value {
            tracing::info!("🗑️ Prediction {} removed from history", id);
        }
        outcome
    }

    pub async fn clear_history(&mut self) -> StoreOutcome<()> {
        tracing::info!("🗑️ Clearing prediction history");
        self.history.clear().await
    }

    fn publish(
        &self,
        state: ProcessingState,
        progress: f64,
        records_processed: usize,
        message: Option<String>,
    ) {
        self.status.send_replace(StatusUpdate {
            state,
            progress,
            records_processed,
            message,
        });
    }

    fn fail(&mut self, error: ChurnError) -> ChurnError {
        tracing::error!("❌ Error processing '{}': {}", self.current_filename, error);
        self.status.send_modify(|status| {
            status.state = ProcessingState::Error;
            status.message = Some(PROCESSING_FAILED_MESSAGE.to_string());
        });
        error
    }

    fn abort(&mut self) -> ChurnError {
        tracing::warn!("🛑 Analysis of '{}' cancelled", self.current_filename);
        self.reset();
        ChurnError::Cancelled
    }

    fn reset(&mut self) {
        self.current_filename.clear();
        self.results = None;
        self.status.send_replace(StatusUpdate::idle());
    }
}

async fn read_rows(candidate: &UploadCandidate, cancel: &CancelToken) -> Result<Vec<Row>> {
    let text = tokio::select! {
        _ = cancel.cancelled() => return Err(ChurnError::Cancelled),
        text = tokio::fs::read_to_string(&candidate.path) => text?,
    };
    csv_codec::parse(&text)
}

/// Synthetic progress: random steps until the cap. Stops early on either token.
async fn run_progress(
    status: &watch::Sender<StatusUpdate>,
    settings: ProgressSettings,
    cancel: &CancelToken,
    stop: &CancelToken,
) {
    let mut rng = StdRng::from_entropy();
    let mut interval =
        tokio::time::interval_at(Instant::now() + settings.tick_interval, settings.tick_interval);
    let mut progress = 0.0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = stop.cancelled() => return,
            _ = interval.tick() => {
                progress += rng.gen::<f64>() * settings.max_step;
                let shown = progress.min(settings.cap);
                status.send_modify(|update| update.progress = shown);
                if progress >= settings.cap {
                    return;
                }
            }
        }
    }
}
