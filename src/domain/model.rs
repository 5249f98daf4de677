use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One CSV record; column order follows the header line.
pub type Row = serde_json::Map<String, serde_json::Value>;

pub const CHURN_PREDICTION_FIELD: &str = "churn_prediction";
pub const CHURN_PROBABILITY_FIELD: &str = "churn_probability";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub total_records: usize,
    pub churn_count: usize,
    pub retain_count: usize,
    pub churn_rate: f64,
    pub data: Vec<Row>,
}

impl PredictionResult {
    /// `churn_count + retain_count == total_records` and the rate matches the counts.
    pub fn is_consistent(&self) -> bool {
        self.churn_count + self.retain_count == self.total_records
            && self.total_records == self.data.len()
            && (self.churn_rate - churn_rate(self.churn_count, self.total_records)).abs() < 1e-2
    }
}

/// Percentage of churned rows; zero rows give a rate of 0.
pub fn churn_rate(churn_count: usize, total_records: usize) -> f64 {
    if total_records == 0 {
        return 0.0;
    }
    churn_count as f64 / total_records as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub filename: String,
    pub date: DateTime<Utc>,
    pub records_processed: usize,
    pub churn_rate: f64,
    pub data: Vec<Row>,
}

/// A history entry before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub filename: String,
    pub date: DateTime<Utc>,
    pub records_processed: usize,
    pub churn_rate: f64,
    pub data: Vec<Row>,
}

impl NewHistoryEntry {
    pub fn from_result(filename: impl Into<String>, result: &PredictionResult) -> Self {
        Self {
            filename: filename.into(),
            date: Utc::now(),
            records_processed: result.total_records,
            churn_rate: result.churn_rate,
            data: result.data.clone(),
        }
    }

    pub fn with_id(self, id: String) -> HistoryItem {
        HistoryItem {
            id,
            filename: self.filename,
            date: self.date,
            records_processed: self.records_processed,
            churn_rate: self.churn_rate,
            data: self.data,
        }
    }
}

/// A CSV file ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub filename: String,
    pub contents: String,
}
