use crate::domain::model::{
    churn_rate, PredictionResult, Row, CHURN_PREDICTION_FIELD, CHURN_PROBABILITY_FIELD,
};
use crate::domain::ports::PredictionService;
use crate::utils::error::{ChurnError, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_CHURN_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MOCK_DELAY: Duration = Duration::from_millis(2000);

/// Stand-in for a real model: random labels after a fixed delay.
#[derive(Debug, Clone)]
pub struct MockPredictionService {
    delay: Duration,
    threshold: f64,
}

impl MockPredictionService {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            threshold: DEFAULT_CHURN_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

impl Default for MockPredictionService {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_DELAY)
    }
}

#[async_trait]
impl PredictionService for MockPredictionService {
    async fn predict(&self, rows: Vec<Row>) -> Result<PredictionResult> {
        tracing::debug!(
            "Mock prediction for {} rows (delay {:?})",
            rows.len(),
            self.delay
        );
        tokio::time::sleep(self.delay).await;

        let mut rng = StdRng::from_entropy();
        let annotated = annotate_rows(rows, self.threshold, &mut rng);
        Ok(summarize(annotated))
    }
}

#[async_trait]
impl PredictionService for Box<dyn PredictionService> {
    async fn predict(&self, rows: Vec<Row>) -> Result<PredictionResult> {
        (**self).predict(rows).await
    }
}

/// Appends a churn label and a probability to a copy of every row.
pub fn annotate_rows<R: Rng>(rows: Vec<Row>, threshold: f64, rng: &mut R) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            let label = if rng.gen::<f64>() > threshold { 1 } else { 0 };
            let probability = rng.gen::<f64>() * 100.0;

            row.insert(CHURN_PREDICTION_FIELD.to_string(), Value::from(label));
            row.insert(
                CHURN_PROBABILITY_FIELD.to_string(),
                Value::String(format!("{:.2}", probability)),
            );
            row
        })
        .collect()
}

/// Builds the aggregate counts for already-labelled rows.
pub fn summarize(rows: Vec<Row>) -> PredictionResult {
    let total_records = rows.len();
    let churn_count = rows.iter().filter(|row| is_churn(row)).count();

    PredictionResult {
        total_records,
        churn_count,
        retain_count: total_records - churn_count,
        churn_rate: churn_rate(churn_count, total_records),
        data: rows,
    }
}

fn is_churn(row: &Row) -> bool {
    match row.get(CHURN_PREDICTION_FIELD) {
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => s.trim() == "1",
        Some(Value::Bool(flag)) => *flag,
        _ => false,
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    rows: &'a [Row],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictionResponse {
    Full(PredictionResult),
    RowsOnly { rows: Vec<Row> },
}

/// Calls an external prediction endpoint: `POST {"rows": [...]}`.
#[derive(Debug, Clone)]
pub struct HttpPredictionService {
    client: Client,
    endpoint: String,
}

impl HttpPredictionService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PredictionService for HttpPredictionService {
    async fn predict(&self, rows: Vec<Row>) -> Result<PredictionResult> {
        let expected = rows.len();
        tracing::debug!("Sending {} rows to {}", expected, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictionRequest { rows: &rows })
            .send()
            .await?;

        tracing::debug!("Prediction API response status: {}", response.status());

        if !response.status().is_success() {
            return Err(ChurnError::PredictionError {
                message: format!("endpoint returned HTTP {}", response.status()),
            });
        }

        let result = match response.json::<PredictionResponse>().await? {
            PredictionResponse::Full(result) => {
                if !result.is_consistent() {
                    return Err(ChurnError::PredictionError {
                        message: format!(
                            "inconsistent aggregates: total={} churn={} retain={} rate={}",
                            result.total_records,
                            result.churn_count,
                            result.retain_count,
                            result.churn_rate
                        ),
                    });
                }
                result
            }
            PredictionResponse::RowsOnly { rows } => summarize(rows),
        };

        if result.total_records != expected {
            return Err(ChurnError::PredictionError {
                message: format!(
                    "expected {} predictions, got {}",
                    expected, result.total_records
                ),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn rows(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| {
                let mut row = Row::new();
                row.insert("customer_id".to_string(), json!(format!("C-{}", i)));
                row.insert("plan".to_string(), json!("basic"));
                row
            })
            .collect()
    }

    #[test]
    fn test_annotate_rows_appends_fields_in_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let annotated = annotate_rows(rows(50), DEFAULT_CHURN_THRESHOLD, &mut rng);

        assert_eq!(annotated.len(), 50);
        for row in &annotated {
            let keys: Vec<&String> = row.keys().collect();
            assert_eq!(
                keys,
                vec!["customer_id", "plan", CHURN_PREDICTION_FIELD, CHURN_PROBABILITY_FIELD]
            );

            let label = row[CHURN_PREDICTION_FIELD].as_i64().unwrap();
            assert!(label == 0 || label == 1);

            let probability = row[CHURN_PROBABILITY_FIELD].as_str().unwrap();
            let (_, decimals) = probability.split_once('.').unwrap();
            assert_eq!(decimals.len(), 2);
            let value: f64 = probability.parse().unwrap();
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_threshold_extremes() {
        let mut rng = StdRng::seed_from_u64(7);
        let none = summarize(annotate_rows(rows(20), 1.0, &mut rng));
        assert_eq!(none.churn_count, 0);

        let all = summarize(annotate_rows(rows(20), -1.0, &mut rng));
        assert_eq!(all.churn_count, 20);
        assert_eq!(all.churn_rate, 100.0);
    }

    #[test]
    fn test_summarize_counts() {
        let mut data = rows(4);
        data[0].insert(CHURN_PREDICTION_FIELD.to_string(), json!(1));
        data[1].insert(CHURN_PREDICTION_FIELD.to_string(), json!("1"));
        data[2].insert(CHURN_PREDICTION_FIELD.to_string(), json!(0));

        let result = summarize(data);
        assert_eq!(result.total_records, 4);
        assert_eq!(result.churn_count, 2);
        assert_eq!(result.retain_count, 2);
        assert_eq!(result.churn_rate, 50.0);
        assert!(result.is_consistent());
    }

    #[test]
    fn test_summarize_empty_has_zero_rate() {
        let result = summarize(Vec::new());
        assert_eq!(result.total_records, 0);
        assert_eq!(result.churn_rate, 0.0);
        assert!(result.is_consistent());
    }

    #[tokio::test]
    async fn test_mock_service_keeps_invariants() {
        let service = MockPredictionService::new(Duration::from_millis(1));
        let result = service.predict(rows(3)).await.unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(result.churn_count + result.retain_count, 3);
        assert!((0.0..=100.0).contains(&result.churn_rate));
    }

    #[tokio::test]
    async fn test_http_service_full_response() {
        let server = MockServer::start_async().await;
        let api_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/predict")
                    .json_body(json!({"rows": [{"customer_id": "C-0", "plan": "basic"}]}));
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({
                        "totalRecords": 1,
                        "churnCount": 1,
                        "retainCount": 0,
                        "churnRate": 100.0,
                        "data": [{
                            "customer_id": "C-0",
                            "plan": "basic",
                            "churn_prediction": 1,
                            "churn_probability": "81.20"
                        }]
                    }));
            })
            .await;

        let service =
            HttpPredictionService::new(server.url("/predict"), Duration::from_secs(5)).unwrap();
        let result = service.predict(rows(1)).await.unwrap();

        api_mock.assert_async().await;
        assert_eq!(result.churn_count, 1);
        assert_eq!(result.data[0][CHURN_PROBABILITY_FIELD], "81.20");
    }

    #[tokio::test]
    async fn test_http_service_rows_only_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/predict");
                then.status(200).json_body(json!({
                    "rows": [
                        {"customer_id": "C-0", "churn_prediction": 0, "churn_probability": "10.00"},
                        {"customer_id": "C-1", "churn_prediction": 1, "churn_probability": "90.00"}
                    ]
                }));
            })
            .await;

        let service =
            HttpPredictionService::new(server.url("/predict"), Duration::from_secs(5)).unwrap();
        let result = service.predict(rows(2)).await.unwrap();

        assert_eq!(result.total_records, 2);
        assert_eq!(result.churn_count, 1);
        assert_eq!(result.churn_rate, 50.0);
    }

    #[tokio::test]
    async fn test_http_service_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/predict");
                then.status(503);
            })
            .await;

        let service =
            HttpPredictionService::new(server.url("/predict"), Duration::from_secs(5)).unwrap();
        let err = service.predict(rows(1)).await.unwrap_err();

        assert!(matches!(err, ChurnError::PredictionError { .. }));
    }

    #[tokio::test]
    async fn test_http_service_rejects_inconsistent_counts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/predict");
                then.status(200).json_body(json!({
                    "totalRecords": 1,
                    "churnCount": 1,
                    "retainCount": 1,
                    "churnRate": 100.0,
                    "data": [{"customer_id": "C-0"}]
                }));
            })
            .await;

        let service =
            HttpPredictionService::new(server.url("/predict"), Duration::from_secs(5)).unwrap();
        assert!(service.predict(rows(1)).await.is_err());
    }
}
