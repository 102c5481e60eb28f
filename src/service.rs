//! Request/response boundary for the engagement engine.
//!
//! Requests arrive as `{ "action": ..., "data": ... }` envelopes. Every
//! response carries `success`; failures add an `error` message and a non-2xx
//! status.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::aggregator;
use crate::error::ServiceError;
use crate::models::{MetricsSnapshot, PredictionRecord, PredictionResult, Summary};
use crate::scorer;
use crate::store::PredictionStore;

pub const DEFAULT_TRENDS_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn ok(payload: Value) -> Self {
        let mut body = json!({ "success": true });
        if let (Some(body), Value::Object(payload)) = (body.as_object_mut(), payload) {
            body.extend(payload);
        }
        Self { status: 200, body }
    }

    fn failure(err: &ServiceError) -> Self {
        Self {
            status: err.status(),
            body: json!({ "success": false, "error": err.to_string() }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    metrics: Vec<MetricsSnapshot>,
}

#[derive(Debug, Deserialize)]
struct TrendsRequest {
    student_id: String,
    #[serde(default)]
    limit: Option<u32>,
}

/// One entry of a batch response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchPrediction {
    pub student_id: String,
    #[serde(flatten)]
    pub prediction: PredictionResult,
}

pub struct EngagementService<S> {
    store: S,
}

impl<S: PredictionStore> EngagementService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Parses a raw JSON envelope and dispatches it.
    pub async fn handle_json(&self, raw: &str) -> Response {
        match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => Response::failure(&ServiceError::MalformedRequest(err.to_string())),
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(payload) => Response::ok(payload),
            Err(err) => {
                if err.status() >= 500 {
                    error!(error = %err, "request failed");
                } else {
                    warn!(error = %err, "rejected request");
                }
                Response::failure(&err)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Value, ServiceError> {
        let action = request
            .action
            .ok_or_else(|| ServiceError::MalformedRequest("missing action".to_string()))?;
        info!(action = %action, "received action");
        debug!(data = %request.data, "request payload");

        match action.as_str() {
            "predict" => {
                let metrics: MetricsSnapshot = parse_data(request.data)?;
                let prediction = self.predict(&metrics).await?;
                Ok(json!({ "prediction": prediction }))
            }
            "predict-batch" => {
                let batch: BatchRequest = parse_data(request.data)?;
                let predictions = self.predict_batch(&batch.metrics).await?;
                Ok(json!({ "predictions": predictions }))
            }
            "get-summary" => {
                let summary = self.summary().await?;
                Ok(json!({ "summary": summary }))
            }
            "get-trends" => {
                let trends: TrendsRequest = parse_data(request.data)?;
                let records = self
                    .trends(&trends.student_id, trends.limit.unwrap_or(DEFAULT_TRENDS_LIMIT))
                    .await?;
                Ok(json!({ "trends": records }))
            }
            other => Err(ServiceError::UnknownAction(other.to_string())),
        }
    }

    /// Scores one snapshot and persists the result.
    pub async fn predict(&self, metrics: &MetricsSnapshot) -> Result<PredictionResult, ServiceError> {
        require_student_id(&metrics.student_id)?;
        let prediction = scorer::score(metrics);

        self.store
            .insert_prediction(&metrics.student_id, &prediction)
            .await
            .map_err(ServiceError::store("Failed to store prediction"))?;

        info!(
            student_id = %metrics.student_id,
            score = prediction.engagement_score,
            level = %prediction.engagement_level,
            "prediction stored"
        );
        Ok(prediction)
    }

    /// Scores every snapshot and persists them together; output order follows input.
    pub async fn predict_batch(
        &self,
        metrics: &[MetricsSnapshot],
    ) -> Result<Vec<BatchPrediction>, ServiceError> {
        for snapshot in metrics {
            require_student_id(&snapshot.student_id)?;
        }

        let predictions: Vec<BatchPrediction> = metrics
            .iter()
            .zip(scorer::score_batch(metrics))
            .map(|(snapshot, prediction)| BatchPrediction {
                student_id: snapshot.student_id.clone(),
                prediction,
            })
            .collect();

        let rows: Vec<(String, PredictionResult)> = predictions
            .iter()
            .map(|p| (p.student_id.clone(), p.prediction.clone()))
            .collect();
        self.store
            .insert_predictions(&rows)
            .await
            .map_err(ServiceError::store("Failed to store predictions"))?;

        info!(count = predictions.len(), "batch prediction completed");
        Ok(predictions)
    }

    pub async fn summary(&self) -> Result<Summary, ServiceError> {
        let records = self
            .store
            .fetch_predictions()
            .await
            .map_err(ServiceError::store("Failed to fetch summary"))?;
        Ok(aggregator::summarize(&records))
    }

    pub async fn trends(
        &self,
        student_id: &str,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, ServiceError> {
        require_student_id(student_id)?;
        self.store
            .fetch_trends(student_id, limit)
            .await
            .map_err(ServiceError::store("Failed to fetch trends"))
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, ServiceError> {
    serde_json::from_value(data).map_err(|err| ServiceError::MalformedRequest(err.to_string()))
}

fn require_student_id(student_id: &str) -> Result<(), ServiceError> {
    if student_id.trim().is_empty() {
        return Err(ServiceError::MalformedRequest(
            "student_id must not be empty".to_string(),
        ));
    }
    Ok(())
}
