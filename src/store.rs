use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{PredictionRecord, PredictionResult};

/// Persistence for predictions.
///
/// Implementations assign the record id and `predicted_at` at write time.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    async fn insert_prediction(
        &self,
        student_id: &str,
        prediction: &PredictionResult,
    ) -> Result<PredictionRecord, StoreError>;

    /// Stores every prediction or none of them, returning records in input order.
    async fn insert_predictions(
        &self,
        predictions: &[(String, PredictionResult)],
    ) -> Result<Vec<PredictionRecord>, StoreError>;

    /// Full prediction history, newest first.
    async fn fetch_predictions(&self) -> Result<Vec<PredictionRecord>, StoreError>;

    /// Up to `limit` predictions for one student, newest first.
    async fn fetch_trends(
        &self,
        student_id: &str,
        limit: u32,
    ) -> Result<Vec<PredictionRecord>, StoreError>;
}
