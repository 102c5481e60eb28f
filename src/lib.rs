//! Student engagement prediction.
//!
//! [`scorer`] turns a metrics snapshot into a prediction, [`aggregator`]
//! reduces stored predictions to a population summary, and [`service`]
//! exposes both behind an action envelope backed by a [`store::PredictionStore`].

pub mod aggregator;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod scorer;
pub mod service;
pub mod store;
