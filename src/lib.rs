//! Delivery Time Estimator Library
//!
//! Turns an order request into the exact feature layout a trained
//! regression model expects and returns the predicted delivery duration
//! in minutes.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_engine;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod schema;
pub mod types;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::PipelineError;
pub use feature_engine::{EngineeredRecord, FeatureEngine};
pub use models::inference::EstimationPipeline;
pub use producer::EstimateProducer;
pub use schema::{CategoryBaselines, FeatureManifest, FeatureVector, SchemaAligner};
pub use types::{estimate::DeliveryEstimate, order::OrderRequest};
