//! Estimate responses returned to the caller

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Successful delivery duration estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEstimate {
    /// Correlation id of the originating request
    pub request_id: String,

    /// Predicted delivery duration in minutes (non-negative)
    pub predicted_minutes: f64,

    /// Prediction rendered to two decimal places
    pub display: String,

    /// When the estimate was produced
    pub estimated_at: DateTime<Utc>,
}

impl DeliveryEstimate {
    pub fn new(request_id: String, predicted_minutes: f64) -> Self {
        Self {
            request_id,
            predicted_minutes,
            display: format!("{:.2}", predicted_minutes),
            estimated_at: Utc::now(),
        }
    }
}

/// Failure report for a single request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateFailure {
    pub request_id: String,
    /// `invalid_input`, `prediction` or `asset_load`
    pub kind: String,
    pub message: String,
}

impl EstimateFailure {
    pub fn from_error(request_id: String, err: &PipelineError) -> Self {
        Self {
            request_id,
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Reply payload: either an estimate or a failure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EstimateReply {
    Ok(DeliveryEstimate),
    Error(EstimateFailure),
}

impl EstimateReply {
    pub fn request_id(&self) -> &str {
        match self {
            EstimateReply::Ok(estimate) => &estimate.request_id,
            EstimateReply::Error(failure) => &failure.request_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_has_two_decimals() {
        let estimate = DeliveryEstimate::new("req_1".to_string(), 41.236);
        assert_eq!(estimate.display, "41.24");

        let estimate = DeliveryEstimate::new("req_2".to_string(), 30.0);
        assert_eq!(estimate.display, "30.00");
    }

    #[test]
    fn test_reply_is_tagged_by_status() {
        let reply = EstimateReply::Ok(DeliveryEstimate::new("req_1".to_string(), 12.5));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["predicted_minutes"], 12.5);

        let err = PipelineError::invalid_input("subtotal", "must be a finite non-negative amount");
        let reply = EstimateReply::Error(EstimateFailure::from_error("req_2".to_string(), &err));
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "invalid_input");
        assert_eq!(reply.request_id(), "req_2");
    }
}
