//! Error taxonomy for the estimation pipeline

use thiserror::Error;

/// Errors raised while loading assets or serving a single estimate request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An artifact was missing, unreadable, corrupt or inconsistent with the others.
    /// Fatal at startup.
    #[error("failed to load {artifact}: {reason}")]
    AssetLoad { artifact: String, reason: String },

    /// A request field violates its constraint.
    #[error("invalid input for `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    /// The model call failed for one request.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl PipelineError {
    pub fn asset_load(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Self::AssetLoad {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable label used in failure responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::AssetLoad { .. } => "asset_load",
            PipelineError::InvalidInput { .. } => "invalid_input",
            PipelineError::Prediction(_) => "prediction",
        }
    }
}
