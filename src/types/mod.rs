//! Type definitions for the delivery time estimator

pub mod estimate;
pub mod order;

pub use estimate::{DeliveryEstimate, EstimateFailure, EstimateReply};
pub use order::OrderRequest;
