//! Model assets and inference

pub mod inference;
pub mod loader;

pub use inference::{EstimationPipeline, Predictor};
pub use loader::{AssetLoader, AssetSource, Assets, FileAssetSource, Regressor};
