//! Inference: model invocation and the per-request estimation pipeline

use crate::error::PipelineError;
use crate::feature_engine::FeatureEngine;
use crate::models::loader::Assets;
use crate::schema::{FeatureVector, SchemaAligner};
use crate::types::estimate::DeliveryEstimate;
use crate::types::order::{InputLimits, OrderRequest};
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs the loaded regression model on aligned feature vectors
pub struct Predictor {
    assets: Arc<Assets>,
}

impl Predictor {
    pub fn new(assets: Arc<Assets>) -> Self {
        Self { assets }
    }

    /// Predicted delivery minutes for one aligned vector.
    ///
    /// Negative model output is clamped to zero.
    pub fn predict(&self, vector: &FeatureVector) -> Result<f64, PipelineError> {
        let expected = self.assets.manifest.len();
        if vector.len() != expected {
            return Err(PipelineError::Prediction(format!(
                "feature vector has {} values, model expects {}",
                vector.len(),
                expected
            )));
        }

        let raw = self.assets.model.predict(&vector.to_f32())?;
        if !raw.is_finite() {
            return Err(PipelineError::Prediction(format!(
                "model {} produced non-finite output {}",
                self.assets.model.name(),
                raw
            )));
        }

        if raw < 0.0 {
            debug!(model = %self.assets.model.name(), raw = raw, "Negative prediction clamped to zero");
        }
        Ok(raw.max(0.0))
    }
}

/// Validate, engineer, align and predict for a single order
pub struct EstimationPipeline {
    limits: InputLimits,
    engine: FeatureEngine,
    aligner: SchemaAligner,
    predictor: Predictor,
}

impl EstimationPipeline {
    pub fn new(assets: Arc<Assets>) -> Self {
        let aligner = SchemaAligner::new(assets.manifest.clone(), assets.baselines.clone());
        Self {
            limits: InputLimits::default(),
            engine: FeatureEngine::new(),
            aligner,
            predictor: Predictor::new(assets),
        }
    }

    /// Replace the accepted identifier sets
    pub fn with_limits(mut self, limits: InputLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of columns the model consumes
    pub fn feature_count(&self) -> usize {
        self.aligner.manifest().len()
    }

    /// Aligned model input for an order, after validation.
    pub fn features(&self, order: &OrderRequest) -> Result<FeatureVector, PipelineError> {
        order.validate(&self.limits)?;
        let record = self.engine.engineer(order);
        Ok(self.aligner.align(&record))
    }

    /// Full estimate for an order. Failures affect this request only.
    pub fn estimate(&self, order: &OrderRequest) -> Result<DeliveryEstimate, PipelineError> {
        let request_id = order
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let vector = self.features(order).map_err(|e| {
            warn!(request_id = %request_id, error = %e, "Order rejected");
            e
        })?;
        let minutes = self.predictor.predict(&vector)?;

        debug!(
            request_id = %request_id,
            predicted_minutes = minutes,
            features = vector.len(),
            "Estimate computed"
        );

        Ok(DeliveryEstimate::new(request_id, minutes))
    }

    /// Estimate on the blocking thread pool.
    ///
    /// ONNX sessions run synchronously behind a lock, so async callers
    /// must not run them on a runtime worker.
    pub async fn estimate_blocking(
        self: Arc<Self>,
        order: OrderRequest,
    ) -> Result<DeliveryEstimate, PipelineError> {
        tokio::task::spawn_blocking(move || self.estimate(&order))
            .await
            .unwrap_or_else(|e| {
                Err(PipelineError::Prediction(format!(
                    "estimation task failed: {}",
                    e
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loader::fixtures::{assets_with, constant_assets, FailingRegressor};
    use crate::models::loader::Assets;
    use crate::schema::fixtures;
    use crate::types::order::fixtures::sample_order;

    fn weight_on(column: &str, weight: f64) -> Vec<f64> {
        fixtures::manifest()
            .columns()
            .iter()
            .map(|c| if c == column { weight } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_constant_model_estimate() {
        let pipeline = EstimationPipeline::new(Arc::new(constant_assets()));

        let estimate = pipeline.estimate(&sample_order()).unwrap();

        assert_eq!(estimate.request_id, "req_001");
        assert_eq!(estimate.predicted_minutes, 30.0);
        assert_eq!(estimate.display, "30.00");
    }

    #[test]
    fn test_values_reach_model_in_manifest_order() {
        let assets = assets_with(10.0, weight_on("load_ratio", 31.0));
        let pipeline = EstimationPipeline::new(Arc::new(assets));

        let estimate = pipeline.estimate(&sample_order()).unwrap();

        // 10 + 31 * (60 / 31), within f32 precision
        assert!((estimate.predicted_minutes - 70.0).abs() < 1e-3);
    }

    #[test]
    fn test_category_column_reaches_model() {
        let assets = assets_with(20.0, weight_on("store_primary_category_pizza", 5.0));
        let pipeline = EstimationPipeline::new(Arc::new(assets));

        let mut pizza = sample_order();
        pizza.store_primary_category = "pizza".to_string();
        let mut unseen = sample_order();
        unseen.store_primary_category = "martian".to_string();

        assert_eq!(pipeline.estimate(&pizza).unwrap().predicted_minutes, 25.0);
        assert_eq!(pipeline.estimate(&unseen).unwrap().predicted_minutes, 20.0);
    }

    #[test]
    fn test_negative_output_clamped() {
        let pipeline = EstimationPipeline::new(Arc::new(assets_with(-5.0, vec![0.0; 22])));

        let estimate = pipeline.estimate(&sample_order()).unwrap();

        assert_eq!(estimate.predicted_minutes, 0.0);
    }

    #[test]
    fn test_invalid_order_rejected_before_model() {
        let pipeline = EstimationPipeline::new(Arc::new(constant_assets()));
        let mut order = sample_order();
        order.total_outstanding_orders = -3;

        match pipeline.estimate(&order) {
            Err(PipelineError::InvalidInput { field, .. }) => {
                assert_eq!(field, "total_outstanding_orders")
            }
            other => panic!("expected invalid input, got {:?}", other),
        }

        // A rejected request leaves the pipeline usable
        assert!(pipeline.estimate(&sample_order()).is_ok());
    }

    #[test]
    fn test_non_finite_output_is_prediction_error() {
        let pipeline = EstimationPipeline::new(Arc::new(assets_with(f64::NAN, vec![0.0; 22])));

        let err = pipeline.estimate(&sample_order()).unwrap_err();

        assert!(matches!(err, PipelineError::Prediction(_)));
    }

    #[test]
    fn test_missing_request_id_is_generated() {
        let pipeline = EstimationPipeline::new(Arc::new(constant_assets()));
        let mut order = sample_order();
        order.request_id = None;

        let estimate = pipeline.estimate(&order).unwrap();

        assert!(uuid::Uuid::parse_str(&estimate.request_id).is_ok());
    }

    #[test]
    fn test_model_error_fails_only_that_request() {
        let failing = Assets::new(
            Box::new(FailingRegressor),
            fixtures::manifest(),
            fixtures::baselines(),
        )
        .unwrap();
        let broken = EstimationPipeline::new(Arc::new(failing));

        match broken.estimate(&sample_order()) {
            Err(PipelineError::Prediction(message)) => assert!(message.contains("session")),
            other => panic!("expected prediction error, got {:?}", other),
        }

        // Shared assets of other pipelines are untouched by the failure
        let working = EstimationPipeline::new(Arc::new(constant_assets()));
        assert_eq!(working.estimate(&sample_order()).unwrap().predicted_minutes, 30.0);
        assert!(matches!(
            broken.estimate(&sample_order()),
            Err(PipelineError::Prediction(_))
        ));
    }

    #[test]
    fn test_vector_width_mismatch_is_prediction_error() {
        let assets = Arc::new(
            Assets::new(
                Box::new(FailingRegressor),
                fixtures::manifest(),
                fixtures::baselines(),
            )
            .unwrap(),
        );
        let narrow = SchemaAligner::new(
            Arc::new(
                crate::schema::FeatureManifest::new(vec![
                    "total_items".to_string(),
                    "load_ratio".to_string(),
                ])
                .unwrap(),
            ),
            fixtures::baselines(),
        );
        let vector = narrow.align(&FeatureEngine::new().engineer(&sample_order()));

        match Predictor::new(assets).predict(&vector) {
            Err(PipelineError::Prediction(message)) => assert!(message.contains("2 values")),
            other => panic!("expected prediction error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_market_rejected_before_model() {
        let pipeline = EstimationPipeline::new(Arc::new(constant_assets()));
        let mut order = sample_order();
        order.market_id = 42;

        assert!(matches!(
            pipeline.estimate(&order),
            Err(PipelineError::InvalidInput { ref field, .. }) if field == "market_id"
        ));

        let narrowed = EstimationPipeline::new(Arc::new(constant_assets())).with_limits(InputLimits {
            market_ids: vec![2],
            order_protocols: vec![1],
        });
        assert!(narrowed.estimate(&sample_order()).is_err());
    }

    #[tokio::test]
    async fn test_blocking_estimates_run_concurrently() {
        let pipeline = Arc::new(EstimationPipeline::new(Arc::new(constant_assets())));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let mut order = sample_order();
                order.request_id = Some(format!("req_{:03}", i));
                tokio::spawn(pipeline.clone().estimate_blocking(order))
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let estimate = handle.await.unwrap().unwrap();
            assert_eq!(estimate.request_id, format!("req_{:03}", i));
            assert_eq!(estimate.predicted_minutes, 30.0);
        }

        let mut invalid = sample_order();
        invalid.market_id = 0;
        assert!(matches!(
            pipeline.estimate_blocking(invalid).await,
            Err(PipelineError::InvalidInput { .. })
        ));
    }
}
