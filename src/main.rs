//! Delivery Time Estimator - Main Entry Point
//!
//! Loads the trained model and feature manifest, then answers order
//! requests from NATS with delivery duration estimates.

use anyhow::{Context, Result};
use delivery_time_estimator::{
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{loader::FileAssetSource, AssetLoader, EstimationPipeline},
    producer::EstimateProducer,
    types::{EstimateFailure, EstimateReply, OrderRequest},
    PipelineError,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    init_logging(&config.logging)?;
    info!("Starting Delivery Time Estimator");
    info!(
        model = %config.assets.model_path,
        manifest = %config.assets.manifest_path,
        baselines = %config.assets.baselines_path,
        "Configuration loaded successfully"
    );

    // Assets are loaded once; any failure halts startup
    let loader = AssetLoader::new(FileAssetSource::new(&config.assets));
    let assets = match loader.load() {
        Ok(assets) => assets,
        Err(e) => {
            error!(error = %e, "Failed to load model assets, refusing to start");
            return Err(e).context("asset loading failed");
        }
    };
    info!(
        model = %assets.model.name(),
        features = assets.manifest.len(),
        store_categories = assets.manifest.category_values("store_primary_category").len(),
        "Model assets loaded"
    );

    let pipeline = Arc::new(
        EstimationPipeline::new(assets).with_limits(config.pipeline.input_limits.clone()),
    );
    let metrics = Arc::new(PipelineMetrics::new());

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats);
    let producer = Arc::new(EstimateProducer::new(client.clone(), &config.nats.estimate_subject));

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        request_subject = %consumer.subject(),
        queue_group = ?consumer.queue_group(),
        fallback_reply_subject = %producer.subject(),
        features = pipeline.feature_count(),
        "Starting request processing loop"
    );

    // Semaphore to limit concurrent processing
    let semaphore = Arc::new(Semaphore::new(num_workers));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.report_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();

            let reply = match serde_json::from_slice::<OrderRequest>(&message.payload) {
                Ok(mut order) => {
                    let request_id = order
                        .request_id
                        .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
                        .clone();

                    // ONNX inference blocks on the session lock; keep it off the async workers
                    let estimated = pipeline.clone().estimate_blocking(order).await;

                    match estimated {
                        Ok(estimate) => {
                            metrics.record_estimate(start_time.elapsed(), estimate.predicted_minutes);
                            info!(
                                request_id = %request_id,
                                predicted_minutes = estimate.predicted_minutes,
                                processing_time_us = start_time.elapsed().as_micros(),
                                "Estimate served"
                            );
                            EstimateReply::Ok(estimate)
                        }
                        Err(e) => {
                            metrics.record_failure(start_time.elapsed(), e.kind());
                            if let PipelineError::Prediction(_) = e {
                                error!(request_id = %request_id, error = %e, "Inference failed");
                            }
                            EstimateReply::Error(EstimateFailure::from_error(request_id, &e))
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize order request");
                    let err = PipelineError::invalid_input("payload", e.to_string());
                    metrics.record_failure(start_time.elapsed(), err.kind());
                    EstimateReply::Error(EstimateFailure::from_error(
                        uuid::Uuid::new_v4().to_string(),
                        &err,
                    ))
                }
            };

            if let Err(e) = producer.publish(message.reply.clone(), &reply).await {
                error!(
                    request_id = %reply.request_id(),
                    error = %e,
                    "Failed to publish estimate reply"
                );
            }

            drop(permit);
        });
    }

    info!("Subscription closed, shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("delivery_time_estimator={}", logging.level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
