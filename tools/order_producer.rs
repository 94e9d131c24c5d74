//! Order Request Producer
//!
//! Generates randomized order requests, sends them to the estimator over
//! NATS request/reply and logs the estimates that come back.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use delivery_time_estimator::types::{EstimateReply, OrderRequest};
use delivery_time_estimator::FeatureManifest;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Order generator for exercising the estimator
struct OrderGenerator {
    rng: rand::rngs::ThreadRng,
    request_counter: u64,
    store_categories: Vec<String>,
}

impl OrderGenerator {
    fn new(store_categories: Vec<String>) -> Self {
        Self {
            rng: rand::thread_rng(),
            request_counter: 0,
            store_categories,
        }
    }

    /// Generate a random order within the input constraints
    fn generate(&mut self) -> OrderRequest {
        self.request_counter += 1;

        let total_items = self.rng.gen_range(1..12);
        let num_distinct_items = self.rng.gen_range(1..=total_items);
        let min_item_price = self.rng.gen_range(100.0..1500.0_f64).round();
        let max_item_price = (min_item_price + self.rng.gen_range(0.0..2000.0_f64)).round();
        let subtotal = (min_item_price * total_items as f64 + max_item_price).round();

        let total_onshift_partners = self.rng.gen_range(0..150);
        let total_busy_partners = self.rng.gen_range(0..=total_onshift_partners);
        let total_outstanding_orders = self.rng.gen_range(0..250);

        // 2015-01-21 .. 2015-02-18, the span the training data covers
        let start = NaiveDate::from_ymd_opt(2015, 1, 21).unwrap_or_default();
        let order_date = start + ChronoDuration::days(self.rng.gen_range(0..29));
        let order_time =
            NaiveTime::from_hms_opt(self.rng.gen_range(0..24), self.rng.gen_range(0..60), 0)
                .unwrap_or_default();

        let store_primary_category = if self.store_categories.is_empty() {
            "american".to_string()
        } else {
            self.store_categories[self.rng.gen_range(0..self.store_categories.len())].clone()
        };

        OrderRequest {
            request_id: Some(format!("req_{:012}", self.request_counter)),
            market_id: self.rng.gen_range(1..=6),
            order_protocol: self.rng.gen_range(1..=7),
            store_primary_category,
            total_items,
            num_distinct_items,
            subtotal,
            min_item_price,
            max_item_price,
            total_onshift_partners,
            total_busy_partners,
            total_outstanding_orders,
            order_date,
            order_time,
        }
    }
}

/// Running count of reply outcomes
#[derive(Debug, Default)]
struct ReplyTally {
    answered: u64,
    failed: u64,
}

impl ReplyTally {
    /// Count one reply; a malformed payload is a failure, not a fatal error
    fn record(&mut self, order: &OrderRequest, payload: &[u8]) {
        match serde_json::from_slice::<EstimateReply>(payload) {
            Ok(EstimateReply::Ok(estimate)) => {
                self.answered += 1;
                info!(
                    request_id = %estimate.request_id,
                    market_id = order.market_id,
                    category = %order.store_primary_category,
                    "Estimated delivery: {} minutes",
                    estimate.display
                );
            }
            Ok(EstimateReply::Error(failure)) => {
                self.failed += 1;
                warn!(
                    request_id = %failure.request_id,
                    kind = %failure.kind,
                    "Estimate failed: {}",
                    failure.message
                );
            }
            Err(e) => {
                self.failed += 1;
                warn!(error = %e, "Malformed estimate reply");
            }
        }
    }
}

/// Store categories offered by the manifest, if it can be read
fn store_categories(manifest_path: &str) -> Vec<String> {
    match std::fs::read(manifest_path)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| FeatureManifest::from_json(&bytes).map_err(anyhow::Error::from))
    {
        Ok(manifest) => manifest.category_values("store_primary_category"),
        Err(e) => {
            warn!(path = %manifest_path, error = %e, "Could not read manifest, using a fixed category");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("order_request_producer=info".parse()?),
        )
        .init();

    info!("Starting Order Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("delivery.estimate.request");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);
    let manifest_path = args
        .get(5)
        .map(|s| s.as_str())
        .unwrap_or("assets/final_features.json");

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let mut generator = OrderGenerator::new(store_categories(manifest_path));

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&mut generator, count, delay_ms).await;
        }
    };

    let mut tally = ReplyTally::default();

    for i in 0..count {
        let order = generator.generate();
        let payload = serde_json::to_vec(&order)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(message) => tally.record(&order, &message.payload),
            Err(e) => {
                tally.failed += 1;
                warn!(error = %e, "Request got no reply");
            }
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} answered, {} failed)",
                i + 1,
                count,
                tally.answered,
                tally.failed
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} answered, {} failed)",
        count, tally.answered, tally.failed
    );

    Ok(())
}

async fn run_dry_mode(
    generator: &mut OrderGenerator,
    count: u64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    for i in 0..count {
        let order = generator.generate();
        let json = serde_json::to_string_pretty(&order)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
