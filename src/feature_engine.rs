//! Feature engineering for delivery time model inference.
//!
//! Derives the temporal and load features the regression model was
//! trained with from a validated order request.

use crate::types::order::OrderRequest;
use chrono::{Datelike, Timelike};

/// Raw numeric columns carried through to the model unchanged.
pub const RAW_NUMERIC_FEATURES: [&str; 8] = [
    "total_items",
    "subtotal",
    "num_distinct_items",
    "min_item_price",
    "max_item_price",
    "total_onshift_partners",
    "total_busy_partners",
    "total_outstanding_orders",
];

/// Derived columns, in the order they were added at training time.
pub const ENGINEERED_FEATURES: [&str; 7] = [
    "order_hour",
    "day_of_week",
    "is_weekend",
    "load_ratio",
    "busy_partners_ratio",
    "item_complexity",
    "rush_load",
];

/// Order request plus its derived features.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub market_id: i64,
    pub order_protocol: i64,
    pub store_primary_category: String,

    pub total_items: f64,
    pub subtotal: f64,
    pub num_distinct_items: f64,
    pub min_item_price: f64,
    pub max_item_price: f64,
    pub total_onshift_partners: f64,
    pub total_busy_partners: f64,
    pub total_outstanding_orders: f64,

    /// Hour of day, 0..=23
    pub order_hour: u32,
    /// Monday = 0 .. Sunday = 6
    pub day_of_week: u32,
    /// 1 on Saturday and Sunday
    pub is_weekend: u32,
    pub load_ratio: f64,
    pub busy_partners_ratio: f64,
    pub item_complexity: f64,
    pub rush_load: f64,
}

impl EngineeredRecord {
    /// All numeric columns (raw then engineered) as name/value pairs.
    pub fn numeric_features(&self) -> Vec<(&'static str, f64)> {
        let raw = [
            self.total_items,
            self.subtotal,
            self.num_distinct_items,
            self.min_item_price,
            self.max_item_price,
            self.total_onshift_partners,
            self.total_busy_partners,
            self.total_outstanding_orders,
        ];
        let engineered = [
            self.order_hour as f64,
            self.day_of_week as f64,
            self.is_weekend as f64,
            self.load_ratio,
            self.busy_partners_ratio,
            self.item_complexity,
            self.rush_load,
        ];

        RAW_NUMERIC_FEATURES
            .iter()
            .copied()
            .zip(raw)
            .chain(ENGINEERED_FEATURES.iter().copied().zip(engineered))
            .collect()
    }
}

/// Stateless transformer from order requests to engineered records.
pub struct FeatureEngine;

impl FeatureEngine {
    pub fn new() -> Self {
        Self
    }

    /// Derive the engineered record for an order.
    ///
    /// Ratios divide by `count + 1`, so zero partners or zero items never
    /// fault and reproduce the training-time values exactly.
    pub fn engineer(&self, order: &OrderRequest) -> EngineeredRecord {
        let timestamp = order.timestamp();

        let order_hour = timestamp.hour();
        let day_of_week = timestamp.weekday().num_days_from_monday();
        let is_weekend = u32::from(day_of_week >= 5);

        let onshift = order.total_onshift_partners as f64;
        let load_ratio = order.total_outstanding_orders as f64 / (onshift + 1.0);
        let busy_partners_ratio = order.total_busy_partners as f64 / (onshift + 1.0);
        let item_complexity = order.num_distinct_items as f64 / (order.total_items as f64 + 1.0);
        let rush_load = load_ratio * is_weekend as f64;

        EngineeredRecord {
            market_id: order.market_id,
            order_protocol: order.order_protocol,
            store_primary_category: order.store_primary_category.clone(),
            total_items: order.total_items as f64,
            subtotal: order.subtotal,
            num_distinct_items: order.num_distinct_items as f64,
            min_item_price: order.min_item_price,
            max_item_price: order.max_item_price,
            total_onshift_partners: onshift,
            total_busy_partners: order.total_busy_partners as f64,
            total_outstanding_orders: order.total_outstanding_orders as f64,
            order_hour,
            day_of_week,
            is_weekend,
            load_ratio,
            busy_partners_ratio,
            item_complexity,
            rush_load,
        }
    }
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::order::fixtures::sample_order;
    use chrono::NaiveDate;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_reference_friday_order() {
        let record = FeatureEngine::new().engineer(&sample_order());

        assert!(approx(record.load_ratio, 60.0 / 31.0));
        assert!(approx(record.busy_partners_ratio, 25.0 / 31.0));
        assert!(approx(record.item_complexity, 0.6));
        assert_eq!(record.order_hour, 22);
        assert_eq!(record.day_of_week, 4);
        assert_eq!(record.is_weekend, 0);
        assert_eq!(record.rush_load, 0.0);
    }

    #[test]
    fn test_saturday_rush_load_equals_load_ratio() {
        let mut order = sample_order();
        order.order_date = NaiveDate::from_ymd_opt(2015, 2, 7).unwrap();

        let record = FeatureEngine::new().engineer(&order);

        assert_eq!(record.day_of_week, 5);
        assert_eq!(record.is_weekend, 1);
        assert_eq!(record.rush_load, record.load_ratio);
    }

    #[test]
    fn test_zero_onshift_partners_uses_unit_denominator() {
        let engine = FeatureEngine::new();
        for outstanding in [0, 1, 7, 250] {
            let mut order = sample_order();
            order.total_onshift_partners = 0;
            order.total_busy_partners = 3;
            order.total_outstanding_orders = outstanding;

            let record = engine.engineer(&order);

            assert_eq!(record.load_ratio, outstanding as f64);
            assert_eq!(record.busy_partners_ratio, 3.0);
        }
    }

    #[test]
    fn test_zero_total_items_does_not_fault() {
        let mut order = sample_order();
        order.total_items = 0;
        order.num_distinct_items = 0;

        let record = FeatureEngine::new().engineer(&order);

        assert_eq!(record.item_complexity, 0.0);
    }

    #[test]
    fn test_weekend_flag_over_three_weeks() {
        let engine = FeatureEngine::new();
        // 2015-02-02 is a Monday
        let start = NaiveDate::from_ymd_opt(2015, 2, 2).unwrap();

        for offset in 0..21 {
            let mut order = sample_order();
            order.order_date = start + chrono::Duration::days(offset);

            let record = engine.engineer(&order);
            let expected_weekend = matches!(offset % 7, 5 | 6);

            assert_eq!(record.day_of_week, (offset % 7) as u32);
            assert_eq!(record.is_weekend == 1, expected_weekend, "offset {}", offset);
            if record.is_weekend == 0 {
                assert_eq!(record.rush_load, 0.0);
            }
        }
    }

    #[test]
    fn test_numeric_features_order() {
        let record = FeatureEngine::new().engineer(&sample_order());
        let names: Vec<&str> = record.numeric_features().iter().map(|(n, _)| *n).collect();

        assert_eq!(names.len(), RAW_NUMERIC_FEATURES.len() + ENGINEERED_FEATURES.len());
        assert_eq!(names[0], "total_items");
        assert_eq!(names[names.len() - 1], "rush_load");
    }
}
