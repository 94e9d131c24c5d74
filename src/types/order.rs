//! Order request data structures for delivery time estimation

use crate::error::PipelineError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Identifier values the model was trained on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLimits {
    /// Allowed market identifiers
    #[serde(default = "default_market_ids")]
    pub market_ids: Vec<i64>,
    /// Allowed order-protocol identifiers
    #[serde(default = "default_order_protocols")]
    pub order_protocols: Vec<i64>,
}

fn default_market_ids() -> Vec<i64> {
    (1..=6).collect()
}

fn default_order_protocols() -> Vec<i64> {
    (1..=7).collect()
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            market_ids: default_market_ids(),
            order_protocols: default_order_protocols(),
        }
    }
}

/// An order submitted for a delivery duration estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-supplied correlation id (generated when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Market (city/region) identifier
    pub market_id: i64,

    /// How the order was placed (app, phone, partner integration, ...)
    pub order_protocol: i64,

    /// Primary cuisine/category of the store
    pub store_primary_category: String,

    /// Total item count
    pub total_items: i64,

    /// Distinct item count
    pub num_distinct_items: i64,

    /// Order subtotal
    pub subtotal: f64,

    /// Cheapest item price
    pub min_item_price: f64,

    /// Most expensive item price
    pub max_item_price: f64,

    /// Delivery partners on shift at order time
    pub total_onshift_partners: i64,

    /// Delivery partners busy with another order at order time
    pub total_busy_partners: i64,

    /// Orders in flight at order time
    pub total_outstanding_orders: i64,

    /// Order date (YYYY-MM-DD)
    pub order_date: NaiveDate,

    /// Order time of day (HH:MM:SS)
    pub order_time: NaiveTime,
}

impl OrderRequest {
    /// Combined order timestamp
    pub fn timestamp(&self) -> NaiveDateTime {
        self.order_date.and_time(self.order_time)
    }

    /// Check every field against its input constraint.
    ///
    /// The first violated field is reported.
    pub fn validate(&self, limits: &InputLimits) -> Result<(), PipelineError> {
        if !limits.market_ids.contains(&self.market_id) {
            return Err(PipelineError::invalid_input(
                "market_id",
                format!("{} is not one of {:?}", self.market_id, limits.market_ids),
            ));
        }
        if !limits.order_protocols.contains(&self.order_protocol) {
            return Err(PipelineError::invalid_input(
                "order_protocol",
                format!("{} is not one of {:?}", self.order_protocol, limits.order_protocols),
            ));
        }
        if self.store_primary_category.trim().is_empty() {
            return Err(PipelineError::invalid_input(
                "store_primary_category",
                "must not be empty",
            ));
        }
        if self.total_items < 1 {
            return Err(PipelineError::invalid_input("total_items", "must be at least 1"));
        }
        if self.num_distinct_items < 1 {
            return Err(PipelineError::invalid_input("num_distinct_items", "must be at least 1"));
        }
        if self.num_distinct_items > self.total_items {
            return Err(PipelineError::invalid_input(
                "num_distinct_items",
                format!(
                    "{} distinct items exceeds {} total items",
                    self.num_distinct_items, self.total_items
                ),
            ));
        }

        for (field, value) in [
            ("subtotal", self.subtotal),
            ("min_item_price", self.min_item_price),
            ("max_item_price", self.max_item_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::invalid_input(
                    field,
                    "must be a finite non-negative amount",
                ));
            }
        }
        if self.min_item_price > self.max_item_price {
            return Err(PipelineError::invalid_input(
                "min_item_price",
                "must not exceed max_item_price",
            ));
        }

        for (field, value) in [
            ("total_onshift_partners", self.total_onshift_partners),
            ("total_busy_partners", self.total_busy_partners),
            ("total_outstanding_orders", self.total_outstanding_orders),
        ] {
            if value < 0 {
                return Err(PipelineError::invalid_input(field, "must not be negative"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Reference order: Friday 2015-02-06 22:24.
    pub fn sample_order() -> OrderRequest {
        OrderRequest {
            request_id: Some("req_001".to_string()),
            market_id: 1,
            order_protocol: 1,
            store_primary_category: "1".to_string(),
            total_items: 4,
            num_distinct_items: 3,
            subtotal: 2200.0,
            min_item_price: 500.0,
            max_item_price: 900.0,
            total_onshift_partners: 30,
            total_busy_partners: 25,
            total_outstanding_orders: 60,
            order_date: NaiveDate::from_ymd_opt(2015, 2, 6).unwrap(),
            order_time: NaiveTime::from_hms_opt(22, 24, 0).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::sample_order;
    use super::*;

    fn rejected_field(order: &OrderRequest) -> String {
        match order.validate(&InputLimits::default()) {
            Err(PipelineError::InvalidInput { field, .. }) => field,
            other => panic!("expected invalid input, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_order_is_valid() {
        assert!(sample_order().validate(&InputLimits::default()).is_ok());
    }

    #[test]
    fn test_rejects_distinct_items_above_total() {
        let mut order = sample_order();
        order.num_distinct_items = 5;
        assert_eq!(rejected_field(&order), "num_distinct_items");
    }

    #[test]
    fn test_rejects_negative_counts_and_amounts() {
        let mut order = sample_order();
        order.total_busy_partners = -1;
        assert_eq!(rejected_field(&order), "total_busy_partners");

        let mut order = sample_order();
        order.subtotal = -10.0;
        assert_eq!(rejected_field(&order), "subtotal");

        let mut order = sample_order();
        order.max_item_price = f64::NAN;
        assert_eq!(rejected_field(&order), "max_item_price");
    }

    #[test]
    fn test_rejects_zero_items_and_inverted_prices() {
        let mut order = sample_order();
        order.total_items = 0;
        assert_eq!(rejected_field(&order), "total_items");

        let mut order = sample_order();
        order.min_item_price = 1000.0;
        assert_eq!(rejected_field(&order), "min_item_price");
    }

    #[test]
    fn test_rejects_identifiers_outside_known_sets() {
        let mut order = sample_order();
        order.market_id = 42;
        assert_eq!(rejected_field(&order), "market_id");

        let mut order = sample_order();
        order.order_protocol = 99;
        assert_eq!(rejected_field(&order), "order_protocol");

        let mut order = sample_order();
        order.market_id = 0;
        assert_eq!(rejected_field(&order), "market_id");

        let mut order = sample_order();
        order.market_id = 6;
        order.order_protocol = 7;
        assert!(order.validate(&InputLimits::default()).is_ok());
    }

    #[test]
    fn test_custom_limits_narrow_accepted_markets() {
        let limits = InputLimits {
            market_ids: vec![2, 3],
            order_protocols: vec![1],
        };
        let mut order = sample_order();

        assert!(order.validate(&limits).is_err());
        order.market_id = 3;
        assert!(order.validate(&limits).is_ok());
    }

    #[test]
    fn test_zero_onshift_partners_is_valid() {
        let mut order = sample_order();
        order.total_onshift_partners = 0;
        order.total_busy_partners = 0;
        assert!(order.validate(&InputLimits::default()).is_ok());
    }

    #[test]
    fn test_order_deserialization() {
        let json = r#"{
            "market_id": 2,
            "order_protocol": 3,
            "store_primary_category": "mexican",
            "total_items": 2,
            "num_distinct_items": 2,
            "subtotal": 1500,
            "min_item_price": 600,
            "max_item_price": 900,
            "total_onshift_partners": 10,
            "total_busy_partners": 8,
            "total_outstanding_orders": 12,
            "order_date": "2015-02-07",
            "order_time": "12:30:00"
        }"#;

        let order: OrderRequest = serde_json::from_str(json).unwrap();

        assert_eq!(order.request_id, None);
        assert_eq!(order.store_primary_category, "mexican");
        assert_eq!(
            order.timestamp(),
            NaiveDate::from_ymd_opt(2015, 2, 7)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap()
        );
    }
}
