//! Schema alignment: categorical encoding and reindexing to the model's
//! training-time column layout.
//!
//! The model only sees a positional vector, so the manifest is the single
//! source of truth for which column lands in which slot. Anything the
//! manifest does not name is dropped; anything it names that the request
//! did not produce is zero.

use crate::error::PipelineError;
use crate::feature_engine::EngineeredRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Categorical fields that are one-hot encoded, in encoding order.
pub const CATEGORICAL_FIELDS: [&str; 3] = ["market_id", "order_protocol", "store_primary_category"];

/// Ordered list of column names the model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureManifest {
    columns: Vec<String>,
}

impl FeatureManifest {
    /// Build a manifest, rejecting an empty list or duplicate names.
    pub fn new(columns: Vec<String>) -> Result<Self, PipelineError> {
        if columns.is_empty() {
            return Err(PipelineError::asset_load("feature manifest", "manifest is empty"));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(PipelineError::asset_load(
                    "feature manifest",
                    format!("duplicate column `{}`", column),
                ));
            }
        }

        Ok(Self { columns })
    }

    /// Parse a manifest from its JSON form (an array of column names).
    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        let columns: Vec<String> = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::asset_load("feature manifest", e))?;
        Self::new(columns)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Category values the manifest has a one-hot column for, sorted.
    ///
    /// The baseline value never appears here since it has no column.
    pub fn category_values(&self, field: &str) -> Vec<String> {
        let prefix = format!("{}_", field);
        let mut values: Vec<String> = self
            .columns
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix))
            .map(str::to_string)
            .collect();
        values.sort();
        values
    }
}

/// Training-time baseline (dropped) category for each categorical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryBaselines {
    pub market_id: String,
    pub order_protocol: String,
    pub store_primary_category: String,
}

impl CategoryBaselines {
    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::asset_load("category baselines", e))
    }

    pub fn baseline(&self, field: &str) -> Option<&str> {
        match field {
            "market_id" => Some(&self.market_id),
            "order_protocol" => Some(&self.order_protocol),
            "store_primary_category" => Some(&self.store_primary_category),
            _ => None,
        }
    }

    /// Fail if a baseline value has its own column in the manifest.
    ///
    /// A dropped category can never be encoded, so such a column means the
    /// baselines and the manifest come from different training runs.
    pub fn check_against(&self, manifest: &FeatureManifest) -> Result<(), PipelineError> {
        for field in CATEGORICAL_FIELDS {
            let baseline = self.baseline(field).unwrap_or_default();
            let column = encoded_column(field, baseline);
            if manifest.contains(&column) {
                return Err(PipelineError::asset_load(
                    "category baselines",
                    format!(
                        "baseline `{}` for `{}` is encoded as manifest column `{}`",
                        baseline, field, column
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn encoded_column(field: &str, value: &str) -> String {
    format!("{}_{}", field, value)
}

/// Fixed-width model input: one value per manifest column, in manifest order.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    manifest: Arc<FeatureManifest>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.manifest
            .columns()
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    /// (column, value) pairs in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.manifest
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Values narrowed to f32 for the ONNX input tensor.
    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// One-hot encodes categorical fields and reindexes to the manifest.
pub struct SchemaAligner {
    manifest: Arc<FeatureManifest>,
    baselines: CategoryBaselines,
}

impl SchemaAligner {
    pub fn new(manifest: Arc<FeatureManifest>, baselines: CategoryBaselines) -> Self {
        Self {
            manifest,
            baselines,
        }
    }

    pub fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    /// One-hot columns for the record's categorical values.
    ///
    /// A value equal to its field's baseline produces no column.
    pub fn encode_categoricals(&self, record: &EngineeredRecord) -> Vec<(String, f64)> {
        let values = [
            record.market_id.to_string(),
            record.order_protocol.to_string(),
            record.store_primary_category.clone(),
        ];

        CATEGORICAL_FIELDS
            .iter()
            .zip(values.iter())
            .filter(|(field, value)| self.baselines.baseline(field) != Some(value.as_str()))
            .map(|(field, value)| (encoded_column(field, value), 1.0))
            .collect()
    }

    /// Produce the model input for a record. Total: never fails.
    pub fn align(&self, record: &EngineeredRecord) -> FeatureVector {
        let mut merged: HashMap<String, f64> = record
            .numeric_features()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        merged.extend(self.encode_categoricals(record));

        let values: Vec<f64> = self
            .manifest
            .columns()
            .iter()
            .map(|column| merged.get(column).copied().unwrap_or(0.0))
            .collect();

        let discarded: Vec<&String> = merged.keys().filter(|k| !self.manifest.contains(k)).collect();
        if !discarded.is_empty() {
            debug!(columns = ?discarded, "Columns not in manifest discarded");
        }

        FeatureVector {
            manifest: self.manifest.clone(),
            values,
        }
    }
}
