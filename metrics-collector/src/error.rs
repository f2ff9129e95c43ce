//! Failures that abort a single bucket without aborting the run.

use crate::models::Measure;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Dimension resolved by date-based best match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionKind {
    Product,
    Discount,
}

impl DimensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Product => "product",
            DimensionKind::Discount => "discount",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("malformed key {key:?}: {reason}")]
    MalformedKey { key: String, reason: String },

    #[error("no {kind} matches source {source_string} on {date}")]
    NoMatch {
        kind: DimensionKind,
        source_string: String,
        date: DateTime<Utc>,
    },

    #[error("query {0} not found")]
    QueryNotFound(String),

    #[error(
        "unsupported query unit {unit:?}{}",
        measure.map(|m| format!(" for {} usage", m)).unwrap_or_default()
    )]
    UnsupportedUnit {
        unit: String,
        /// Measurement of the usage, when known.
        measure: Option<Measure>,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] AppError),
}

impl BillingError {
    /// Stable label for metrics and log filtering.
    pub fn error_type(&self) -> &'static str {
        match self {
            BillingError::MalformedKey { .. } => "malformed_key",
            BillingError::NoMatch {
                kind: DimensionKind::Product,
                ..
            } => "no_product_match",
            BillingError::NoMatch {
                kind: DimensionKind::Discount,
                ..
            } => "no_discount_match",
            BillingError::QueryNotFound(_) => "query_not_found",
            BillingError::UnsupportedUnit { .. } => "unsupported_unit",
            BillingError::Persistence(_) => "persistence",
        }
    }
}
