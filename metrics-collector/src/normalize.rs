//! Conversion of raw usage into the unit a query reports.

use crate::error::BillingError;
use crate::models::Measure;
use std::str::FromStr;

pub const UNIT_GB_DAY: &str = "GBDay";
pub const UNIT_INSTANCES: &str = "Instances";

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Units a query may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryUnit {
    /// Gibibytes stored over one billing day.
    GbDay,
    /// Running instances over one billing day.
    Instances,
}

impl QueryUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryUnit::GbDay => UNIT_GB_DAY,
            QueryUnit::Instances => UNIT_INSTANCES,
        }
    }

    /// Raw measurement this unit is converted from.
    pub fn measure(&self) -> Measure {
        match self {
            QueryUnit::GbDay => Measure::Bytes,
            QueryUnit::Instances => Measure::Instances,
        }
    }
}

impl FromStr for QueryUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            UNIT_GB_DAY => Ok(QueryUnit::GbDay),
            UNIT_INSTANCES => Ok(QueryUnit::Instances),
            _ => Err(format!("unknown query unit {}", s)),
        }
    }
}

/// Convert `raw` into `query_unit`, inferring the raw measurement from the unit.
pub fn normalize(raw: f64, query_unit: &str) -> Result<f64, BillingError> {
    let unit = parse_unit(query_unit, None)?;
    Ok(convert(raw, unit))
}

/// Convert `raw`, measured as `measure`, into `query_unit`. Fails when the unit
/// is unknown or cannot be derived from that measurement.
pub fn normalize_measured(raw: f64, measure: Measure, query_unit: &str) -> Result<f64, BillingError> {
    let unit = parse_unit(query_unit, Some(measure))?;
    if unit.measure() != measure {
        return Err(BillingError::UnsupportedUnit {
            unit: query_unit.to_string(),
            measure: Some(measure),
        });
    }
    Ok(convert(raw, unit))
}

fn parse_unit(query_unit: &str, measure: Option<Measure>) -> Result<QueryUnit, BillingError> {
    query_unit
        .parse::<QueryUnit>()
        .map_err(|_| BillingError::UnsupportedUnit {
            unit: query_unit.to_string(),
            measure,
        })
}

fn convert(raw: f64, unit: QueryUnit) -> f64 {
    match unit {
        QueryUnit::GbDay => raw / BYTES_PER_GIB,
        QueryUnit::Instances => raw,
    }
}
