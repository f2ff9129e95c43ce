//! Reporting store rows: dimensions, reference data and facts.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant dimension, keyed by organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub source: String,
    pub target: Option<String>,
}

/// Category dimension, keyed by `provider:namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub source: String,
    pub target: Option<String>,
}

/// Date-time dimension. The timestamp is truncated to the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BillingDateTime {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
}

impl BillingDateTime {
    /// Build an unsaved row for the day containing `timestamp`.
    pub fn for_timestamp(timestamp: DateTime<Utc>) -> Self {
        let timestamp = truncate_to_day(timestamp);
        Self {
            id: Uuid::new_v4(),
            timestamp,
            year: timestamp.year(),
            month: timestamp.month() as i32,
            day: timestamp.day() as i32,
            hour: timestamp.hour() as i32,
        }
    }
}

/// Midnight UTC of the given day.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub fn truncate_to_day(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(timestamp.date_naive())
}

/// Billable product with a price and validity window `[during_from, during_to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub source: String,
    pub target: Option<String>,
    pub amount: Decimal,
    pub unit: String,
    pub during_from: DateTime<Utc>,
    pub during_to: Option<DateTime<Utc>>,
}

/// Discount fraction with a validity window `[during_from, during_to)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Discount {
    pub id: Uuid,
    pub source: String,
    pub discount: Decimal,
    pub during_from: DateTime<Utc>,
    pub during_to: Option<DateTime<Utc>>,
}

/// Named usage query with the unit its quantities are expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Query {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub query: String,
    pub unit: String,
}

/// Billing fact, unique per dimension tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Fact {
    pub id: Uuid,
    pub date_time_id: Uuid,
    pub query_id: Uuid,
    pub tenant_id: Uuid,
    pub category_id: Uuid,
    pub product_id: Uuid,
    pub discount_id: Option<Uuid>,
    pub quantity: f64,
}

/// Input for seeding a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub source: String,
    #[serde(default)]
    pub target: Option<String>,
    pub amount: Decimal,
    pub unit: String,
    pub during_from: DateTime<Utc>,
    #[serde(default)]
    pub during_to: Option<DateTime<Utc>>,
}

/// Input for seeding a discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDiscount {
    pub source: String,
    pub discount: Decimal,
    pub during_from: DateTime<Utc>,
    #[serde(default)]
    pub during_to: Option<DateTime<Utc>>,
}

/// Input for seeding a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuery {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub query: String,
    pub unit: String,
}

/// Input for ensuring a fact.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
    pub date_time_id: Uuid,
    pub query_id: Uuid,
    pub tenant_id: Uuid,
    pub category_id: Uuid,
    pub product_id: Uuid,
    pub discount_id: Option<Uuid>,
    pub quantity: f64,
}

impl NewFact {
    /// Whether `fact` has the same dimension tuple.
    pub fn same_dimensions(&self, fact: &Fact) -> bool {
        self.date_time_id == fact.date_time_id
            && self.query_id == fact.query_id
            && self.tenant_id == fact.tenant_id
            && self.category_id == fact.category_id
            && self.product_id == fact.product_id
            && self.discount_id == fact.discount_id
    }
}
