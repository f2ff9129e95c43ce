//! Reporting store interface.
//!
//! Every mutation happens through a [`ReportingTransaction`]. Dropping a
//! transaction without committing discards its changes.

use crate::models::{
    BillingDateTime, Category, Discount, Fact, NewDiscount, NewFact, NewProduct, NewQuery,
    Product, Query, Tenant,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

/// Result of an "ensure": the existing row, or the one just inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensured<T> {
    pub row: T,
    pub created: bool,
}

impl<T> Ensured<T> {
    pub fn created(row: T) -> Self {
        Self { row, created: true }
    }

    pub fn existing(row: T) -> Self {
        Self {
            row,
            created: false,
        }
    }
}

#[async_trait]
pub trait ReportingStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn ReportingTransaction>, AppError>;
}

#[async_trait]
pub trait ReportingTransaction: Send {
    async fn ensure_tenant(&mut self, source: &str) -> Result<Tenant, AppError>;

    async fn ensure_category(&mut self, source: &str) -> Result<Category, AppError>;

    /// Ensure the date-time row of the day containing `timestamp`.
    async fn ensure_date_time(
        &mut self,
        timestamp: DateTime<Utc>,
    ) -> Result<BillingDateTime, AppError>;

    /// All products with exactly this source, any validity.
    async fn products_by_source(&mut self, source: &str) -> Result<Vec<Product>, AppError>;

    /// All discounts with exactly this source, any validity.
    async fn discounts_by_source(&mut self, source: &str) -> Result<Vec<Discount>, AppError>;

    async fn query_by_name(&mut self, name: &str) -> Result<Option<Query>, AppError>;

    /// Insert the fact unless one with the same dimensions exists.
    async fn ensure_fact(&mut self, fact: &NewFact) -> Result<Ensured<Fact>, AppError>;

    /// Seed a product, keyed by source and start of validity.
    async fn ensure_product(&mut self, product: &NewProduct) -> Result<Product, AppError>;

    /// Seed a discount, keyed by source and start of validity.
    async fn ensure_discount(&mut self, discount: &NewDiscount) -> Result<Discount, AppError>;

    /// Seed a query, keyed by name.
    async fn ensure_query(&mut self, query: &NewQuery) -> Result<Query, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
