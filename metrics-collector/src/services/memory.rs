//! In-process reporting store used for dry runs.
//!
//! A transaction works on a private copy of the data; commit publishes the
//! copy, drop or rollback discards it. Transactions are expected to run one at
//! a time, which is how the billing run uses them.

use crate::models::{
    BillingDateTime, Category, Discount, Fact, NewDiscount, NewFact, NewProduct, NewQuery,
    Product, Query, Tenant,
};
use crate::services::store::{Ensured, ReportingStore, ReportingTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Committed contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportingData {
    pub tenants: Vec<Tenant>,
    pub categories: Vec<Category>,
    pub date_times: Vec<BillingDateTime>,
    pub products: Vec<Product>,
    pub discounts: Vec<Discount>,
    pub queries: Vec<Query>,
    pub facts: Vec<Fact>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<ReportingData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed data.
    pub fn snapshot(&self) -> Result<ReportingData, AppError> {
        Ok(lock(&self.data)?.clone())
    }
}

fn lock(data: &Mutex<ReportingData>) -> Result<MutexGuard<'_, ReportingData>, AppError> {
    data.lock()
        .map_err(|_| AppError::DatabaseError(anyhow::anyhow!("Reporting data lock poisoned")))
}

#[async_trait]
impl ReportingStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn ReportingTransaction>, AppError> {
        let staged = lock(&self.data)?.clone();
        Ok(Box::new(MemoryTransaction {
            committed: self.data.clone(),
            staged,
        }))
    }
}

pub struct MemoryTransaction {
    committed: Arc<Mutex<ReportingData>>,
    staged: ReportingData,
}

#[async_trait]
impl ReportingTransaction for MemoryTransaction {
    async fn ensure_tenant(&mut self, source: &str) -> Result<Tenant, AppError> {
        if let Some(tenant) = self.staged.tenants.iter().find(|t| t.source == source) {
            return Ok(tenant.clone());
        }
        let tenant = Tenant {
            id: Uuid::new_v4(),
            source: source.to_string(),
            target: None,
        };
        self.staged.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn ensure_category(&mut self, source: &str) -> Result<Category, AppError> {
        if let Some(category) = self.staged.categories.iter().find(|c| c.source == source) {
            return Ok(category.clone());
        }
        let category = Category {
            id: Uuid::new_v4(),
            source: source.to_string(),
            target: None,
        };
        self.staged.categories.push(category.clone());
        Ok(category)
    }

    async fn ensure_date_time(
        &mut self,
        timestamp: DateTime<Utc>,
    ) -> Result<BillingDateTime, AppError> {
        let row = BillingDateTime::for_timestamp(timestamp);
        if let Some(existing) = self
            .staged
            .date_times
            .iter()
            .find(|d| d.timestamp == row.timestamp)
        {
            return Ok(existing.clone());
        }
        self.staged.date_times.push(row.clone());
        Ok(row)
    }

    async fn products_by_source(&mut self, source: &str) -> Result<Vec<Product>, AppError> {
        Ok(self
            .staged
            .products
            .iter()
            .filter(|p| p.source == source)
            .cloned()
            .collect())
    }

    async fn discounts_by_source(&mut self, source: &str) -> Result<Vec<Discount>, AppError> {
        Ok(self
            .staged
            .discounts
            .iter()
            .filter(|d| d.source == source)
            .cloned()
            .collect())
    }

    async fn query_by_name(&mut self, name: &str) -> Result<Option<Query>, AppError> {
        Ok(self.staged.queries.iter().find(|q| q.name == name).cloned())
    }

    async fn ensure_fact(&mut self, fact: &NewFact) -> Result<Ensured<Fact>, AppError> {
        if let Some(existing) = self.staged.facts.iter().find(|f| fact.same_dimensions(f)) {
            return Ok(Ensured::existing(existing.clone()));
        }
        let created = Fact {
            id: Uuid::new_v4(),
            date_time_id: fact.date_time_id,
            query_id: fact.query_id,
            tenant_id: fact.tenant_id,
            category_id: fact.category_id,
            product_id: fact.product_id,
            discount_id: fact.discount_id,
            quantity: fact.quantity,
        };
        self.staged.facts.push(created.clone());
        Ok(Ensured::created(created))
    }

    async fn ensure_product(&mut self, product: &NewProduct) -> Result<Product, AppError> {
        if let Some(existing) = self
            .staged
            .products
            .iter()
            .find(|p| p.source == product.source && p.during_from == product.during_from)
        {
            return Ok(existing.clone());
        }
        let created = Product {
            id: Uuid::new_v4(),
            source: product.source.clone(),
            target: product.target.clone(),
            amount: product.amount,
            unit: product.unit.clone(),
            during_from: product.during_from,
            during_to: product.during_to,
        };
        self.staged.products.push(created.clone());
        Ok(created)
    }

    async fn ensure_discount(&mut self, discount: &NewDiscount) -> Result<Discount, AppError> {
        if let Some(existing) = self
            .staged
            .discounts
            .iter()
            .find(|d| d.source == discount.source && d.during_from == discount.during_from)
        {
            return Ok(existing.clone());
        }
        let created = Discount {
            id: Uuid::new_v4(),
            source: discount.source.clone(),
            discount: discount.discount,
            during_from: discount.during_from,
            during_to: discount.during_to,
        };
        self.staged.discounts.push(created.clone());
        Ok(created)
    }

    async fn ensure_query(&mut self, query: &NewQuery) -> Result<Query, AppError> {
        if let Some(existing) = self.staged.queries.iter().find(|q| q.name == query.name) {
            return Ok(existing.clone());
        }
        let created = Query {
            id: Uuid::new_v4(),
            name: query.name.clone(),
            description: query.description.clone(),
            query: query.query.clone(),
            unit: query.unit.clone(),
        };
        self.staged.queries.push(created.clone());
        Ok(created)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { committed, staged } = *self;
        let mut data = lock(&committed)?;
        *data = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}
