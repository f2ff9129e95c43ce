//! PostgreSQL reporting store.

use crate::models::{
    BillingDateTime, Category, Discount, Fact, NewDiscount, NewFact, NewProduct, NewQuery,
    Product, Query, Tenant,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{Ensured, ReportingStore, ReportingTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "metrics-collector"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ReportingStore for Database {
    async fn begin(&self) -> Result<Box<dyn ReportingTransaction>, AppError> {
        let tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;
        Ok(Box::new(PgReportingTransaction { tx }))
    }
}

/// Open PostgreSQL transaction. Rolled back on drop unless committed.
pub struct PgReportingTransaction {
    tx: Transaction<'static, Postgres>,
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

#[async_trait]
impl ReportingTransaction for PgReportingTransaction {
    #[instrument(skip(self))]
    async fn ensure_tenant(&mut self, source: &str) -> Result<Tenant, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_tenant"])
            .start_timer();

        let existing = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, source, target
            FROM tenants
            WHERE source = $1
            "#,
        )
        .bind(source)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get tenant"))?;

        let tenant = match existing {
            Some(tenant) => tenant,
            None => sqlx::query_as::<_, Tenant>(
                r#"
                INSERT INTO tenants (id, source)
                VALUES ($1, $2)
                RETURNING id, source, target
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(source)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to create tenant"))?,
        };

        timer.observe_duration();

        Ok(tenant)
    }

    #[instrument(skip(self))]
    async fn ensure_category(&mut self, source: &str) -> Result<Category, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_category"])
            .start_timer();

        let existing = sqlx::query_as::<_, Category>(
            r#"
            SELECT id, source, target
            FROM categories
            WHERE source = $1
            "#,
        )
        .bind(source)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get category"))?;

        let category = match existing {
            Some(category) => category,
            None => sqlx::query_as::<_, Category>(
                r#"
                INSERT INTO categories (id, source)
                VALUES ($1, $2)
                RETURNING id, source, target
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(source)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to create category"))?,
        };

        timer.observe_duration();

        Ok(category)
    }

    #[instrument(skip(self))]
    async fn ensure_date_time(
        &mut self,
        timestamp: DateTime<Utc>,
    ) -> Result<BillingDateTime, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_date_time"])
            .start_timer();

        let row = BillingDateTime::for_timestamp(timestamp);

        let existing = sqlx::query_as::<_, BillingDateTime>(
            r#"
            SELECT id, timestamp, year, month, day, hour
            FROM date_times
            WHERE timestamp = $1
            "#,
        )
        .bind(row.timestamp)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get date time"))?;

        let date_time = match existing {
            Some(date_time) => date_time,
            None => sqlx::query_as::<_, BillingDateTime>(
                r#"
                INSERT INTO date_times (id, timestamp, year, month, day, hour)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, timestamp, year, month, day, hour
                "#,
            )
            .bind(row.id)
            .bind(row.timestamp)
            .bind(row.year)
            .bind(row.month)
            .bind(row.day)
            .bind(row.hour)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_error("Failed to create date time"))?,
        };

        timer.observe_duration();

        Ok(date_time)
    }

    #[instrument(skip(self))]
    async fn products_by_source(&mut self, source: &str) -> Result<Vec<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["products_by_source"])
            .start_timer();

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, source, target, amount, unit, during_from, during_to
            FROM products
            WHERE source = $1
            ORDER BY during_from, id
            "#,
        )
        .bind(source)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("Failed to list products"))?;

        timer.observe_duration();

        Ok(products)
    }

    #[instrument(skip(self))]
    async fn discounts_by_source(&mut self, source: &str) -> Result<Vec<Discount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["discounts_by_source"])
            .start_timer();

        let discounts = sqlx::query_as::<_, Discount>(
            r#"
            SELECT id, source, discount, during_from, during_to
            FROM discounts
            WHERE source = $1
            ORDER BY during_from, id
            "#,
        )
        .bind(source)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("Failed to list discounts"))?;

        timer.observe_duration();

        Ok(discounts)
    }

    #[instrument(skip(self))]
    async fn query_by_name(&mut self, name: &str) -> Result<Option<Query>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["query_by_name"])
            .start_timer();

        let query = sqlx::query_as::<_, Query>(
            r#"
            SELECT id, name, description, query, unit
            FROM queries
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get query"))?;

        timer.observe_duration();

        Ok(query)
    }

    #[instrument(skip(self, fact), fields(tenant_id = %fact.tenant_id, category_id = %fact.category_id))]
    async fn ensure_fact(&mut self, fact: &NewFact) -> Result<Ensured<Fact>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ensure_fact"])
            .start_timer();

        let existing = sqlx::query_as::<_, Fact>(
            r#"
            SELECT id, date_time_id, query_id, tenant_id, category_id, product_id, discount_id, quantity
            FROM facts
            WHERE date_time_id = $1
              AND query_id = $2
              AND tenant_id = $3
              AND category_id = $4
              AND product_id = $5
              AND discount_id IS NOT DISTINCT FROM $6
            "#,
        )
        .bind(fact.date_time_id)
        .bind(fact.query_id)
        .bind(fact.tenant_id)
        .bind(fact.category_id)
        .bind(fact.product_id)
        .bind(fact.discount_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get fact"))?;

        let ensured = match existing {
            Some(existing) => {
                debug!(fact_id = %existing.id, "Fact already recorded");
                Ensured::existing(existing)
            }
            None => {
                let created = sqlx::query_as::<_, Fact>(
                    r#"
                    INSERT INTO facts (id, date_time_id, query_id, tenant_id, category_id, product_id, discount_id, quantity)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    RETURNING id, date_time_id, query_id, tenant_id, category_id, product_id, discount_id, quantity
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(fact.date_time_id)
                .bind(fact.query_id)
                .bind(fact.tenant_id)
                .bind(fact.category_id)
                .bind(fact.product_id)
                .bind(fact.discount_id)
                .bind(fact.quantity)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(db_error("Failed to create fact"))?;
                info!(fact_id = %created.id, quantity = created.quantity, "Fact created");
                Ensured::created(created)
            }
        };

        timer.observe_duration();

        Ok(ensured)
    }

    #[instrument(skip(self, product), fields(source = %product.source))]
    async fn ensure_product(&mut self, product: &NewProduct) -> Result<Product, AppError> {
        let existing = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, source, target, amount, unit, during_from, during_to
            FROM products
            WHERE source = $1 AND during_from = $2
            "#,
        )
        .bind(&product.source)
        .bind(product.during_from)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get product"))?;

        if let Some(existing) = existing {
            return Ok(existing);
        }

        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, source, target, amount, unit, during_from, during_to)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, source, target, amount, unit, during_from, during_to
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&product.source)
        .bind(&product.target)
        .bind(product.amount)
        .bind(&product.unit)
        .bind(product.during_from)
        .bind(product.during_to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to create product"))
    }

    #[instrument(skip(self, discount), fields(source = %discount.source))]
    async fn ensure_discount(&mut self, discount: &NewDiscount) -> Result<Discount, AppError> {
        let existing = sqlx::query_as::<_, Discount>(
            r#"
            SELECT id, source, discount, during_from, during_to
            FROM discounts
            WHERE source = $1 AND during_from = $2
            "#,
        )
        .bind(&discount.source)
        .bind(discount.during_from)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get discount"))?;

        if let Some(existing) = existing {
            return Ok(existing);
        }

        sqlx::query_as::<_, Discount>(
            r#"
            INSERT INTO discounts (id, source, discount, during_from, during_to)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, source, discount, during_from, during_to
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&discount.source)
        .bind(discount.discount)
        .bind(discount.during_from)
        .bind(discount.during_to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to create discount"))
    }

    #[instrument(skip(self, query), fields(name = %query.name))]
    async fn ensure_query(&mut self, query: &NewQuery) -> Result<Query, AppError> {
        let existing = sqlx::query_as::<_, Query>(
            r#"
            SELECT id, name, description, query, unit
            FROM queries
            WHERE name = $1
            "#,
        )
        .bind(&query.name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error("Failed to get query"))?;

        if let Some(existing) = existing {
            return Ok(existing);
        }

        sqlx::query_as::<_, Query>(
            r#"
            INSERT INTO queries (id, name, description, query, unit)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, description, query, unit
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&query.name)
        .bind(&query.description)
        .bind(&query.query)
        .bind(&query.unit)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error("Failed to create query"))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to roll back transaction: {}", e))
        })
    }
}
