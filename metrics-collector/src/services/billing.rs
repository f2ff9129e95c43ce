//! Per-bucket fact persistence and the billing run around it.

use crate::catalog::{BillingCatalog, DiscountPolicy};
use crate::error::{BillingError, DimensionKind};
use crate::models::{start_of_day, Aggregated, Fact, Key, NewFact, ObjectType, SourceString, PROVIDER};
use crate::normalize::normalize_measured;
use crate::resolver::{resolve_discount, resolve_product, DiscountMatch};
use crate::services::observer::RunObserver;
use crate::services::store::{ReportingStore, ReportingTransaction};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Fact recorded for one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketOutcome {
    pub object_type: ObjectType,
    pub fact: Fact,
    /// False when an identical fact already existed.
    pub created: bool,
}

/// A bucket that could not be saved.
#[derive(Debug, Clone, Serialize)]
pub struct BucketFailure {
    pub key: Key,
    pub organization: String,
    pub value: f64,
    pub error_type: &'static str,
    pub error: String,
}

/// Summary of a billing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub attempted: usize,
    pub created: usize,
    pub reused: usize,
    pub failures: Vec<BucketFailure>,
    /// Buckets skipped because the run was cancelled.
    pub not_attempted: usize,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.created + self.reused
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.not_attempted == 0
    }
}

/// Records aggregated usage as billing facts for one billing date.
pub struct UsageRecorder {
    store: Arc<dyn ReportingStore>,
    catalog: Arc<BillingCatalog>,
    billing_date: DateTime<Utc>,
    observer: Arc<dyn RunObserver>,
}

impl UsageRecorder {
    pub fn new(
        store: Arc<dyn ReportingStore>,
        catalog: Arc<BillingCatalog>,
        billing_date: NaiveDate,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            store,
            catalog,
            billing_date: start_of_day(billing_date),
            observer,
        }
    }

    pub fn billing_date(&self) -> DateTime<Utc> {
        self.billing_date
    }

    /// Ensure every catalog product, discount and query exists, in one
    /// transaction.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        let seeded = seed_catalog(tx.as_mut(), &self.catalog).await;
        match seeded {
            Ok(()) => tx.commit().await?,
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Failed to roll back catalog initialization");
                }
                return Err(e);
            }
        }
        info!(object_types = self.catalog.entries.len(), "Billing catalog initialized");
        Ok(())
    }

    /// Save every bucket, one transaction each. Failures are reported, not
    /// raised; cancellation stops before the next bucket.
    pub async fn save_usage(
        &self,
        buckets: &BTreeMap<Key, Aggregated>,
        cancel: &CancellationToken,
    ) -> RunReport {
        if buckets.is_empty() {
            info!("No usage buckets to save");
            return RunReport::default();
        }
        self.observer.run_started(self.billing_date, buckets.len());

        let mut report = RunReport::default();
        let mut pending = buckets.values();
        while let Some(bucket) = pending.next() {
            if cancel.is_cancelled() {
                let skipped: Vec<&Aggregated> = std::iter::once(bucket).chain(pending).collect();
                report.not_attempted = skipped.len();
                self.observer.run_cancelled(&skipped);
                break;
            }

            report.attempted += 1;
            match self.ensure_bucket_usage(bucket).await {
                Ok(outcome) => {
                    if outcome.created {
                        report.created += 1;
                    } else {
                        report.reused += 1;
                    }
                    self.observer.bucket_persisted(
                        bucket,
                        outcome.object_type,
                        &outcome.fact,
                        outcome.created,
                    );
                }
                Err(e) => {
                    self.observer.bucket_failed(bucket, &e);
                    report.failures.push(BucketFailure {
                        key: bucket.key.clone(),
                        organization: bucket.organization.clone(),
                        value: bucket.value,
                        error_type: e.error_type(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.observer.run_finished(&report);
        report
    }

    /// Save one bucket. Either every row it needs is committed, or none is.
    #[instrument(skip(self, bucket), fields(key = %bucket.key, organization = %bucket.organization))]
    pub async fn ensure_bucket_usage(
        &self,
        bucket: &Aggregated,
    ) -> Result<BucketOutcome, BillingError> {
        let mut tx = self.store.begin().await?;
        match self.persist_bucket(tx.as_mut(), bucket).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Failed to roll back bucket transaction");
                }
                Err(e)
            }
        }
    }

    async fn persist_bucket(
        &self,
        tx: &mut dyn ReportingTransaction,
        bucket: &Aggregated,
    ) -> Result<BucketOutcome, BillingError> {
        let parts = bucket.key.decode()?;
        let object_type = ObjectType::from_service_type(&parts.resource_type).ok_or_else(|| {
            BillingError::MalformedKey {
                key: bucket.key.to_string(),
                reason: format!("unknown resource type {}", parts.resource_type),
            }
        })?;
        let namespace = parts.namespace.as_str();

        info!(
            namespace = %namespace,
            object_type = %object_type,
            value = bucket.value,
            "Saving usage for namespace"
        );

        let tenant = tx.ensure_tenant(&bucket.organization).await?;
        let category = tx
            .ensure_category(&format!("{}:{}", PROVIDER, namespace))
            .await?;
        let date_time = tx.ensure_date_time(self.billing_date).await?;

        let source = SourceString::new(object_type, &parts.plan);
        let source_string = source.source();

        let products = tx.products_by_source(&source_string).await?;
        let product = resolve_product(&products, &source_string, self.billing_date)?;

        let discounts = tx.discounts_by_source(&source_string).await?;
        let discount_id = match resolve_discount(&discounts, &source_string, self.billing_date) {
            DiscountMatch::Matched(discount) => Some(discount.id),
            DiscountMatch::NoneApplies => match self.catalog.discount_policy {
                DiscountPolicy::Optional => None,
                DiscountPolicy::Required => {
                    return Err(BillingError::NoMatch {
                        kind: DimensionKind::Discount,
                        source_string,
                        date: self.billing_date,
                    })
                }
            },
        };

        let query_name = source.query_name();
        let query = tx
            .query_by_name(&query_name)
            .await?
            .ok_or(BillingError::QueryNotFound(query_name))?;

        let quantity = normalize_measured(bucket.value, object_type.measure(), &query.unit)?;

        let ensured = tx
            .ensure_fact(&NewFact {
                date_time_id: date_time.id,
                query_id: query.id,
                tenant_id: tenant.id,
                category_id: category.id,
                product_id: product.id,
                discount_id,
                quantity,
            })
            .await?;

        Ok(BucketOutcome {
            object_type,
            fact: ensured.row,
            created: ensured.created,
        })
    }
}

async fn seed_catalog(
    tx: &mut dyn ReportingTransaction,
    catalog: &BillingCatalog,
) -> Result<(), AppError> {
    for entry in catalog.entries.values() {
        for product in &entry.products {
            tx.ensure_product(product).await?;
        }
        for discount in &entry.discounts {
            tx.ensure_discount(discount).await?;
        }
        tx.ensure_query(&entry.query).await?;
    }
    Ok(())
}
