//! Reference data seeded into the reporting store before a run.

use crate::models::{start_of_day, NewDiscount, NewProduct, NewQuery, ObjectType, SourceString};
use crate::normalize::{QueryUnit, UNIT_GB_DAY, UNIT_INSTANCES};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::path::Path;

/// Whether a bucket without an applicable discount may still be billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountPolicy {
    /// A missing discount fails the bucket.
    #[default]
    Required,
    /// A missing discount records the fact without one.
    Optional,
}

/// Products, discounts and the query of one object type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEntry {
    pub products: Vec<NewProduct>,
    #[serde(default)]
    pub discounts: Vec<NewDiscount>,
    pub query: NewQuery,
}

/// Immutable object type → reference data table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BillingCatalog {
    #[serde(default)]
    pub discount_policy: DiscountPolicy,
    pub entries: BTreeMap<ObjectType, CatalogEntry>,
}

const DBAAS_PLANS: [(&str, i64); 4] = [
    ("hobbyist-2", 1_090),
    ("startup-4", 5_210),
    ("business-8", 16_800),
    ("premium-16", 47_300),
];

impl BillingCatalog {
    /// Built-in catalog: object storage per GB-day, database services per
    /// instance and plan, no discount.
    pub fn exoscale_default() -> Self {
        let valid_from = NaiveDate::from_ymd_opt(2022, 1, 1)
            .map(start_of_day)
            .unwrap_or_default();

        let mut entries = BTreeMap::new();

        let storage = SourceString::new(ObjectType::ObjectStorage, "");
        entries.insert(
            ObjectType::ObjectStorage,
            CatalogEntry {
                products: vec![NewProduct {
                    source: storage.source(),
                    target: Some("1402".to_string()),
                    amount: Decimal::new(726, 6),
                    unit: UNIT_GB_DAY.to_string(),
                    during_from: valid_from,
                    during_to: None,
                }],
                discounts: vec![NewDiscount {
                    source: storage.source(),
                    discount: Decimal::ZERO,
                    during_from: valid_from,
                    during_to: None,
                }],
                query: NewQuery {
                    name: storage.query_name(),
                    description: "Object Storage - Storage (exoscale.com)".to_string(),
                    query: String::new(),
                    unit: UNIT_GB_DAY.to_string(),
                },
            },
        );

        for object_type in ObjectType::DBAAS {
            let sources: Vec<SourceString> = DBAAS_PLANS
                .iter()
                .map(|(plan, _)| SourceString::new(object_type, plan))
                .collect();
            let products = sources
                .iter()
                .zip(DBAAS_PLANS)
                .map(|(source, (_, price))| NewProduct {
                    source: source.source(),
                    target: None,
                    amount: Decimal::new(price, 4),
                    unit: UNIT_INSTANCES.to_string(),
                    during_from: valid_from,
                    during_to: None,
                })
                .collect();
            let discounts = sources
                .iter()
                .map(|source| NewDiscount {
                    source: source.source(),
                    discount: Decimal::ZERO,
                    during_from: valid_from,
                    during_to: None,
                })
                .collect();
            entries.insert(
                object_type,
                CatalogEntry {
                    products,
                    discounts,
                    query: NewQuery {
                        name: SourceString::new(object_type, "").query_name(),
                        description: format!(
                            "Database service {} (exoscale.com)",
                            object_type.service_type()
                        ),
                        query: String::new(),
                        unit: UNIT_INSTANCES.to_string(),
                    },
                },
            );
        }

        Self {
            discount_policy: DiscountPolicy::Required,
            entries,
        }
    }

    /// Load a catalog file (any format the `config` crate reads).
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let catalog: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn entry(&self, object_type: ObjectType) -> Option<&CatalogEntry> {
        self.entries.get(&object_type)
    }

    /// Check that every entry is internally consistent.
    pub fn validate(&self) -> Result<(), AppError> {
        for (object_type, entry) in &self.entries {
            let unit: QueryUnit = entry
                .query
                .unit
                .parse()
                .map_err(|e: String| {
                    AppError::ConfigError(anyhow::anyhow!("{}: {}", object_type, e))
                })?;
            if unit.measure() != object_type.measure() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{}: query unit {} does not fit {} usage",
                    object_type,
                    entry.query.unit,
                    object_type.measure()
                )));
            }
            let prefix = format!("{}:", object_type.as_str());
            let foreign = entry
                .products
                .iter()
                .map(|p| &p.source)
                .chain(entry.discounts.iter().map(|d| &d.source))
                .find(|source| !source.starts_with(&prefix));
            if let Some(source) = foreign {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{}: source {} belongs to another object type",
                    object_type,
                    source
                )));
            }
        }
        Ok(())
    }
}
