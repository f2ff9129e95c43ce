//! Domain models for metrics-collector.

pub mod key;
pub mod object_type;
pub mod reporting;
pub mod usage;

pub use key::{decode_token, Key, KeyParts, KEY_DELIMITER};
pub use object_type::{Measure, ObjectType, SourceString, PROVIDER, STORAGE_PLAN};
pub use reporting::{
    start_of_day, truncate_to_day, BillingDateTime, Category, Discount, Fact, NewDiscount,
    NewFact, NewProduct, NewQuery, Product, Query, Tenant,
};
pub use usage::{Aggregated, Detail, ManagedResource, UsageRecord};
