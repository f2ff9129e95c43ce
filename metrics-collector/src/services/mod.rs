pub mod billing;
pub mod database;
pub mod memory;
pub mod metrics;
pub mod observer;
pub mod store;

pub use billing::{BucketFailure, BucketOutcome, RunReport, UsageRecorder};
pub use database::Database;
pub use memory::{MemoryStore, ReportingData};
pub use observer::{RunObserver, TracingObserver};
pub use store::{Ensured, ReportingStore, ReportingTransaction};
