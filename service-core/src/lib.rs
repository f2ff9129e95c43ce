//! service-core: Shared infrastructure for the usage collectors.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use tracing;
