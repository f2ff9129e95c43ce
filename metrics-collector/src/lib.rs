pub mod aggregate;
pub mod catalog;
pub mod clients;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod services;
pub mod startup;

pub use error::BillingError;
