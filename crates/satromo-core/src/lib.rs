pub mod completed;
pub mod compute;
pub mod config;
pub mod context;
pub mod empty_dates;
pub mod error;
pub mod generation;
pub mod io;
pub mod job;
pub mod ledger;
pub mod paths;
pub mod pipeline;
pub mod product;
pub mod product_status;
pub mod readiness;
pub mod reconcile;
pub mod region;
pub mod table;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, SatromoError};
