//! Privacy Budget Service (PBS) core library.
//!
//! PBS coordinates per-key rate limits ("privacy budgets") on behalf of a
//! distributed measurement pipeline. This crate implements the request
//! serving front end, the transactional budget-consumption engine that backs
//! it, and the concurrency infrastructure (executor, queues, maps, buffers)
//! the rest of the service is built on.

pub mod authz;
pub mod budget;
pub mod concurrency;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod frontend;
pub mod health;
pub mod http;
pub mod lease;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod transactions;

pub use error::{ErrorKind, PbsError};
