//! Core types and services for the Varia experiment engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! services here (registry, assignment engine, recorder, aggregator,
//! rebalancer) are generic over an [`store::ExperimentStore`] backend.

pub mod assignment;
pub mod clock;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod random;
pub mod rebalance;
pub mod recorder;
pub mod registry;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
