//! Streaming cleaning and incremental aggregation engine.
//!
//! Batch path: [`source::RecordSource`] → [`validate::Validator`] →
//! [`derive::Deriver`] → [`aggregate::AggregateSet`], driven by
//! [`build::run_build`]. Interactive path: [`query::QueryEngine`] over an
//! immutable [`snapshot::Snapshot`].

pub mod aggregate;
pub mod batch;
pub mod build;
pub mod config;
pub mod derive;
pub mod query;
pub mod snapshot;
pub mod source;
pub mod validate;
