//! immostat: streaming cleaning and incremental aggregation of French
//! real-estate transactions (DVF).
//!
//! This crate re-exports the workspace crates and hosts the command-line
//! front end.

pub mod cli;
pub mod logging;

pub use immostat_config as config;
pub use immostat_engine as engine;
pub use immostat_geo as geo;
pub use immostat_io as io;
pub use immostat_storage as storage;
pub use immostat_types as types;
