//! Core types shared by every immostat crate: the error taxonomy, raw and
//! cleaned transaction records, calendar helpers and the mergeable
//! `AggregateBucket`.

pub mod bucket;
pub mod date;
pub mod error;
pub mod record;
