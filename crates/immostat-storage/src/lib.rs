//! SnapshotStore: durable, atomically published snapshots.
//!
//! Layout under the store root:
//!
//! ```text
//! CURRENT                      name of the published snapshot directory
//! snapshot-000007/
//!     details.csv              detailed records
//!     municipalities.csv       per-municipality count and sum
//!     periods.csv              per-period count and sum
//!     property_types.csv       per-type count, price sum and value sum
//!     manifest.json
//! .staging-000008/             a build in progress
//! ```

pub mod manifest;
pub mod store;
pub mod tables;

pub use manifest::Manifest;
pub use store::{SnapshotStore, SnapshotWriter};
