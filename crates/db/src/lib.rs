//! Snapshot persistence for governance delegate snapshots.
//!
//! Provides the persisted record layout and a SQLite-backed store that
//! replaces the snapshot for a discriminator on every write.

pub mod models;
pub mod pool;
pub mod snapshots;

pub use models::{DelegateRecord, Delegator, Snapshot, Vote, DELEGATES_FIELD};
pub use pool::DbPool;
pub use snapshots::{SnapshotError, SnapshotStore, SnapshotWriter};
