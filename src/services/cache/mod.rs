/// Model Freshness Cache
///
/// Decides whether a previously trained snapshot can be reused or the model
/// must be retrained: data fingerprinting, the daily staleness rule,
/// snapshot serialization and timestamp-ordered storage with a retention
/// window.
pub mod fingerprint;
pub mod freshness;
pub mod snapshot;
pub mod store;

pub use freshness::FreshnessCache;
pub use snapshot::TrainedSnapshot;
pub use store::{FsSnapshotStore, SnapshotStore};
