/// Freshness Policy
///
/// A stored snapshot is reused only when all of the following hold: a record
/// exists for the owner key, its fingerprint matches the current inputs, and
/// it was created today. Any failed condition forces retraining.
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::services::cache::snapshot::TrainedSnapshot;
use crate::services::cache::store::SnapshotStore;

pub struct FreshnessCache {
    store: Arc<dyn SnapshotStore>,
    retention_days: i64,
}

impl FreshnessCache {
    pub fn new(store: Arc<dyn SnapshotStore>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// True when no usable snapshot exists for `fingerprint` today.
    pub fn needs_training(&self, owner: &str, fingerprint: &str) -> Result<bool> {
        let Some(snapshot) = self.store.latest(owner)? else {
            info!(owner, "No snapshot found; training needed");
            return Ok(true);
        };

        if snapshot.fingerprint != fingerprint {
            info!(owner, "Input data changed since last training; retraining needed");
            return Ok(true);
        }

        if snapshot.created_at.date_naive() < Utc::now().date_naive() {
            info!(
                owner,
                trained_on = %snapshot.created_at.date_naive(),
                "Snapshot is from an earlier day; retraining needed"
            );
            return Ok(true);
        }

        debug!(owner, "Reusing snapshot from {}", snapshot.created_at);
        Ok(false)
    }

    /// Most recent snapshot, or a recoverable not-found error the caller is
    /// expected to handle by training.
    pub fn load(&self, owner: &str) -> Result<TrainedSnapshot> {
        self.store
            .latest(owner)?
            .ok_or_else(|| EngineError::SnapshotNotFound(owner.to_string()))
    }

    pub fn save(&self, owner: &str, snapshot: &TrainedSnapshot) -> Result<()> {
        self.store.save(owner, snapshot)
    }

    /// Delete snapshots older than the retention window. The newest snapshot
    /// per owner is always kept, even when it is past the window.
    pub fn purge_stale(&self, owner: &str) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        self.store.purge_older_than(owner, cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::store::FsSnapshotStore;
    use crate::services::features::FeatureSet;
    use crate::services::mapping::IdMappings;
    use crate::services::model::{LatentFactorModel, ModelDims};
    use chrono::DateTime;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn snapshot_at(created_at: DateTime<Utc>, fingerprint: &str) -> TrainedSnapshot {
        let mappings =
            IdMappings::build(&["u1".to_string()], &["i1".to_string()]).unwrap();
        let dims = ModelDims {
            num_users: 1,
            num_items: 1,
            num_user_features: 0,
            num_item_features: 0,
            embedding_dim: 2,
            use_bias: false,
        };
        let mut rng = StdRng::seed_from_u64(5);
        TrainedSnapshot {
            model: LatentFactorModel::new(dims, &mut rng),
            mappings,
            user_features: FeatureSet::build(&[], &HashMap::new()),
            item_features: FeatureSet::build(&[], &HashMap::new()),
            user_feature_agg: Array2::zeros((1, 2)),
            item_feature_agg: Array2::zeros((1, 2)),
            fingerprint: fingerprint.to_string(),
            created_at,
        }
    }

    fn cache_with_dir(dir: &std::path::Path) -> FreshnessCache {
        FreshnessCache::new(Arc::new(FsSnapshotStore::new(dir)), 7)
    }

    #[test]
    fn test_no_record_needs_training() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        assert!(cache.needs_training("global", "fp").unwrap());
    }

    #[test]
    fn test_today_with_matching_fingerprint_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        cache.save("global", &snapshot_at(Utc::now(), "fp")).unwrap();

        assert!(!cache.needs_training("global", "fp").unwrap());
    }

    #[test]
    fn test_fingerprint_mismatch_forces_retraining() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        cache.save("global", &snapshot_at(Utc::now(), "fp")).unwrap();

        assert!(cache.needs_training("global", "other").unwrap());
    }

    #[test]
    fn test_yesterdays_snapshot_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        let yesterday = Utc::now() - Duration::days(1);
        cache.save("global", &snapshot_at(yesterday, "fp")).unwrap();

        assert!(cache.needs_training("global", "fp").unwrap());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        assert!(matches!(
            cache.load("nobody"),
            Err(EngineError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_purge_stale_respects_keep_newest() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_with_dir(dir.path());

        let now = Utc::now();
        cache.save("u1", &snapshot_at(now - Duration::days(40), "a")).unwrap();
        cache.save("u1", &snapshot_at(now - Duration::days(30), "b")).unwrap();

        assert_eq!(cache.purge_stale("u1").unwrap(), 1);
        assert_eq!(cache.load("u1").unwrap().fingerprint, "b");
    }
}
