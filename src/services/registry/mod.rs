/// Model Registry
///
/// Owner-keyed lifecycle for live engines: create-on-miss, reuse while
/// fresh, evict when idle. Concurrent `load_or_train` calls for the same
/// owner are serialized through a per-owner mutex so exactly one training
/// run happens per staleness window (single-flight); callers that lose the
/// race observe the winner's snapshot and load it instead.
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{Recommendation, TrainingData, TrainingParams};
use crate::services::cache::{fingerprint, FreshnessCache};
use crate::services::engine::RecommendationEngine;

/// Owner key for the shared, all-users model.
pub const GLOBAL_OWNER: &str = "global";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    Trained,
    Loaded,
}

struct EngineEntry {
    engine: Arc<RecommendationEngine>,
    last_used: Instant,
}

pub struct ModelRegistry {
    engine_config: EngineConfig,
    cache: Arc<FreshnessCache>,
    engines: DashMap<String, EngineEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    idle_ttl: Duration,
}

impl ModelRegistry {
    pub fn new(engine_config: EngineConfig, cache: Arc<FreshnessCache>, idle_ttl: Duration) -> Self {
        Self {
            engine_config,
            cache,
            engines: DashMap::new(),
            locks: DashMap::new(),
            idle_ttl,
        }
    }

    fn owner_lock(&self, owner: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure a fresh model exists for `owner`: reuse today's snapshot when
    /// the fingerprint matches, otherwise run a full fit+train cycle on a
    /// blocking worker and persist the result.
    pub async fn load_or_train(
        &self,
        owner: &str,
        data: TrainingData,
        params: TrainingParams,
        force_retrain: bool,
    ) -> Result<TrainOutcome> {
        let lock = self.owner_lock(owner);
        let _guard = lock.lock().await;

        let fp = fingerprint::compute(&data);

        if !force_retrain && !self.cache.needs_training(owner, &fp)? {
            // Reuse the live engine when it already serves this data.
            if let Some(mut entry) = self.engines.get_mut(owner) {
                if entry.engine.fingerprint() == Some(fp.as_str()) {
                    entry.last_used = Instant::now();
                    debug!(owner, "Reusing live engine");
                    return Ok(TrainOutcome::Loaded);
                }
            }

            let snapshot = self.cache.load(owner)?;
            let engine =
                RecommendationEngine::from_snapshot(self.engine_config.clone(), snapshot);
            self.insert_engine(owner, engine);
            info!(owner, "Loaded snapshot into registry");
            return Ok(TrainOutcome::Loaded);
        }

        info!(owner, force_retrain, "Training new model");
        let config = self.engine_config.clone();
        let engine = tokio::task::spawn_blocking(move || -> Result<RecommendationEngine> {
            let mut engine = RecommendationEngine::new(config);
            engine.fit(&data)?;
            engine.train(&params)?;
            Ok(engine)
        })
        .await
        .map_err(|e| EngineError::Internal(format!("training task failed: {e}")))??;

        self.cache.save(owner, &engine.snapshot()?)?;
        self.insert_engine(owner, engine);
        Ok(TrainOutcome::Trained)
    }

    /// Fire-and-forget variant: schedules `load_or_train` on the runtime and
    /// returns immediately, so an HTTP-facing caller can acknowledge
    /// "scheduled" instead of blocking on a long training run.
    pub fn train_async(
        self: &Arc<Self>,
        owner: String,
        data: TrainingData,
        params: TrainingParams,
        force_retrain: bool,
    ) -> JoinHandle<Result<TrainOutcome>> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry
                .load_or_train(&owner, data, params, force_retrain)
                .await
        })
    }

    /// Recommend through the owner's live engine, falling back to the stored
    /// snapshot on a registry miss.
    pub async fn recommend(
        &self,
        owner: &str,
        user_id: &str,
        top_n: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Recommendation>> {
        if let Some(mut entry) = self.engines.get_mut(owner) {
            entry.last_used = Instant::now();
            let engine = Arc::clone(&entry.engine);
            drop(entry);
            return engine.recommend(user_id, top_n, exclude_ids);
        }

        let snapshot = self.cache.load(owner)?;
        let engine = RecommendationEngine::from_snapshot(self.engine_config.clone(), snapshot);
        let recommendations = engine.recommend(user_id, top_n, exclude_ids)?;
        self.insert_engine(owner, engine);
        debug!(owner, "Engine restored on recommend miss");
        Ok(recommendations)
    }

    /// Drop live engines that have not served a request within the TTL.
    /// Snapshots on disk are unaffected.
    pub fn evict_idle(&self) -> usize {
        let before = self.engines.len();
        let ttl = self.idle_ttl;
        self.engines.retain(|_, entry| entry.last_used.elapsed() < ttl);
        let evicted = before - self.engines.len();
        if evicted > 0 {
            info!(evicted, "Evicted idle engines from registry");
        }
        evicted
    }

    /// Purge aged snapshots for an owner, keeping the newest.
    pub fn purge_stale(&self, owner: &str) -> Result<usize> {
        self.cache.purge_stale(owner)
    }

    pub fn live_engines(&self) -> usize {
        self.engines.len()
    }

    fn insert_engine(&self, owner: &str, engine: RecommendationEngine) {
        self.engines.insert(
            owner.to_string(),
            EngineEntry {
                engine: Arc::new(engine),
                last_used: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::FsSnapshotStore;

    fn sample_data() -> TrainingData {
        TrainingData {
            users: vec!["u1".into(), "u2".into()],
            items: vec!["i1".into(), "i2".into(), "i3".into()],
            user_features: vec![],
            item_features: vec![],
            interactions: vec![
                ("u1".into(), "i1".into(), 1.0),
                ("u1".into(), "i2".into(), 1.0),
                ("u2".into(), "i3".into(), 1.0),
            ],
        }
    }

    fn quick_params() -> TrainingParams {
        TrainingParams {
            epochs: 3,
            batch_size: 4,
            seed: Some(1),
            ..Default::default()
        }
    }

    fn registry_with_dir(dir: &std::path::Path) -> Arc<ModelRegistry> {
        let store = Arc::new(FsSnapshotStore::new(dir));
        let cache = Arc::new(FreshnessCache::new(store, 7));
        Arc::new(ModelRegistry::new(
            EngineConfig {
                embedding_dim: 8,
                seed: Some(2),
                ..Default::default()
            },
            cache,
            Duration::from_secs(3600),
        ))
    }

    #[tokio::test]
    async fn test_first_call_trains_second_loads() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        let first = registry
            .load_or_train(GLOBAL_OWNER, sample_data(), quick_params(), false)
            .await
            .unwrap();
        let second = registry
            .load_or_train(GLOBAL_OWNER, sample_data(), quick_params(), false)
            .await
            .unwrap();

        assert_eq!(first, TrainOutcome::Trained);
        assert_eq!(second, TrainOutcome::Loaded);
    }

    #[tokio::test]
    async fn test_force_retrain_always_trains() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        registry
            .load_or_train("u1", sample_data(), quick_params(), false)
            .await
            .unwrap();
        let outcome = registry
            .load_or_train("u1", sample_data(), quick_params(), true)
            .await
            .unwrap();

        assert_eq!(outcome, TrainOutcome::Trained);
    }

    #[tokio::test]
    async fn test_changed_data_retrains() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        registry
            .load_or_train("u1", sample_data(), quick_params(), false)
            .await
            .unwrap();

        let mut changed = sample_data();
        changed
            .interactions
            .push(("u2".into(), "i1".into(), 2.0));
        let outcome = registry
            .load_or_train("u1", changed, quick_params(), false)
            .await
            .unwrap();

        assert_eq!(outcome, TrainOutcome::Trained);
    }

    #[tokio::test]
    async fn test_concurrent_calls_coalesce_into_one_training() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        let a = registry.train_async(
            GLOBAL_OWNER.to_string(),
            sample_data(),
            quick_params(),
            false,
        );
        let b = registry.train_async(
            GLOBAL_OWNER.to_string(),
            sample_data(),
            quick_params(),
            false,
        );

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let trained = outcomes
            .iter()
            .filter(|o| **o == TrainOutcome::Trained)
            .count();

        assert_eq!(trained, 1, "exactly one of the racing calls should train");
    }

    #[tokio::test]
    async fn test_recommend_through_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        registry
            .load_or_train(GLOBAL_OWNER, sample_data(), quick_params(), false)
            .await
            .unwrap();

        let recs = registry
            .recommend(
                GLOBAL_OWNER,
                "u1",
                2,
                &["i1".to_string(), "i2".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].item_id, "i3");
    }

    #[tokio::test]
    async fn test_recommend_missing_owner_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_with_dir(dir.path());

        let result = registry.recommend("nobody", "u1", 5, &[]).await;
        assert!(matches!(result, Err(EngineError::SnapshotNotFound(_))));
    }

    #[tokio::test]
    async fn test_recommend_survives_registry_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsSnapshotStore::new(dir.path()));
        let cache = Arc::new(FreshnessCache::new(store, 7));
        let registry = Arc::new(ModelRegistry::new(
            EngineConfig {
                embedding_dim: 8,
                seed: Some(2),
                ..Default::default()
            },
            cache,
            Duration::from_secs(0),
        ));

        registry
            .load_or_train("u9", sample_data(), quick_params(), false)
            .await
            .unwrap();

        assert_eq!(registry.evict_idle(), 1);
        assert_eq!(registry.live_engines(), 0);

        // Registry miss falls back to the stored snapshot.
        let recs = registry.recommend("u9", "u1", 3, &[]).await.unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(registry.live_engines(), 1);
    }
}
