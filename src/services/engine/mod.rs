/// Recommendation Engine Facade
///
/// Orchestrates the fit → train → recommend lifecycle over one owner's data.
/// `fit` rebuilds mappings, vocabularies, the interaction matrix and a fresh
/// model from scratch; `train` optimizes it; `recommend` serves ranked,
/// exclusion-filtered top-N lists. A trained engine can be exported to and
/// restored from an immutable snapshot.
use chrono::Utc;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{Recommendation, TrainingData, TrainingParams, TrainingReport};
use crate::services::cache::{fingerprint, TrainedSnapshot};
use crate::services::features::FeatureSet;
use crate::services::mapping::IdMappings;
use crate::services::matrix::InteractionMatrix;
use crate::services::model::{LatentFactorModel, ModelDims};
use crate::services::training;

pub struct RecommendationEngine {
    config: EngineConfig,
    state: Option<FittedState>,
}

struct FittedState {
    mappings: IdMappings,
    user_features: FeatureSet,
    item_features: FeatureSet,
    /// Present after `fit`; absent on a snapshot-restored engine, which must
    /// be re-fitted before it can train again.
    interactions: Option<InteractionMatrix>,
    model: LatentFactorModel,
    user_feature_agg: Array2<f32>,
    item_feature_agg: Array2<f32>,
    fingerprint: String,
    trained: bool,
}

impl RecommendationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Build index spaces, feature vocabularies, the positive interaction
    /// matrix and a freshly initialized model. Replaces any previous state
    /// entirely; this is a full reset, never fine-tuning.
    pub fn fit(&mut self, data: &TrainingData) -> Result<()> {
        let mappings = IdMappings::build(&data.users, &data.items)?;
        let user_features = FeatureSet::build(&data.user_features, &mappings.user_to_index);
        let item_features = FeatureSet::build(&data.item_features, &mappings.item_to_index);
        let interactions = InteractionMatrix::build(&data.interactions, &mappings);

        let dims = ModelDims {
            num_users: mappings.num_users(),
            num_items: mappings.num_items(),
            num_user_features: user_features.vocabulary_len(),
            num_item_features: item_features.vocabulary_len(),
            embedding_dim: self.config.embedding_dim,
            use_bias: self.config.use_bias,
        };
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = LatentFactorModel::new(dims, &mut rng);

        let user_feature_agg =
            user_features.aggregate(&model.user_feature_embeddings, dims.num_users);
        let item_feature_agg =
            item_features.aggregate(&model.item_feature_embeddings, dims.num_items);

        info!(
            users = dims.num_users,
            items = dims.num_items,
            user_features = dims.num_user_features,
            item_features = dims.num_item_features,
            positives = interactions.nnz(),
            "Fitted engine data"
        );

        self.state = Some(FittedState {
            fingerprint: fingerprint::compute(data),
            interactions: Some(interactions),
            mappings,
            user_features,
            item_features,
            model,
            user_feature_agg,
            item_feature_agg,
            trained: false,
        });
        Ok(())
    }

    /// Train the fitted model. Requires a preceding `fit` in this process;
    /// a snapshot-restored engine cannot resume training.
    pub fn train(&mut self, params: &TrainingParams) -> Result<TrainingReport> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| EngineError::NotFitted("call fit before train".into()))?;
        let matrix = state.interactions.as_ref().ok_or_else(|| {
            EngineError::NotFitted("engine was restored from a snapshot; re-fit to train".into())
        })?;

        let report = training::train(
            &mut state.model,
            matrix,
            &state.user_features,
            &state.item_features,
            params,
        )?;

        // Refresh the aggregates from the trained feature tables so inference
        // sees the final weights.
        state.user_feature_agg = state
            .user_features
            .aggregate(&state.model.user_feature_embeddings, state.mappings.num_users());
        state.item_feature_agg = state
            .item_features
            .aggregate(&state.model.item_feature_embeddings, state.mappings.num_items());
        state.trained = true;

        Ok(report)
    }

    /// Ranked top-N recommendations for one user.
    ///
    /// Unknown users get an empty list, not an error. All items are scored in
    /// batches (`score_batch_size` changes throughput, never results), then
    /// selected in strictly descending score order; exact ties break toward
    /// the lower internal item index. Items in `exclude_ids` are skipped.
    pub fn recommend(
        &self,
        user_id: &str,
        top_n: usize,
        exclude_ids: &[String],
    ) -> Result<Vec<Recommendation>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| EngineError::NotFitted("call fit or restore a snapshot first".into()))?;

        let Some(user) = state.mappings.user_index(user_id) else {
            debug!(user_id, "Unknown user; returning empty recommendations");
            return Ok(Vec::new());
        };

        let num_items = state.mappings.num_items();
        let mut scores = Vec::with_capacity(num_items);
        let batch = self.config.score_batch_size.max(1);
        let mut start = 0usize;
        while start < num_items {
            let end = (start + batch).min(num_items);
            let chunk = state.model.predict_items(
                user,
                start,
                end,
                &state.user_feature_agg,
                &state.item_feature_agg,
            );
            scores.extend(chunk.iter().copied());
            start = end;
        }

        let mut order: Vec<usize> = (0..num_items).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let excluded: HashSet<&str> = exclude_ids.iter().map(String::as_str).collect();
        let mut recommendations = Vec::with_capacity(top_n.min(num_items));
        for item in order {
            if recommendations.len() >= top_n {
                break;
            }
            let item_id = state
                .mappings
                .item_id(item)
                .ok_or_else(|| EngineError::Internal(format!("unmapped item index {item}")))?;
            if excluded.contains(item_id) {
                continue;
            }
            recommendations.push(Recommendation {
                item_id: item_id.to_string(),
                score: scores[item],
            });
        }

        debug!(
            user_id,
            returned = recommendations.len(),
            excluded = exclude_ids.len(),
            "Recommendations computed"
        );
        Ok(recommendations)
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn is_trained(&self) -> bool {
        self.state.as_ref().map(|s| s.trained).unwrap_or(false)
    }

    /// Fingerprint of the data this engine was fitted on.
    pub fn fingerprint(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.fingerprint.as_str())
    }

    /// Export the current state as an immutable snapshot.
    pub fn snapshot(&self) -> Result<TrainedSnapshot> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| EngineError::NotFitted("nothing to snapshot".into()))?;

        Ok(TrainedSnapshot {
            model: state.model.clone(),
            mappings: state.mappings.clone(),
            user_features: state.user_features.clone(),
            item_features: state.item_features.clone(),
            user_feature_agg: state.user_feature_agg.clone(),
            item_feature_agg: state.item_feature_agg.clone(),
            fingerprint: state.fingerprint.clone(),
            created_at: Utc::now(),
        })
    }

    /// Rebuild a serving-ready engine from a snapshot. The restored engine
    /// answers `recommend` immediately but must be re-fitted before training.
    pub fn from_snapshot(config: EngineConfig, snapshot: TrainedSnapshot) -> Self {
        Self {
            config,
            state: Some(FittedState {
                mappings: snapshot.mappings,
                user_features: snapshot.user_features,
                item_features: snapshot.item_features,
                interactions: None,
                model: snapshot.model,
                user_feature_agg: snapshot.user_feature_agg,
                item_feature_agg: snapshot.item_feature_agg,
                fingerprint: snapshot.fingerprint,
                trained: true,
            }),
        }
    }
}
