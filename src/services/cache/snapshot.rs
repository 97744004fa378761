/// Trained Snapshot
///
/// The complete, immutable output of one fit+train cycle: the latent factor
/// model, the four id↔index maps, the precomputed feature aggregates, the
/// data fingerprint and the creation timestamp. Re-fitting always produces a
/// new snapshot; there is no incremental update.
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::services::features::FeatureSet;
use crate::services::mapping::IdMappings;
use crate::services::model::LatentFactorModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedSnapshot {
    pub model: LatentFactorModel,
    pub mappings: IdMappings,
    pub user_features: FeatureSet,
    pub item_features: FeatureSet,
    pub user_feature_agg: Array2<f32>,
    pub item_feature_agg: Array2<f32>,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl TrainedSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
