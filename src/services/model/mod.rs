/// Latent Factor Model
///
/// Embedding tables for users, items, user-features and item-features plus
/// optional bias terms. The interaction score for (user, item) is
///
/// ```text
/// raw = dot(user_emb + user_feature_agg, item_emb + item_feature_agg)
///       [+ user_bias + item_bias + global_bias]
/// prediction = sigmoid(raw) * WEIGHT_SCALE
/// ```
///
/// WEIGHT_SCALE lets predictions span the observed interaction-weight range
/// (base weight 1-2 with boost multipliers up to ~3).
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Upper bound of the prediction range.
pub const WEIGHT_SCALE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDims {
    pub num_users: usize,
    pub num_items: usize,
    pub num_user_features: usize,
    pub num_item_features: usize,
    pub embedding_dim: usize,
    pub use_bias: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatentFactorModel {
    pub dims: ModelDims,
    pub user_embeddings: Array2<f32>,
    pub item_embeddings: Array2<f32>,
    pub user_feature_embeddings: Array2<f32>,
    pub item_feature_embeddings: Array2<f32>,
    /// Zero-length when bias is disabled.
    pub user_bias: Array1<f32>,
    pub item_bias: Array1<f32>,
    pub global_bias: f32,
}

impl LatentFactorModel {
    /// Initialize all embedding tables with Xavier-style normal noise and
    /// bias terms at zero.
    pub fn new(dims: ModelDims, rng: &mut impl Rng) -> Self {
        let dim = dims.embedding_dim;
        let (user_bias, item_bias) = if dims.use_bias {
            (
                Array1::zeros(dims.num_users),
                Array1::zeros(dims.num_items),
            )
        } else {
            (Array1::zeros(0), Array1::zeros(0))
        };

        Self {
            user_embeddings: xavier_normal(dims.num_users, dim, rng),
            item_embeddings: xavier_normal(dims.num_items, dim, rng),
            user_feature_embeddings: xavier_normal(dims.num_user_features, dim, rng),
            item_feature_embeddings: xavier_normal(dims.num_item_features, dim, rng),
            user_bias,
            item_bias,
            global_bias: 0.0,
            dims,
        }
    }

    /// Raw (pre-sigmoid) score for one (user, item) pair, using precomputed
    /// feature-aggregate arrays.
    pub fn raw_score(
        &self,
        user: usize,
        item: usize,
        user_agg: &Array2<f32>,
        item_agg: &Array2<f32>,
    ) -> f32 {
        let user_vec = &self.user_embeddings.row(user) + &user_agg.row(user);
        let item_vec = &self.item_embeddings.row(item) + &item_agg.row(item);
        let mut raw = user_vec.dot(&item_vec);
        if self.dims.use_bias {
            raw += self.user_bias[user] + self.item_bias[item] + self.global_bias;
        }
        raw
    }

    /// Scaled prediction in [0, WEIGHT_SCALE].
    pub fn predict(
        &self,
        user: usize,
        item: usize,
        user_agg: &Array2<f32>,
        item_agg: &Array2<f32>,
    ) -> f32 {
        sigmoid(self.raw_score(user, item, user_agg, item_agg)) * WEIGHT_SCALE
    }

    /// Predictions for one user against a contiguous range of item indices.
    /// Used by the inference path to score the catalog in batches.
    pub fn predict_items(
        &self,
        user: usize,
        item_start: usize,
        item_end: usize,
        user_agg: &Array2<f32>,
        item_agg: &Array2<f32>,
    ) -> Array1<f32> {
        let user_vec = &self.user_embeddings.row(user) + &user_agg.row(user);
        let user_bias = if self.dims.use_bias {
            self.user_bias[user] + self.global_bias
        } else {
            0.0
        };

        let mut scores = Array1::zeros(item_end - item_start);
        for (offset, item) in (item_start..item_end).enumerate() {
            let item_vec = &self.item_embeddings.row(item) + &item_agg.row(item);
            let mut raw = user_vec.dot(&item_vec) + user_bias;
            if self.dims.use_bias {
                raw += self.item_bias[item];
            }
            scores[offset] = sigmoid(raw) * WEIGHT_SCALE;
        }
        scores
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Zero-mean normal init with std = sqrt(2 / (rows + cols)).
fn xavier_normal(rows: usize, cols: usize, rng: &mut impl Rng) -> Array2<f32> {
    if rows == 0 || cols == 0 {
        return Array2::zeros((rows, cols));
    }
    let std = (2.0 / (rows + cols) as f32).sqrt();
    let normal = Normal::new(0.0_f32, std).expect("std is finite and positive");
    Array2::from_shape_fn((rows, cols), |_| normal.sample(rng))
}
