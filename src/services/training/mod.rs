/// Training Engine
///
/// Fits the latent factor model against the sparse positive interaction
/// matrix: uniform negative sampling, shuffled mini-batches, MSE loss on the
/// sigmoid-scaled predictions, AdamW with gradient clipping, learning-rate
/// decay on plateau and early stopping.
pub mod optimizer;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{TrainingParams, TrainingReport};
use crate::services::features::FeatureSet;
use crate::services::matrix::InteractionMatrix;
use crate::services::model::{sigmoid, LatentFactorModel, WEIGHT_SCALE};
use optimizer::{AdamW, Moments1, Moments2, MomentsScalar};

/// Global gradient-norm ceiling per optimizer step.
const GRADIENT_CLIP_NORM: f32 = 1.0;
/// Epochs without improvement before the learning rate is halved.
const LR_PLATEAU_PATIENCE: usize = 2;
const LR_DECAY_FACTOR: f32 = 0.5;
const MIN_LR: f32 = 1e-6;

/// Run one full training invocation over a fitted model.
///
/// An empty positive set is a documented no-op: the model stays usable at
/// initialization quality and the report records zero epochs.
pub fn train(
    model: &mut LatentFactorModel,
    matrix: &InteractionMatrix,
    user_features: &FeatureSet,
    item_features: &FeatureSet,
    params: &TrainingParams,
) -> Result<TrainingReport> {
    params.validate()?;

    let positives = &matrix.entries;
    if positives.is_empty() {
        warn!("No positive interactions available; skipping training");
        return Ok(TrainingReport::default());
    }

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // Negative sampling: uniformly random (user, item) pairs with label 0.
    // Collisions with true positives are accepted; at realistic sparsity they
    // are rare enough not to matter.
    let num_negatives = (positives.len() as f32 * params.negative_sampling_ratio) as usize;
    let mut examples: Vec<(usize, usize, f32)> = Vec::with_capacity(positives.len() + num_negatives);
    examples.extend(positives.iter().copied());
    for _ in 0..num_negatives {
        examples.push((
            rng.gen_range(0..matrix.num_users),
            rng.gen_range(0..matrix.num_items),
            0.0,
        ));
    }

    info!(
        positives = positives.len(),
        negatives = num_negatives,
        batch_size = params.batch_size,
        epochs = params.epochs,
        "Starting training"
    );

    let mut opt = AdamW::new(params.learning_rate, params.weight_decay);
    let mut user_moments = Moments2::zeros_like(&model.user_embeddings);
    let mut item_moments = Moments2::zeros_like(&model.item_embeddings);
    let mut user_feature_moments = Moments2::zeros_like(&model.user_feature_embeddings);
    let mut item_feature_moments = Moments2::zeros_like(&model.item_feature_embeddings);
    let mut user_bias_moments = Moments1::zeros_like(&model.user_bias);
    let mut item_bias_moments = Moments1::zeros_like(&model.item_bias);
    let mut global_bias_moments = MomentsScalar::default();

    let mut indices: Vec<usize> = (0..examples.len()).collect();
    let mut best_loss = f32::INFINITY;
    let mut stall_epochs = 0usize;
    let mut plateau_epochs = 0usize;
    let mut epoch_losses = Vec::with_capacity(params.epochs);

    for epoch in 0..params.epochs {
        // Dense feature aggregates are refreshed once per epoch; within an
        // epoch the feature contribution to the forward pass is held fixed
        // while gradients still flow into the feature tables.
        let user_agg = user_features.aggregate(&model.user_feature_embeddings, matrix.num_users);
        let item_agg = item_features.aggregate(&model.item_feature_embeddings, matrix.num_items);

        indices.shuffle(&mut rng);
        let mut total_loss = 0.0_f64;
        let mut batches = 0usize;

        for batch in indices.chunks(params.batch_size) {
            let loss = train_batch(
                model,
                batch,
                &examples,
                &user_agg,
                &item_agg,
                user_features,
                item_features,
                &mut opt,
                &mut user_moments,
                &mut item_moments,
                &mut user_feature_moments,
                &mut item_feature_moments,
                &mut user_bias_moments,
                &mut item_bias_moments,
                &mut global_bias_moments,
            );
            total_loss += loss as f64;
            batches += 1;
        }

        let avg_loss = (total_loss / batches.max(1) as f64) as f32;
        epoch_losses.push(avg_loss);

        debug!(
            epoch = epoch + 1,
            epochs = params.epochs,
            loss = avg_loss,
            lr = opt.lr(),
            "Epoch complete"
        );

        if avg_loss < best_loss {
            best_loss = avg_loss;
            stall_epochs = 0;
            plateau_epochs = 0;
        } else {
            stall_epochs += 1;
            plateau_epochs += 1;

            if plateau_epochs >= LR_PLATEAU_PATIENCE {
                let new_lr = (opt.lr() * LR_DECAY_FACTOR).max(MIN_LR);
                debug!(old_lr = opt.lr(), new_lr, "Loss plateau; reducing learning rate");
                opt.set_lr(new_lr);
                plateau_epochs = 0;
            }

            if params.early_stopping && stall_epochs >= params.patience {
                info!(
                    epoch = epoch + 1,
                    best_loss, "Early stopping: loss failed to improve"
                );
                break;
            }
        }
    }

    let final_loss = epoch_losses.last().copied().unwrap_or(0.0);
    info!(
        epochs_run = epoch_losses.len(),
        best_loss, final_loss, "Training finished"
    );

    Ok(TrainingReport {
        epochs_run: epoch_losses.len(),
        positives: positives.len(),
        negatives: num_negatives,
        best_loss,
        final_loss,
        epoch_losses,
    })
}

/// Accumulated gradients for one mini-batch, keyed by touched row/entry.
#[derive(Default)]
struct BatchGradients {
    user_rows: HashMap<usize, Array1<f32>>,
    item_rows: HashMap<usize, Array1<f32>>,
    user_feature_rows: HashMap<usize, Array1<f32>>,
    item_feature_rows: HashMap<usize, Array1<f32>>,
    user_bias: HashMap<usize, f32>,
    item_bias: HashMap<usize, f32>,
    global_bias: f32,
}

impl BatchGradients {
    fn add_row(map: &mut HashMap<usize, Array1<f32>>, row: usize, scale: f32, vec: &Array1<f32>) {
        map.entry(row)
            .or_insert_with(|| Array1::zeros(vec.len()))
            .scaled_add(scale, vec);
    }

    fn norm(&self) -> f32 {
        let mut sq = 0.0_f32;
        for map in [
            &self.user_rows,
            &self.item_rows,
            &self.user_feature_rows,
            &self.item_feature_rows,
        ] {
            for grad in map.values() {
                sq += grad.iter().map(|g| g * g).sum::<f32>();
            }
        }
        for map in [&self.user_bias, &self.item_bias] {
            sq += map.values().map(|g| g * g).sum::<f32>();
        }
        sq += self.global_bias * self.global_bias;
        sq.sqrt()
    }

    fn scale(&mut self, factor: f32) {
        for map in [
            &mut self.user_rows,
            &mut self.item_rows,
            &mut self.user_feature_rows,
            &mut self.item_feature_rows,
        ] {
            for grad in map.values_mut() {
                grad.mapv_inplace(|g| g * factor);
            }
        }
        for map in [&mut self.user_bias, &mut self.item_bias] {
            for grad in map.values_mut() {
                *grad *= factor;
            }
        }
        self.global_bias *= factor;
    }
}

#[allow(clippy::too_many_arguments)]
fn train_batch(
    model: &mut LatentFactorModel,
    batch: &[usize],
    examples: &[(usize, usize, f32)],
    user_agg: &Array2<f32>,
    item_agg: &Array2<f32>,
    user_features: &FeatureSet,
    item_features: &FeatureSet,
    opt: &mut AdamW,
    user_moments: &mut Moments2,
    item_moments: &mut Moments2,
    user_feature_moments: &mut Moments2,
    item_feature_moments: &mut Moments2,
    user_bias_moments: &mut Moments1,
    item_bias_moments: &mut Moments1,
    global_bias_moments: &mut MomentsScalar,
) -> f32 {
    let batch_len = batch.len() as f32;
    let mut grads = BatchGradients::default();
    let mut loss = 0.0_f32;

    for &example_idx in batch {
        let (user, item, label) = examples[example_idx];

        let user_vec = &model.user_embeddings.row(user) + &user_agg.row(user);
        let item_vec = &model.item_embeddings.row(item) + &item_agg.row(item);
        let mut raw = user_vec.dot(&item_vec);
        if model.dims.use_bias {
            raw += model.user_bias[user] + model.item_bias[item] + model.global_bias;
        }
        let s = sigmoid(raw);
        let prediction = s * WEIGHT_SCALE;
        let err = prediction - label;
        loss += err * err;

        // d(mse)/d(raw) through the scaled sigmoid.
        let g = 2.0 * err / batch_len * WEIGHT_SCALE * s * (1.0 - s);

        BatchGradients::add_row(&mut grads.user_rows, user, g, &item_vec);
        BatchGradients::add_row(&mut grads.item_rows, item, g, &user_vec);
        for &(feature_idx, weight) in user_features.assignments_for(user) {
            BatchGradients::add_row(&mut grads.user_feature_rows, feature_idx, g * weight, &item_vec);
        }
        for &(feature_idx, weight) in item_features.assignments_for(item) {
            BatchGradients::add_row(&mut grads.item_feature_rows, feature_idx, g * weight, &user_vec);
        }
        if model.dims.use_bias {
            *grads.user_bias.entry(user).or_insert(0.0) += g;
            *grads.item_bias.entry(item).or_insert(0.0) += g;
            grads.global_bias += g;
        }
    }

    let norm = grads.norm();
    if norm > GRADIENT_CLIP_NORM {
        grads.scale(GRADIENT_CLIP_NORM / norm);
    }

    opt.begin_step();
    opt.update_rows(&mut model.user_embeddings, user_moments, &grads.user_rows);
    opt.update_rows(&mut model.item_embeddings, item_moments, &grads.item_rows);
    opt.update_rows(
        &mut model.user_feature_embeddings,
        user_feature_moments,
        &grads.user_feature_rows,
    );
    opt.update_rows(
        &mut model.item_feature_embeddings,
        item_feature_moments,
        &grads.item_feature_rows,
    );
    if model.dims.use_bias {
        opt.update_entries(&mut model.user_bias, user_bias_moments, &grads.user_bias);
        opt.update_entries(&mut model.item_bias, item_bias_moments, &grads.item_bias);
        opt.update_scalar(&mut model.global_bias, global_bias_moments, grads.global_bias);
    }

    loss / batch_len
}
