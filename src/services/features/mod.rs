/// Feature Vocabulary & Aggregation Module
///
/// Builds a per-namespace vocabulary of categorical feature tokens and, for
/// each mapped entity, the set of (feature index, weight) assignments. The
/// per-entity contribution to a score is the weighted sum of the feature
/// embedding rows, materialized as a dense [entity_count × embedding_dim]
/// aggregate array that is refreshed whenever the embedding table changes.
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Token -> feature index, assigned in deterministic discovery order.
    vocabulary: HashMap<String, usize>,
    /// Internal entity index -> (feature index, weight) pairs.
    assignments: HashMap<usize, Vec<(usize, f32)>>,
}

impl FeatureSet {
    /// Build vocabulary and assignments from binary-presence feature tuples.
    ///
    /// Tuples referencing entities absent from `entity_index` are skipped
    /// entirely; their tokens never enter the vocabulary.
    pub fn build(
        tuples: &[(String, Vec<String>)],
        entity_index: &HashMap<String, usize>,
    ) -> Self {
        let weighted: Vec<(String, Vec<(String, f32)>)> = tuples
            .iter()
            .map(|(id, tokens)| {
                (
                    id.clone(),
                    tokens.iter().map(|t| (t.clone(), 1.0)).collect(),
                )
            })
            .collect();
        Self::build_weighted(&weighted, entity_index)
    }

    /// Build from explicitly weighted tokens. Weights must be non-negative;
    /// negative weights are dropped with a warning.
    pub fn build_weighted(
        tuples: &[(String, Vec<(String, f32)>)],
        entity_index: &HashMap<String, usize>,
    ) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut assignments: HashMap<usize, Vec<(usize, f32)>> = HashMap::new();
        let mut skipped_entities = 0usize;

        for (entity_id, tokens) in tuples {
            let Some(&entity_idx) = entity_index.get(entity_id) else {
                skipped_entities += 1;
                continue;
            };

            let entry = assignments.entry(entity_idx).or_default();
            for (token, weight) in tokens {
                if *weight < 0.0 {
                    warn!(
                        token = %token,
                        weight,
                        "Dropping feature token with negative weight"
                    );
                    continue;
                }
                let next_idx = vocabulary.len();
                let feature_idx = *vocabulary.entry(token.clone()).or_insert(next_idx);
                entry.push((feature_idx, *weight));
            }
        }

        // Entities whose tokens were all dropped contribute nothing.
        assignments.retain(|_, feats| !feats.is_empty());

        if skipped_entities > 0 {
            debug!(
                skipped_entities,
                "Skipped feature tuples for entities absent from the identifier map"
            );
        }

        Self {
            vocabulary,
            assignments,
        }
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn feature_index(&self, token: &str) -> Option<usize> {
        self.vocabulary.get(token).copied()
    }

    /// (feature index, weight) pairs for one entity; empty slice when the
    /// entity has no recognized features.
    pub fn assignments_for(&self, entity_idx: usize) -> &[(usize, f32)] {
        self.assignments
            .get(&entity_idx)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Materialize the dense per-entity aggregate array from the current
    /// feature embedding table. Entities with no recognized features get the
    /// zero vector, the defined cold-start fallback.
    pub fn aggregate(&self, table: &Array2<f32>, entity_count: usize) -> Array2<f32> {
        let dim = table.ncols();
        let mut agg = Array2::<f32>::zeros((entity_count, dim));

        for (&entity_idx, feats) in &self.assignments {
            if entity_idx >= entity_count {
                continue;
            }
            let mut row = agg.row_mut(entity_idx);
            for &(feature_idx, weight) in feats {
                row.scaled_add(weight, &table.row(feature_idx));
            }
        }

        agg
    }
}
