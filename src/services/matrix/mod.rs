/// Interaction Matrix Builder
///
/// Filters weighted interaction triples against the current identifier
/// mappings and assembles the survivors into a sparse (COO) positive
/// interaction matrix. Entry values are raw interaction weights, not
/// binarized.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::mapping::IdMappings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionMatrix {
    pub num_users: usize,
    pub num_items: usize,
    /// (user index, item index, weight) triples with weight > 0.
    pub entries: Vec<(usize, usize, f32)>,
}

impl InteractionMatrix {
    /// Keep only triples whose user and item are mapped and whose weight is
    /// strictly positive. Unknown identifiers and non-positive weights are
    /// silently dropped; they are expected noise, not errors.
    pub fn build(interactions: &[(String, String, f32)], mappings: &IdMappings) -> Self {
        let mut entries = Vec::new();
        let mut dropped = 0usize;

        for (user_id, item_id, weight) in interactions {
            let mapped = (
                mappings.user_index(user_id),
                mappings.item_index(item_id),
            );
            match mapped {
                (Some(user), Some(item)) if *weight > 0.0 => {
                    entries.push((user, item, *weight));
                }
                _ => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!(
                dropped,
                kept = entries.len(),
                "Dropped interactions with unknown identifiers or non-positive weights"
            );
        }

        Self {
            num_users: mappings.num_users(),
            num_items: mappings.num_items(),
            entries,
        }
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
