/// Data fingerprinting.
///
/// A deterministic Sha256 over a canonicalized (sorted) JSON rendering of the
/// training inputs. Identical input multisets produce identical fingerprints
/// regardless of ordering, so the freshness policy can detect real data
/// changes and nothing else.
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

use crate::models::TrainingData;

pub fn compute(data: &TrainingData) -> String {
    let mut users = data.users.clone();
    users.sort();

    let mut items = data.items.clone();
    items.sort();

    let mut user_features = data.user_features.clone();
    user_features.sort();

    let mut item_features = data.item_features.clone();
    item_features.sort();

    let mut interactions = data.interactions.clone();
    interactions.sort_by(|a, b| {
        (&a.0, &a.1)
            .cmp(&(&b.0, &b.1))
            .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
    });

    let canonical = serde_json::json!({
        "users": users,
        "items": items,
        "user_features": user_features,
        "item_features": item_features,
        "interactions": interactions,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrainingData {
        TrainingData {
            users: vec!["u1".into(), "u2".into()],
            items: vec!["i1".into(), "i2".into(), "i3".into()],
            user_features: vec![("u1".into(), vec!["young".into()])],
            item_features: vec![("i2".into(), vec!["outdoor".into()])],
            interactions: vec![
                ("u1".into(), "i1".into(), 1.0),
                ("u2".into(), "i3".into(), 2.0),
            ],
        }
    }

    #[test]
    fn test_permutation_invariance() {
        let data = sample();
        let mut shuffled = data.clone();
        shuffled.users.reverse();
        shuffled.items.rotate_left(1);
        shuffled.interactions.reverse();

        assert_eq!(compute(&data), compute(&shuffled));
    }

    #[test]
    fn test_changed_weight_changes_fingerprint() {
        let data = sample();
        let mut changed = data.clone();
        changed.interactions[0].2 = 3.0;

        assert_ne!(compute(&data), compute(&changed));
    }

    #[test]
    fn test_added_item_changes_fingerprint() {
        let data = sample();
        let mut changed = data.clone();
        changed.items.push("i4".into());

        assert_ne!(compute(&data), compute(&changed));
    }

    #[test]
    fn test_stable_across_calls() {
        let data = sample();
        assert_eq!(compute(&data), compute(&data));
    }
}
