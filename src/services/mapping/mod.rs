/// Identifier Mapping Module
///
/// Bidirectional mapping between external user/item identifiers and dense
/// zero-based internal indices. Indices are assigned in input order and are
/// stable only for the lifetime of one fitted model instance.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdMappings {
    pub user_to_index: HashMap<String, usize>,
    pub item_to_index: HashMap<String, usize>,
    pub index_to_user: Vec<String>,
    pub index_to_item: Vec<String>,
}

impl IdMappings {
    /// Build both bijections from ordered identifier sequences.
    ///
    /// Duplicate identifiers within a sequence are rejected: silently keeping
    /// the last occurrence would shadow earlier index assignments, so callers
    /// must de-duplicate upstream.
    pub fn build(users: &[String], items: &[String]) -> Result<Self> {
        let (user_to_index, index_to_user) = build_index(users, "user")?;
        let (item_to_index, index_to_item) = build_index(items, "item")?;

        Ok(Self {
            user_to_index,
            item_to_index,
            index_to_user,
            index_to_item,
        })
    }

    pub fn num_users(&self) -> usize {
        self.index_to_user.len()
    }

    pub fn num_items(&self) -> usize {
        self.index_to_item.len()
    }

    pub fn user_index(&self, user_id: &str) -> Option<usize> {
        self.user_to_index.get(user_id).copied()
    }

    pub fn item_index(&self, item_id: &str) -> Option<usize> {
        self.item_to_index.get(item_id).copied()
    }

    pub fn user_id(&self, index: usize) -> Option<&str> {
        self.index_to_user.get(index).map(String::as_str)
    }

    pub fn item_id(&self, index: usize) -> Option<&str> {
        self.index_to_item.get(index).map(String::as_str)
    }
}

fn build_index(
    ids: &[String],
    namespace: &str,
) -> Result<(HashMap<String, usize>, Vec<String>)> {
    let mut forward = HashMap::with_capacity(ids.len());
    let mut reverse = Vec::with_capacity(ids.len());

    for id in ids {
        if forward.insert(id.clone(), reverse.len()).is_some() {
            return Err(EngineError::InvalidInput(format!(
                "duplicate {} identifier: {}",
                namespace, id
            )));
        }
        reverse.push(id.clone());
    }

    Ok((forward, reverse))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_indices_follow_input_order() {
        let mappings =
            IdMappings::build(&ids(&["u1", "u2"]), &ids(&["i1", "i2", "i3"])).unwrap();

        assert_eq!(mappings.user_index("u1"), Some(0));
        assert_eq!(mappings.user_index("u2"), Some(1));
        assert_eq!(mappings.item_index("i3"), Some(2));
        assert_eq!(mappings.num_users(), 2);
        assert_eq!(mappings.num_items(), 3);
    }

    #[test]
    fn test_reverse_mapping_is_consistent() {
        let mappings = IdMappings::build(&ids(&["a", "b", "c"]), &ids(&["x"])).unwrap();

        for id in ["a", "b", "c"] {
            let idx = mappings.user_index(id).unwrap();
            assert_eq!(mappings.user_id(idx), Some(id));
        }
        assert_eq!(mappings.item_id(0), Some("x"));
        assert_eq!(mappings.item_id(1), None);
    }

    #[test]
    fn test_unknown_identifier_is_none() {
        let mappings = IdMappings::build(&ids(&["u1"]), &ids(&["i1"])).unwrap();
        assert_eq!(mappings.user_index("missing"), None);
        assert_eq!(mappings.item_index("missing"), None);
    }

    #[test]
    fn test_duplicate_user_rejected() {
        let result = IdMappings::build(&ids(&["u1", "u2", "u1"]), &ids(&["i1"]));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let result = IdMappings::build(&ids(&["u1"]), &ids(&["i1", "i1"]));
        assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_empty_inputs() {
        let mappings = IdMappings::build(&[], &[]).unwrap();
        assert_eq!(mappings.num_users(), 0);
        assert_eq!(mappings.num_items(), 0);
    }
}
