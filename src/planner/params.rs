//! Planning parameters handed to the single-branch planner

use std::collections::BTreeMap;

use crate::catalog::{Collection, IndexDescriptor};

/// Default cap on candidates generated per branch
pub const DEFAULT_MAX_CANDIDATES: usize = 16;

/// Index and collection metadata available for candidate generation.
///
/// Read-only during planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerParams {
    /// Index name to descriptor
    pub indexes: BTreeMap<String, IndexDescriptor>,
    /// Whether a full collection scan may be proposed
    pub include_collection_scan: bool,
    /// Upper bound on candidates per branch
    pub max_candidates: usize,
}

impl PlannerParams {
    pub fn new(indexes: impl IntoIterator<Item = IndexDescriptor>) -> Self {
        Self {
            indexes: indexes.into_iter().map(|d| (d.name.clone(), d)).collect(),
            include_collection_scan: true,
            max_candidates: DEFAULT_MAX_CANDIDATES,
        }
    }

    /// Parameters describing a collection's current indexes
    pub fn from_collection(coll: &Collection) -> Self {
        Self::new(coll.descriptors().cloned())
    }

    pub fn with_collection_scan(mut self, allowed: bool) -> Self {
        self.include_collection_scan = allowed;
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    /// Indexes on `field`, in index-name order
    pub fn indexes_on<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a IndexDescriptor> + 'a {
        self.indexes.values().filter(move |d| d.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_collection() {
        let mut c = Collection::new("t");
        c.insert(json!({"a": 1}));
        c.create_index(IndexDescriptor::new("b_1", "b")).unwrap();
        c.create_index(IndexDescriptor::new("a_1", "a")).unwrap();
        c.create_index(IndexDescriptor::new("a_2", "a")).unwrap();

        let params = PlannerParams::from_collection(&c);
        assert!(params.include_collection_scan);
        let on_a: Vec<&str> = params.indexes_on("a").map(|d| d.name.as_str()).collect();
        assert_eq!(on_a, vec!["a_1", "a_2"]);
    }
}
