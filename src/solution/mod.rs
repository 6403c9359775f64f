//! Access-plan trees
//!
//! A `QuerySolution` is an owned tree of `SolutionNode`s. Candidate plans,
//! branch winners and the composite OR solution are all expressed with it.
//!
//! # Invariants
//!
//! - Trees are immutable once handed to a consumer
//! - Rendering (`summary`, `explain`) is deterministic

mod explain;
mod node;

pub use explain::ExplainNode;
pub use node::{IndexBounds, KeyBound, OutputShape, SolutionNode};

use serde::{Deserialize, Serialize};

/// A complete access plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySolution {
    root: SolutionNode,
}

impl QuerySolution {
    pub fn new(root: SolutionNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &SolutionNode {
        &self.root
    }

    pub fn into_root(self) -> SolutionNode {
        self.root
    }

    /// Every index the plan scans, in tree order
    pub fn indexes_used(&self) -> Vec<String> {
        self.root.indexes()
    }

    /// Children of the first OR node found walking down from the root
    pub fn branch_count(&self) -> usize {
        self.branches().len()
    }

    /// The branch subtrees of the first OR, in order
    pub fn branches(&self) -> Vec<&SolutionNode> {
        let mut node = &self.root;
        loop {
            if let SolutionNode::Or { children } = node {
                return children.iter().collect();
            }
            match node.children().as_slice() {
                [only] => node = *only,
                _ => return Vec::new(),
            }
        }
    }

    /// One-line tree rendering
    pub fn shape_summary(&self) -> String {
        self.root.summary()
    }

    /// Indented multi-line explain text
    pub fn explain(&self) -> String {
        ExplainNode::from_node(&self.root).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn composite() -> QuerySolution {
        QuerySolution::new(SolutionNode::Dedup {
            child: Box::new(SolutionNode::Or {
                children: vec![
                    SolutionNode::fetch(
                        None,
                        SolutionNode::index_scan("a_1", "a", IndexBounds::point(json!(1))),
                    ),
                    SolutionNode::collection_scan(None),
                    SolutionNode::fetch(
                        None,
                        SolutionNode::index_scan("c_1", "c", IndexBounds::all()),
                    ),
                ],
            }),
        })
    }

    #[test]
    fn test_branch_count_walks_to_or() {
        let solution = composite();
        assert_eq!(solution.branch_count(), 3);
        assert_eq!(solution.branches()[1], &SolutionNode::collection_scan(None));
    }

    #[test]
    fn test_branch_count_without_or() {
        let solution = QuerySolution::new(SolutionNode::collection_scan(None));
        assert_eq!(solution.branch_count(), 0);
        assert!(solution.branches().is_empty());
    }

    #[test]
    fn test_indexes_used() {
        assert_eq!(composite().indexes_used(), vec!["a_1", "c_1"]);
    }

    #[test]
    fn test_explain_first_line() {
        let text = composite().explain();
        assert!(text.starts_with("DEDUP"));
        assert_eq!(text.lines().count(), 7);
    }
}
