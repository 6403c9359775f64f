//! Access-plan tree nodes
//!
//! A closed set of variants. Every traversal matches exhaustively, so adding
//! a node kind is a compile error everywhere it must be handled.

use std::collections::BTreeSet;
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::IndexKey;
use crate::query::{MatchExpr, PipelineStage, Projection, SortSpec};

/// One end of an index range, over query constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyBound {
    Unbounded,
    Included(Value),
    Excluded(Value),
}

impl KeyBound {
    /// Constant carried by this bound, if any
    pub fn value(&self) -> Option<&Value> {
        match self {
            KeyBound::Unbounded => None,
            KeyBound::Included(v) | KeyBound::Excluded(v) => Some(v),
        }
    }

    /// Same bound kind with a different constant
    pub fn with_value(&self, value: Value) -> Self {
        match self {
            KeyBound::Unbounded => KeyBound::Unbounded,
            KeyBound::Included(_) => KeyBound::Included(value),
            KeyBound::Excluded(_) => KeyBound::Excluded(value),
        }
    }

    /// Storage-level bound. Non-indexable constants widen to unbounded.
    pub fn to_key_bound(&self) -> Bound<IndexKey> {
        match self {
            KeyBound::Unbounded => Bound::Unbounded,
            KeyBound::Included(v) => IndexKey::from_json(v)
                .map(Bound::Included)
                .unwrap_or(Bound::Unbounded),
            KeyBound::Excluded(v) => IndexKey::from_json(v)
                .map(Bound::Excluded)
                .unwrap_or(Bound::Unbounded),
        }
    }
}

/// Key range scanned by an index scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBounds {
    pub lower: KeyBound,
    pub upper: KeyBound,
}

impl IndexBounds {
    /// Every key
    pub fn all() -> Self {
        Self {
            lower: KeyBound::Unbounded,
            upper: KeyBound::Unbounded,
        }
    }

    /// Exactly one key
    pub fn point(value: Value) -> Self {
        Self {
            lower: KeyBound::Included(value.clone()),
            upper: KeyBound::Included(value),
        }
    }

    /// True when both ends are the same included constant
    pub fn is_point(&self) -> bool {
        matches!(
            (&self.lower, &self.upper),
            (KeyBound::Included(a), KeyBound::Included(b)) if a == b
        )
    }

    pub fn to_key_bounds(&self) -> (Bound<IndexKey>, Bound<IndexKey>) {
        (self.lower.to_key_bound(), self.upper.to_key_bound())
    }

    /// `[1, 5)` style rendering
    pub fn describe(&self) -> String {
        let lower = match &self.lower {
            KeyBound::Unbounded => "(-inf".to_string(),
            KeyBound::Included(v) => format!("[{}", v),
            KeyBound::Excluded(v) => format!("({}", v),
        };
        let upper = match &self.upper {
            KeyBound::Unbounded => "+inf)".to_string(),
            KeyBound::Included(v) => format!("{}]", v),
            KeyBound::Excluded(v) => format!("{})", v),
        };
        format!("{}, {}", lower, upper)
    }
}

/// What a node hands to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputShape {
    /// Whole stored documents
    FullDocument,
    /// Only these fields (covered index keys or a projection)
    IndexKeys(BTreeSet<String>),
}

impl OutputShape {
    /// True if every field in `required` is available
    pub fn covers(&self, required: &BTreeSet<String>) -> bool {
        match self {
            OutputShape::FullDocument => true,
            OutputShape::IndexKeys(fields) => required.is_subset(fields),
        }
    }

    fn merge(self, other: OutputShape) -> OutputShape {
        match (self, other) {
            (OutputShape::FullDocument, OutputShape::FullDocument) => OutputShape::FullDocument,
            (OutputShape::FullDocument, keys) | (keys, OutputShape::FullDocument) => keys,
            (OutputShape::IndexKeys(a), OutputShape::IndexKeys(b)) => {
                OutputShape::IndexKeys(a.intersection(&b).cloned().collect())
            }
        }
    }
}

/// Access-plan tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SolutionNode {
    /// Full scan in record order, optionally filtered
    CollectionScan { filter: Option<MatchExpr> },
    /// Range scan over one index; yields index keys only
    IndexScan {
        index: String,
        field: String,
        bounds: IndexBounds,
    },
    /// Load the full document for each child result, then filter
    Fetch {
        filter: Option<MatchExpr>,
        child: Box<SolutionNode>,
    },
    /// Concatenate children in order
    Or { children: Vec<SolutionNode> },
    /// Drop records already returned
    Dedup { child: Box<SolutionNode> },
    Filter {
        filter: MatchExpr,
        child: Box<SolutionNode>,
    },
    Sort {
        spec: SortSpec,
        child: Box<SolutionNode>,
    },
    Projection {
        projection: Projection,
        child: Box<SolutionNode>,
    },
    Pipeline {
        stage: PipelineStage,
        child: Box<SolutionNode>,
    },
}

impl SolutionNode {
    pub fn collection_scan(filter: Option<MatchExpr>) -> Self {
        SolutionNode::CollectionScan { filter }
    }

    pub fn index_scan(index: impl Into<String>, field: impl Into<String>, bounds: IndexBounds) -> Self {
        SolutionNode::IndexScan {
            index: index.into(),
            field: field.into(),
            bounds,
        }
    }

    pub fn fetch(filter: Option<MatchExpr>, child: SolutionNode) -> Self {
        SolutionNode::Fetch {
            filter,
            child: Box::new(child),
        }
    }

    /// Short stage name used in explain output and shape summaries
    pub fn stage_name(&self) -> &'static str {
        match self {
            SolutionNode::CollectionScan { .. } => "COLLSCAN",
            SolutionNode::IndexScan { .. } => "IXSCAN",
            SolutionNode::Fetch { .. } => "FETCH",
            SolutionNode::Or { .. } => "OR",
            SolutionNode::Dedup { .. } => "DEDUP",
            SolutionNode::Filter { .. } => "FILTER",
            SolutionNode::Sort { .. } => "SORT",
            SolutionNode::Projection { .. } => "PROJECTION",
            SolutionNode::Pipeline { stage, .. } => match stage {
                PipelineStage::Skip(_) => "SKIP",
                PipelineStage::Limit(_) => "LIMIT",
            },
        }
    }

    /// Direct children in order
    pub fn children(&self) -> Vec<&SolutionNode> {
        match self {
            SolutionNode::CollectionScan { .. } | SolutionNode::IndexScan { .. } => Vec::new(),
            SolutionNode::Or { children } => children.iter().collect(),
            SolutionNode::Fetch { child, .. }
            | SolutionNode::Dedup { child }
            | SolutionNode::Filter { child, .. }
            | SolutionNode::Sort { child, .. }
            | SolutionNode::Projection { child, .. }
            | SolutionNode::Pipeline { child, .. } => vec![child.as_ref()],
        }
    }

    /// Output produced by this subtree
    pub fn provides(&self) -> OutputShape {
        match self {
            SolutionNode::CollectionScan { .. } | SolutionNode::Fetch { .. } => {
                OutputShape::FullDocument
            }
            SolutionNode::IndexScan { field, .. } => {
                OutputShape::IndexKeys(std::iter::once(field.clone()).collect())
            }
            SolutionNode::Or { children } => children
                .iter()
                .map(SolutionNode::provides)
                .reduce(OutputShape::merge)
                .unwrap_or(OutputShape::FullDocument),
            SolutionNode::Projection { projection, child } => match child.provides() {
                OutputShape::FullDocument => {
                    OutputShape::IndexKeys(projection.required_fields())
                }
                OutputShape::IndexKeys(fields) => OutputShape::IndexKeys(
                    fields
                        .intersection(&projection.required_fields())
                        .cloned()
                        .collect(),
                ),
            },
            SolutionNode::Dedup { child }
            | SolutionNode::Filter { child, .. }
            | SolutionNode::Sort { child, .. }
            | SolutionNode::Pipeline { child, .. } => child.provides(),
        }
    }

    /// Names of every index scanned in this subtree, in tree order
    pub fn indexes(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_indexes(&mut out);
        out
    }

    fn collect_indexes(&self, out: &mut Vec<String>) {
        if let SolutionNode::IndexScan { index, .. } = self {
            if !out.contains(index) {
                out.push(index.clone());
            }
        }
        for child in self.children() {
            child.collect_indexes(out);
        }
    }

    /// One-line deterministic rendering: `DEDUP(OR(FETCH(IXSCAN[a_1]),COLLSCAN))`
    pub fn summary(&self) -> String {
        let head = match self {
            SolutionNode::IndexScan { index, .. } => format!("IXSCAN[{}]", index),
            SolutionNode::Pipeline { stage, .. } => match stage {
                PipelineStage::Skip(n) => format!("SKIP[{}]", n),
                PipelineStage::Limit(n) => format!("LIMIT[{}]", n),
            },
            other => other.stage_name().to_string(),
        };
        let children = self.children();
        if children.is_empty() {
            head
        } else {
            let inner: Vec<String> = children.iter().map(|c| c.summary()).collect();
            format!("{}({})", head, inner.join(","))
        }
    }
}
