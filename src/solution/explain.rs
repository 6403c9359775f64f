//! Explain output for access-plan trees
//!
//! Deterministic, human-readable, one stage per line indented by depth.

use std::fmt;

use serde::Serialize;

use super::node::SolutionNode;
use crate::query::PipelineStage;

/// Explained stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainNode {
    /// Stage name (`IXSCAN`, `OR`, ...)
    pub stage: String,
    /// Stage details, empty when the stage has none
    pub details: Vec<String>,
    /// Children in execution order
    pub children: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Builds the explain tree for a solution node
    pub fn from_node(node: &SolutionNode) -> Self {
        let details = match node {
            SolutionNode::CollectionScan { filter } => filter
                .iter()
                .map(|f| format!("filter: {}", f.describe()))
                .collect(),
            SolutionNode::IndexScan {
                index,
                field,
                bounds,
            } => vec![
                format!("index: {}", index),
                format!("bounds: {} {}", field, bounds.describe()),
            ],
            SolutionNode::Fetch { filter, .. } => filter
                .iter()
                .map(|f| format!("filter: {}", f.describe()))
                .collect(),
            SolutionNode::Or { children } => vec![format!("branches: {}", children.len())],
            SolutionNode::Dedup { .. } => vec!["key: record id".to_string()],
            SolutionNode::Filter { filter, .. } => vec![format!("filter: {}", filter.describe())],
            SolutionNode::Sort { spec, .. } => {
                vec![format!("sort: {} {}", spec.field, spec.direction.as_str())]
            }
            SolutionNode::Projection { projection, .. } => {
                vec![format!("fields: {}", projection.fields.join(", "))]
            }
            SolutionNode::Pipeline { stage, .. } => match stage {
                PipelineStage::Skip(n) | PipelineStage::Limit(n) => {
                    vec![format!("{}: {}", stage.name(), n)]
                }
            },
        };

        Self {
            stage: node.stage_name().to_string(),
            details,
            children: node.children().into_iter().map(Self::from_node).collect(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        if self.details.is_empty() {
            writeln!(f, "{}{}", pad, self.stage)?;
        } else {
            writeln!(f, "{}{} {{{}}}", pad, self.stage, self.details.join("; "))?;
        }
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ExplainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
