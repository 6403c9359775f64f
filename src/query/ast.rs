//! Query AST structures
//!
//! The predicate tree of a canonical query plus the stages that apply after
//! filtering (sort, projection, pipeline).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operation types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Equality: field = value
    Eq(Value),
    /// Greater than or equal: field >= value
    Gte(Value),
    /// Greater than: field > value
    Gt(Value),
    /// Less than or equal: field <= value
    Lte(Value),
    /// Less than: field < value
    Lt(Value),
}

impl FilterOp {
    /// Returns true if this is an equality operation
    pub fn is_equality(&self) -> bool {
        matches!(self, FilterOp::Eq(_))
    }

    /// Returns true if this is a range operation
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOp::Gte(_) | FilterOp::Gt(_) | FilterOp::Lte(_) | FilterOp::Lt(_)
        )
    }

    /// Returns the operation name for explain output
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "eq",
            FilterOp::Gte(_) => "gte",
            FilterOp::Gt(_) => "gt",
            FilterOp::Lte(_) => "lte",
            FilterOp::Lt(_) => "lt",
        }
    }

    /// The operand
    pub fn value(&self) -> &Value {
        match self {
            FilterOp::Eq(v)
            | FilterOp::Gte(v)
            | FilterOp::Gt(v)
            | FilterOp::Lte(v)
            | FilterOp::Lt(v) => v,
        }
    }

    /// Same operation with a different operand
    pub fn with_value(&self, value: Value) -> Self {
        match self {
            FilterOp::Eq(_) => FilterOp::Eq(value),
            FilterOp::Gte(_) => FilterOp::Gte(value),
            FilterOp::Gt(_) => FilterOp::Gt(value),
            FilterOp::Lte(_) => FilterOp::Lte(value),
            FilterOp::Lt(_) => FilterOp::Lt(value),
        }
    }
}

/// A single predicate (field + operation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Field name
    pub field: String,
    /// Filter operation
    pub op: FilterOp,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq(value),
        }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gte(value),
        }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt(value),
        }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lte(value),
        }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt(value),
        }
    }

    pub fn is_equality(&self) -> bool {
        self.op.is_equality()
    }

    pub fn is_range(&self) -> bool {
        self.op.is_range()
    }
}

/// Predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatchExpr {
    Leaf(Predicate),
    And(Vec<MatchExpr>),
    Or(Vec<MatchExpr>),
}

impl MatchExpr {
    pub fn leaf(predicate: Predicate) -> Self {
        MatchExpr::Leaf(predicate)
    }

    pub fn and(children: Vec<MatchExpr>) -> Self {
        MatchExpr::And(children)
    }

    pub fn or(children: Vec<MatchExpr>) -> Self {
        MatchExpr::Or(children)
    }

    pub fn is_or(&self) -> bool {
        matches!(self, MatchExpr::Or(_))
    }

    /// Every field referenced anywhere in the tree
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            MatchExpr::Leaf(p) => {
                out.insert(p.field.clone());
            }
            MatchExpr::And(children) | MatchExpr::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }

    /// Predicates that must all hold for the expression to hold: the leaf
    /// itself, or the direct leaf children of an AND. Nested ORs contribute
    /// nothing.
    pub fn conjunct_predicates(&self) -> Vec<&Predicate> {
        match self {
            MatchExpr::Leaf(p) => vec![p],
            MatchExpr::And(children) => children
                .iter()
                .filter_map(|c| match c {
                    MatchExpr::Leaf(p) => Some(p),
                    _ => None,
                })
                .collect(),
            MatchExpr::Or(_) => Vec::new(),
        }
    }

    /// Human-readable rendering for explain output
    pub fn describe(&self) -> String {
        match self {
            MatchExpr::Leaf(p) => format!("{} {} {}", p.field, p.op.op_name(), p.op.value()),
            MatchExpr::And(children) => format!(
                "and({})",
                children.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
            MatchExpr::Or(children) => format!(
                "or({})",
                children.iter().map(|c| c.describe()).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Inclusion projection; `_id` is always retained
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<String>,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Fields the projection reads, `_id` included
    pub fn required_fields(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.fields.iter().cloned().collect();
        out.insert("_id".to_string());
        out
    }
}

/// Pipeline stages pushed down below the disjunction's consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Skip(u64),
    Limit(u64),
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Skip(_) => "skip",
            PipelineStage::Limit(_) => "limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_predicate_types() {
        let eq = Predicate::eq("name", json!("Alice"));
        assert!(eq.is_equality());
        assert!(!eq.is_range());

        let gte = Predicate::gte("age", json!(18));
        assert!(!gte.is_equality());
        assert!(gte.is_range());
    }

    #[test]
    fn test_fields_collects_nested() {
        let expr = MatchExpr::or(vec![
            MatchExpr::leaf(Predicate::eq("a", json!(1))),
            MatchExpr::and(vec![
                MatchExpr::leaf(Predicate::gt("b", json!(2))),
                MatchExpr::leaf(Predicate::lt("c", json!(3))),
            ]),
        ]);
        let fields: Vec<String> = expr.fields().into_iter().collect();
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_conjunct_predicates_skip_nested_or() {
        let expr = MatchExpr::and(vec![
            MatchExpr::leaf(Predicate::eq("a", json!(1))),
            MatchExpr::or(vec![MatchExpr::leaf(Predicate::eq("b", json!(2)))]),
        ]);
        let preds = expr.conjunct_predicates();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].field, "a");
    }

    #[test]
    fn test_projection_keeps_id() {
        let proj = Projection::include(["name"]);
        assert!(proj.required_fields().contains("_id"));
        assert!(proj.required_fields().contains("name"));
    }

    #[test]
    fn test_describe() {
        let expr = MatchExpr::leaf(Predicate::eq("a", json!(1)));
        assert_eq!(expr.describe(), "a eq 1");
    }
}
