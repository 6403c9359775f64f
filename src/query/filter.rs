//! Predicate evaluation against documents
//!
//! No type coercion: numbers compare with numbers, strings with strings.
//! Missing and null fields never match.

use std::cmp::Ordering;

use serde_json::Value;

use super::ast::{FilterOp, MatchExpr, Predicate};

/// Evaluates predicate trees against documents
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a document satisfies the expression
    pub fn matches(document: &Value, expr: &MatchExpr) -> bool {
        match expr {
            MatchExpr::Leaf(pred) => Self::matches_predicate(document, pred),
            MatchExpr::And(children) => children.iter().all(|c| Self::matches(document, c)),
            MatchExpr::Or(children) => children.iter().any(|c| Self::matches(document, c)),
        }
    }

    /// Checks if a document matches a single predicate
    pub fn matches_predicate(document: &Value, predicate: &Predicate) -> bool {
        let field_value = match document.get(&predicate.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &predicate.op {
            FilterOp::Eq(expected) => field_value == expected,
            FilterOp::Gte(bound) => {
                matches!(compare(field_value, bound), Some(Ordering::Greater | Ordering::Equal))
            }
            FilterOp::Gt(bound) => matches!(compare(field_value, bound), Some(Ordering::Greater)),
            FilterOp::Lte(bound) => {
                matches!(compare(field_value, bound), Some(Ordering::Less | Ordering::Equal))
            }
            FilterOp::Lt(bound) => matches!(compare(field_value, bound), Some(Ordering::Less)),
        }
    }
}

/// Same-type comparison; `None` when the types are not comparable.
fn compare(actual: &Value, bound: &Value) -> Option<Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                return Some(ai.cmp(&bi));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
