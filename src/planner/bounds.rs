//! Index bounds derivation
//!
//! Bounds intersect every usable predicate on the indexed field. A bound is
//! only ever a superset of the matching keys: the fetch above the index scan
//! re-applies the whole branch, so loose bounds cost work, never results.
//!
//! Operands that are null, arrays or objects are not usable for bounds.

use std::cmp::Ordering;

use serde_json::Value;

use crate::catalog::IndexKey;
use crate::query::{FilterOp, Predicate};
use crate::solution::{IndexBounds, KeyBound};

/// Derive bounds for `field` from the given conjunct predicates.
///
/// Returns `None` when no predicate on the field is usable.
pub fn bounds_for_field(field: &str, predicates: &[&Predicate]) -> Option<IndexBounds> {
    let mut bounds: Option<IndexBounds> = None;
    for pred in predicates.iter().filter(|p| p.field == field) {
        if !is_bound_operand(pred.op.value()) {
            continue;
        }
        let next = single(&pred.op);
        bounds = Some(match bounds {
            None => next,
            Some(current) => intersect(current, next),
        });
    }
    bounds
}

/// True if the operand can bound an index scan
pub fn is_bound_operand(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn single(op: &FilterOp) -> IndexBounds {
    match op {
        FilterOp::Eq(v) => IndexBounds::point(v.clone()),
        FilterOp::Gte(v) => IndexBounds {
            lower: KeyBound::Included(v.clone()),
            upper: KeyBound::Unbounded,
        },
        FilterOp::Gt(v) => IndexBounds {
            lower: KeyBound::Excluded(v.clone()),
            upper: KeyBound::Unbounded,
        },
        FilterOp::Lte(v) => IndexBounds {
            lower: KeyBound::Unbounded,
            upper: KeyBound::Included(v.clone()),
        },
        FilterOp::Lt(v) => IndexBounds {
            lower: KeyBound::Unbounded,
            upper: KeyBound::Excluded(v.clone()),
        },
    }
}

fn intersect(a: IndexBounds, b: IndexBounds) -> IndexBounds {
    IndexBounds {
        lower: tighter(a.lower, b.lower, Ordering::Greater),
        upper: tighter(a.upper, b.upper, Ordering::Less),
    }
}

/// Pick the tighter of two bounds. `prefer` is the key ordering that makes a
/// bound tighter (greater for lower bounds, less for upper bounds).
fn tighter(a: KeyBound, b: KeyBound, prefer: Ordering) -> KeyBound {
    let (ka, kb) = match (a.value().and_then(IndexKey::from_json), b.value().and_then(IndexKey::from_json)) {
        (None, _) => return b,
        (_, None) => return a,
        (Some(ka), Some(kb)) => (ka, kb),
    };
    match ka.cmp(&kb) {
        Ordering::Equal => {
            if matches!(a, KeyBound::Excluded(_)) {
                a
            } else {
                b
            }
        }
        ord if ord == prefer => a,
        _ => b,
    }
}
