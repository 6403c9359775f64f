//! Deterministic value ordering for the blocking sort stage

use std::cmp::Ordering;

use serde_json::Value;

use super::working_set::{WorkingSet, WsId};
use crate::query::{SortDirection, SortSpec};

/// Sorts buffered working set members
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts member ids by the sort field.
    ///
    /// Sort is stable: equal keys keep their input order.
    pub fn sort(ids: &mut [WsId], ws: &WorkingSet, spec: &SortSpec) {
        ids.sort_by(|a, b| {
            let a_val = ws.get(*a).and_then(|m| m.doc.get(&spec.field));
            let b_val = ws.get(*b).and_then(|m| m.doc.get(&spec.field));

            let ordering = Self::compare_values(a_val, b_val);

            match spec.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }

    /// Compares two JSON values for sorting.
    ///
    /// Ordering rules:
    /// - missing < null < bool < number < string
    /// - For same types, natural ordering
    pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a_val), Some(b_val)) => {
                let a_type = type_order(a_val);
                let b_type = type_order(b_val);
                if a_type != b_type {
                    return a_type.cmp(&b_type);
                }

                match (a_val, b_val) {
                    (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                    (Value::Number(x), Value::Number(y)) => {
                        if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                            return xi.cmp(&yi);
                        }
                        let xf = x.as_f64().unwrap_or(0.0);
                        let yf = y.as_f64().unwrap_or(0.0);
                        xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
                    }
                    (Value::String(x), Value::String(y)) => x.cmp(y),
                    // Null pairs, arrays and objects compare equal
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

fn type_order(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
