//! Ordered single-field index
//!
//! Entries are `(IndexKey, RecordId)` pairs in a `BTreeSet`, so iteration is
//! deterministic and a scan can resume strictly after the last entry it
//! returned without holding any borrow between calls.

use std::collections::BTreeSet;
use std::ops::Bound;

use serde_json::Value;

use super::collection::RecordId;

/// Index key representing a scalar field value.
///
/// Ordering is total: Null < Bool < Number < String. All numbers share one
/// variant so integers and floats interleave numerically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Null,
    Bool(bool),
    /// f64 bits remapped for total ordering
    Number(u64),
    String(String),
}

impl IndexKey {
    /// Create a key from a float using the order-preserving bit mapping
    pub fn from_f64(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits // Negative: flip all bits
        } else {
            bits ^ (1 << 63) // Positive: flip sign bit
        };
        IndexKey::Number(ordered)
    }

    /// Create a key from a JSON value. Arrays and objects are not indexed.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::from_f64),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// JSON rendering of the key, as produced by covered index scans.
    ///
    /// Integral numbers come back as integers.
    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::Null => Value::Null,
            IndexKey::Bool(b) => Value::Bool(*b),
            IndexKey::Number(ordered) => {
                let bits = if (ordered >> 63) == 1 {
                    ordered ^ (1 << 63)
                } else {
                    !ordered
                };
                let v = f64::from_bits(bits);
                if v.fract() == 0.0 && v.abs() < 9.0e15 {
                    Value::from(v as i64)
                } else {
                    serde_json::Number::from_f64(v)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            IndexKey::String(s) => Value::String(s.clone()),
        }
    }
}

/// A single field index
#[derive(Debug, Default, Clone)]
pub struct IndexTree {
    entries: BTreeSet<(IndexKey, RecordId)>,
}

impl IndexTree {
    pub fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    pub fn insert(&mut self, key: IndexKey, rid: RecordId) {
        self.entries.insert((key, rid));
    }

    pub fn remove(&mut self, key: &IndexKey, rid: RecordId) {
        self.entries.remove(&(key.clone(), rid));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry inside `[lower, upper]` that sorts strictly after `after`.
    pub fn next_in_range(
        &self,
        lower: &Bound<IndexKey>,
        upper: &Bound<IndexKey>,
        after: Option<&(IndexKey, RecordId)>,
    ) -> Option<(IndexKey, RecordId)> {
        let start = match after {
            Some(pos) => Bound::Excluded(pos.clone()),
            None => match lower {
                Bound::Included(k) => Bound::Included((k.clone(), RecordId::MIN)),
                Bound::Excluded(k) => Bound::Excluded((k.clone(), RecordId::MAX)),
                Bound::Unbounded => Bound::Unbounded,
            },
        };
        let end = match upper {
            Bound::Included(k) => Bound::Included((k.clone(), RecordId::MAX)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), RecordId::MIN)),
            Bound::Unbounded => Bound::Unbounded,
        };
        if range_is_empty(&start, &end) {
            return None;
        }
        self.entries.range((start, end)).next().cloned()
    }
}

/// `BTreeSet::range` panics on inverted ranges; detect them first.
fn range_is_empty(
    start: &Bound<(IndexKey, RecordId)>,
    end: &Bound<(IndexKey, RecordId)>,
) -> bool {
    match (start, end) {
        (Bound::Included(s), Bound::Included(e)) => s > e,
        (Bound::Included(s), Bound::Excluded(e))
        | (Bound::Excluded(s), Bound::Included(e))
        | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(v: Value) -> IndexKey {
        IndexKey::from_json(&v).unwrap()
    }

    fn tree() -> IndexTree {
        let mut t = IndexTree::new();
        t.insert(key(json!(3)), RecordId(1));
        t.insert(key(json!(1)), RecordId(2));
        t.insert(key(json!(2)), RecordId(3));
        t.insert(key(json!(2)), RecordId(4));
        t.insert(key(json!("x")), RecordId(5));
        t
    }

    fn collect(t: &IndexTree, lower: Bound<IndexKey>, upper: Bound<IndexKey>) -> Vec<RecordId> {
        let mut out = Vec::new();
        let mut pos = None;
        while let Some(entry) = t.next_in_range(&lower, &upper, pos.as_ref()) {
            out.push(entry.1);
            pos = Some(entry);
        }
        out
    }

    #[test]
    fn test_number_ordering_mixes_int_and_float() {
        assert!(key(json!(1)) < key(json!(1.5)));
        assert!(key(json!(1.5)) < key(json!(2)));
        assert!(key(json!(-3)) < key(json!(-0.5)));
    }

    #[test]
    fn test_type_ordering() {
        assert!(IndexKey::Null < key(json!(false)));
        assert!(key(json!(true)) < key(json!(-100)));
        assert!(key(json!(1e9)) < key(json!("")));
    }

    #[test]
    fn test_arrays_not_indexable() {
        assert!(IndexKey::from_json(&json!([1])).is_none());
        assert!(IndexKey::from_json(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_key_back_to_json() {
        assert_eq!(key(json!(42)).to_json(), json!(42));
        assert_eq!(key(json!(-7)).to_json(), json!(-7));
        assert_eq!(key(json!(2.5)).to_json(), json!(2.5));
        assert_eq!(key(json!("s")).to_json(), json!("s"));
    }

    #[test]
    fn test_equality_range() {
        let t = tree();
        let k = key(json!(2));
        let rids = collect(&t, Bound::Included(k.clone()), Bound::Included(k));
        assert_eq!(rids, vec![RecordId(3), RecordId(4)]);
    }

    #[test]
    fn test_exclusive_bounds() {
        let t = tree();
        let rids = collect(
            &t,
            Bound::Excluded(key(json!(1))),
            Bound::Excluded(key(json!(3))),
        );
        assert_eq!(rids, vec![RecordId(3), RecordId(4)]);
    }

    #[test]
    fn test_unbounded_scan_in_key_order() {
        let t = tree();
        let rids = collect(&t, Bound::Unbounded, Bound::Unbounded);
        assert_eq!(
            rids,
            vec![RecordId(2), RecordId(3), RecordId(4), RecordId(1), RecordId(5)]
        );
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let t = tree();
        let rids = collect(
            &t,
            Bound::Included(key(json!(3))),
            Bound::Included(key(json!(1))),
        );
        assert!(rids.is_empty());
    }
}
