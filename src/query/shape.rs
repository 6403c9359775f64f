//! Normalized query shape and its plan cache key
//!
//! Filter constants are replaced by their type class, so queries that differ
//! only in constants share a shape. Sort, projection and pipeline stages are
//! part of the shape as written.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::ast::{MatchExpr, PipelineStage, Projection, SortSpec};
use super::canonical::CanonicalQuery;
use crate::cache::PlanCacheKey;

/// Type class standing in for a constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeClass {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl TypeClass {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => TypeClass::Null,
            Value::Bool(_) => TypeClass::Bool,
            Value::Number(_) => TypeClass::Number,
            Value::String(_) => TypeClass::String,
            Value::Array(_) => TypeClass::Array,
            Value::Object(_) => TypeClass::Object,
        }
    }
}

/// Filter tree with constants erased
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FilterShape {
    Leaf {
        field: String,
        op: &'static str,
        operand: TypeClass,
    },
    And(Vec<FilterShape>),
    Or(Vec<FilterShape>),
}

impl FilterShape {
    pub fn of(expr: &MatchExpr) -> Self {
        match expr {
            MatchExpr::Leaf(p) => FilterShape::Leaf {
                field: p.field.clone(),
                op: p.op.op_name(),
                operand: TypeClass::of(p.op.value()),
            },
            MatchExpr::And(children) => FilterShape::And(children.iter().map(Self::of).collect()),
            MatchExpr::Or(children) => FilterShape::Or(children.iter().map(Self::of).collect()),
        }
    }
}

/// Normalized shape of a canonical query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryShape {
    pub collection: String,
    pub filter: FilterShape,
    pub sort: Option<SortSpec>,
    pub projection: Option<Projection>,
    pub pipeline: Vec<PipelineStage>,
}

impl QueryShape {
    pub fn of(query: &CanonicalQuery) -> Self {
        Self {
            collection: query.collection().to_string(),
            filter: FilterShape::of(query.filter()),
            sort: query.sort().cloned(),
            projection: query.projection().cloned(),
            pipeline: query.pipeline().to_vec(),
        }
    }

    /// Canonical serialized form
    pub fn canonical_bytes(&self) -> Vec<u8> {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// SHA-256 of the canonical form, hex encoded
    pub fn cache_key(&self) -> PlanCacheKey {
        let digest = Sha256::digest(self.canonical_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        PlanCacheKey::new(hex)
    }
}

impl CanonicalQuery {
    /// Normalized shape of this query
    pub fn shape(&self) -> QueryShape {
        QueryShape::of(self)
    }

    /// Plan cache key for this query's shape
    pub fn cache_key(&self) -> PlanCacheKey {
        self.shape().cache_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Predicate;
    use serde_json::json;

    fn query(a: Value, b: Value) -> CanonicalQuery {
        CanonicalQuery::builder(
            "users",
            MatchExpr::or(vec![
                MatchExpr::leaf(Predicate::eq("a", a)),
                MatchExpr::leaf(Predicate::gt("b", b)),
            ]),
        )
        .build()
        .unwrap()
    }

    #[test]
    fn test_constants_do_not_change_key() {
        let k1 = query(json!(1), json!(10)).cache_key();
        let k2 = query(json!(7), json!(99)).cache_key();
        assert_eq!(k1, k2);
    }

    #[test]
    fn test_type_class_changes_key() {
        let k1 = query(json!(1), json!(10)).cache_key();
        let k2 = query(json!("one"), json!(10)).cache_key();
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_branch_order_changes_key() {
        let q1 = query(json!(1), json!(2));
        let q2 = CanonicalQuery::builder(
            "users",
            MatchExpr::or(vec![
                MatchExpr::leaf(Predicate::gt("b", json!(2))),
                MatchExpr::leaf(Predicate::eq("a", json!(1))),
            ]),
        )
        .build()
        .unwrap();
        assert_ne!(q1.cache_key(), q2.cache_key());
    }

    #[test]
    fn test_key_is_hex_sha256() {
        let key = query(json!(1), json!(2)).cache_key();
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
