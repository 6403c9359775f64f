//! Canonical query
//!
//! Immutable once built. The subplanner only ever borrows it.

use super::ast::{MatchExpr, PipelineStage, Projection, SortSpec};
use super::errors::{QueryError, QueryResult};

/// A normalized query ready for planning
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalQuery {
    collection: String,
    filter: MatchExpr,
    sort: Option<SortSpec>,
    projection: Option<Projection>,
    pipeline: Vec<PipelineStage>,
}

/// The disjunction the subplanner splits on.
///
/// `residual` holds the conjuncts that sit next to a contained OR
/// (`AND(OR(..), x, y)`); they become a post-filter above the composite.
#[derive(Debug, Clone, Copy)]
pub struct Disjunction<'q> {
    pub branches: &'q [MatchExpr],
    pub residual: &'q [MatchExpr],
    or_position: Option<usize>,
}

impl<'q> Disjunction<'q> {
    /// Number of branches
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Conjuncts other than the OR itself
    pub fn residual_conjuncts(&self) -> Vec<&'q MatchExpr> {
        self.residual
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != self.or_position)
            .map(|(_, e)| e)
            .collect()
    }

    /// The residual conjuncts as one filter, if any
    pub fn residual_filter(&self) -> Option<MatchExpr> {
        match self.residual_conjuncts().as_slice() {
            [] => None,
            [only] => Some((*only).clone()),
            many => Some(MatchExpr::and(many.iter().map(|e| (*e).clone()).collect())),
        }
    }
}

impl CanonicalQuery {
    /// Start building a query over `collection`
    pub fn builder(collection: impl Into<String>, filter: MatchExpr) -> CanonicalQueryBuilder {
        CanonicalQueryBuilder {
            collection: collection.into(),
            filter,
            sort: None,
            projection: None,
            pipeline: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter(&self) -> &MatchExpr {
        &self.filter
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn pipeline(&self) -> &[PipelineStage] {
        &self.pipeline
    }

    /// The OR this query can be split on.
    ///
    /// Rooted `OR(..)` splits directly. `AND(..)` splits when exactly one of
    /// its children is an OR.
    pub fn disjunction(&self) -> Option<Disjunction<'_>> {
        match &self.filter {
            MatchExpr::Or(branches) => Some(Disjunction {
                branches,
                residual: &[],
                or_position: None,
            }),
            MatchExpr::And(children) => {
                let mut ors = children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.is_or());
                let (position, or_expr) = ors.next()?;
                if ors.next().is_some() {
                    return None;
                }
                match or_expr {
                    MatchExpr::Or(branches) => Some(Disjunction {
                        branches,
                        residual: children,
                        or_position: Some(position),
                    }),
                    _ => None,
                }
            }
            MatchExpr::Leaf(_) => None,
        }
    }

    /// True if subplanning applies to this query
    pub fn can_use_subplanning(&self) -> bool {
        self.disjunction().map(|d| !d.is_empty()).unwrap_or(false)
    }
}

/// Builder for `CanonicalQuery`
#[derive(Debug, Clone)]
pub struct CanonicalQueryBuilder {
    collection: String,
    filter: MatchExpr,
    sort: Option<SortSpec>,
    projection: Option<Projection>,
    pipeline: Vec<PipelineStage>,
}

impl CanonicalQueryBuilder {
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.pipeline.push(PipelineStage::Skip(n));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.pipeline.push(PipelineStage::Limit(n));
        self
    }

    /// Validate and freeze the query
    pub fn build(self) -> QueryResult<CanonicalQuery> {
        if self.collection.is_empty() {
            return Err(QueryError::EmptyCollection);
        }
        validate_expr(&self.filter)?;
        if let Some(projection) = &self.projection {
            if projection.fields.is_empty() {
                return Err(QueryError::EmptyProjection);
            }
        }
        Ok(CanonicalQuery {
            collection: self.collection,
            filter: self.filter,
            sort: self.sort,
            projection: self.projection,
            pipeline: self.pipeline,
        })
    }
}

fn validate_expr(expr: &MatchExpr) -> QueryResult<()> {
    match expr {
        MatchExpr::Leaf(p) => {
            if p.field.is_empty() {
                return Err(QueryError::EmptyField);
            }
            Ok(())
        }
        MatchExpr::And(children) => {
            if children.is_empty() {
                return Err(QueryError::EmptyLogical("and"));
            }
            children.iter().try_for_each(validate_expr)
        }
        MatchExpr::Or(children) => {
            if children.is_empty() {
                return Err(QueryError::EmptyLogical("or"));
            }
            children.iter().try_for_each(validate_expr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Predicate;
    use serde_json::json;

    fn eq(field: &str, v: i64) -> MatchExpr {
        MatchExpr::leaf(Predicate::eq(field, json!(v)))
    }

    #[test]
    fn test_rooted_or_is_subplannable() {
        let q = CanonicalQuery::builder("users", MatchExpr::or(vec![eq("a", 1), eq("b", 2)]))
            .build()
            .unwrap();
        let d = q.disjunction().unwrap();
        assert_eq!(d.len(), 2);
        assert!(d.residual_conjuncts().is_empty());
        assert!(q.can_use_subplanning());
    }

    #[test]
    fn test_contained_or_has_residual() {
        let q = CanonicalQuery::builder(
            "users",
            MatchExpr::and(vec![eq("x", 5), MatchExpr::or(vec![eq("a", 1), eq("b", 2)])]),
        )
        .build()
        .unwrap();
        let d = q.disjunction().unwrap();
        assert_eq!(d.len(), 2);
        let residual = d.residual_conjuncts();
        assert_eq!(residual.len(), 1);
        assert_eq!(residual[0], &eq("x", 5));
        assert_eq!(d.residual_filter(), Some(eq("x", 5)));
    }

    #[test]
    fn test_two_contained_ors_not_subplannable() {
        let q = CanonicalQuery::builder(
            "users",
            MatchExpr::and(vec![
                MatchExpr::or(vec![eq("a", 1)]),
                MatchExpr::or(vec![eq("b", 2)]),
            ]),
        )
        .build()
        .unwrap();
        assert!(!q.can_use_subplanning());
    }

    #[test]
    fn test_leaf_not_subplannable() {
        let q = CanonicalQuery::builder("users", eq("a", 1)).build().unwrap();
        assert!(q.disjunction().is_none());
    }

    #[test]
    fn test_empty_or_rejected() {
        let err = CanonicalQuery::builder("users", MatchExpr::or(vec![]))
            .build()
            .unwrap_err();
        assert_eq!(err, QueryError::EmptyLogical("or"));
    }

    #[test]
    fn test_empty_collection_rejected() {
        let err = CanonicalQuery::builder("", eq("a", 1)).build().unwrap_err();
        assert_eq!(err.code(), "QUERY_EMPTY_COLLECTION");
    }
}
