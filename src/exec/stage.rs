//! Runtime plan stages
//!
//! One `work` call on the root is one unit of work. Stages keep cursor
//! positions (record ids, index entries) and never borrow the collection
//! between calls, so the caller may release the collection lock after any
//! `work` call and re-acquire it before the next.

use std::collections::{HashSet, VecDeque};
use std::ops::Bound;

use serde_json::{Map, Value};

use super::errors::{ExecError, ExecResult};
use super::sorter::ResultSorter;
use super::working_set::{WorkingSet, WorkingSetMember, WsId};
use crate::catalog::{Collection, IndexKey, RecordId};
use crate::query::{MatchExpr, PipelineStage, PredicateFilter, Projection, SortSpec};
use crate::solution::SolutionNode;

/// Outcome of one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// A result is ready in the working set
    Advanced(WsId),
    /// Work was done but no result is ready yet
    NeedTime,
    /// No more results
    Eof,
}

/// Runtime stage tree
#[derive(Debug)]
pub enum PlanStage {
    CollectionScan(CollectionScanStage),
    IndexScan(IndexScanStage),
    Fetch(FetchStage),
    Or(OrStage),
    Dedup(DedupStage),
    Filter(FilterStage),
    Sort(SortStage),
    Projection(ProjectionStage),
    Skip(SkipStage),
    Limit(LimitStage),
}

impl PlanStage {
    /// Instantiate a runtime tree for an access plan
    pub fn from_solution(node: &SolutionNode) -> Self {
        match node {
            SolutionNode::CollectionScan { filter } => {
                PlanStage::CollectionScan(CollectionScanStage::new(filter.clone()))
            }
            SolutionNode::IndexScan {
                index,
                field,
                bounds,
            } => {
                let (lower, upper) = bounds.to_key_bounds();
                PlanStage::IndexScan(IndexScanStage::new(index.clone(), field.clone(), lower, upper))
            }
            SolutionNode::Fetch { filter, child } => {
                PlanStage::Fetch(FetchStage::new(filter.clone(), Self::from_solution(child)))
            }
            SolutionNode::Or { children } => {
                PlanStage::Or(OrStage::new(children.iter().map(Self::from_solution).collect()))
            }
            SolutionNode::Dedup { child } => PlanStage::Dedup(DedupStage::new(Self::from_solution(child))),
            SolutionNode::Filter { filter, child } => {
                PlanStage::Filter(FilterStage::new(filter.clone(), Self::from_solution(child)))
            }
            SolutionNode::Sort { spec, child } => {
                PlanStage::Sort(SortStage::new(spec.clone(), Self::from_solution(child)))
            }
            SolutionNode::Projection { projection, child } => PlanStage::Projection(
                ProjectionStage::new(projection.clone(), Self::from_solution(child)),
            ),
            SolutionNode::Pipeline { stage, child } => {
                Self::pipeline(*stage, Self::from_solution(child))
            }
        }
    }

    /// Wrap `child` in a skip or limit stage
    pub fn pipeline(stage: PipelineStage, child: PlanStage) -> Self {
        match stage {
            PipelineStage::Skip(n) => PlanStage::Skip(SkipStage::new(n, child)),
            PipelineStage::Limit(n) => PlanStage::Limit(LimitStage::new(n, child)),
        }
    }

    /// Perform one unit of work
    pub fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        match self {
            PlanStage::CollectionScan(s) => s.work(coll, ws),
            PlanStage::IndexScan(s) => s.work(coll, ws),
            PlanStage::Fetch(s) => s.work(coll, ws),
            PlanStage::Or(s) => s.work(coll, ws),
            PlanStage::Dedup(s) => s.work(coll, ws),
            PlanStage::Filter(s) => s.work(coll, ws),
            PlanStage::Sort(s) => s.work(coll, ws),
            PlanStage::Projection(s) => s.work(coll, ws),
            PlanStage::Skip(s) => s.work(coll, ws),
            PlanStage::Limit(s) => s.work(coll, ws),
        }
    }
}

/// Full scan in record order
#[derive(Debug)]
pub struct CollectionScanStage {
    filter: Option<MatchExpr>,
    position: Option<RecordId>,
    done: bool,
}

impl CollectionScanStage {
    pub fn new(filter: Option<MatchExpr>) -> Self {
        Self {
            filter,
            position: None,
            done: false,
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        if self.done {
            return Ok(StageState::Eof);
        }
        let rid = match coll.next_record_after(self.position) {
            Some(rid) => rid,
            None => {
                self.done = true;
                return Ok(StageState::Eof);
            }
        };
        self.position = Some(rid);

        let doc = match coll.get(rid)? {
            Some(doc) => doc,
            None => return Ok(StageState::NeedTime),
        };
        if let Some(filter) = &self.filter {
            if !PredicateFilter::matches(doc, filter) {
                return Ok(StageState::NeedTime);
            }
        }
        Ok(StageState::Advanced(ws.allocate(WorkingSetMember {
            rid,
            doc: doc.clone(),
        })))
    }
}

/// Range scan over a single-field index. Produces covered members holding
/// only the indexed field.
#[derive(Debug)]
pub struct IndexScanStage {
    index: String,
    field: String,
    lower: Bound<IndexKey>,
    upper: Bound<IndexKey>,
    position: Option<(IndexKey, RecordId)>,
    done: bool,
}

impl IndexScanStage {
    pub fn new(index: String, field: String, lower: Bound<IndexKey>, upper: Bound<IndexKey>) -> Self {
        Self {
            index,
            field,
            lower,
            upper,
            position: None,
            done: false,
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        if self.done {
            return Ok(StageState::Eof);
        }
        // A same-named index over another field is as good as dropped
        let tree = coll
            .index_on(&self.index, &self.field)
            .ok_or_else(|| ExecError::IndexDropped(self.index.clone()))?;

        let (key, rid) = match tree.next_in_range(&self.lower, &self.upper, self.position.as_ref()) {
            Some(entry) => entry,
            None => {
                self.done = true;
                return Ok(StageState::Eof);
            }
        };

        let mut doc = Map::new();
        doc.insert(self.field.clone(), key.to_json());
        self.position = Some((key, rid));
        Ok(StageState::Advanced(ws.allocate(WorkingSetMember {
            rid,
            doc: Value::Object(doc),
        })))
    }
}

/// Loads full documents for the child's record ids
#[derive(Debug)]
pub struct FetchStage {
    filter: Option<MatchExpr>,
    child: Box<PlanStage>,
}

impl FetchStage {
    pub fn new(filter: Option<MatchExpr>, child: PlanStage) -> Self {
        Self {
            filter,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        let id = match self.child.work(coll, ws)? {
            StageState::Advanced(id) => id,
            other => return Ok(other),
        };
        let rid = match ws.get(id) {
            Some(member) => member.rid,
            None => return Ok(StageState::NeedTime),
        };

        // Deleted since the index entry was read
        let doc = match coll.get(rid) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                ws.free(id);
                return Ok(StageState::NeedTime);
            }
            Err(err) => {
                ws.free(id);
                return Err(err.into());
            }
        };

        if let Some(filter) = &self.filter {
            if !PredicateFilter::matches(doc, filter) {
                ws.free(id);
                return Ok(StageState::NeedTime);
            }
        }
        if let Some(member) = ws.get_mut(id) {
            member.doc = doc.clone();
        }
        Ok(StageState::Advanced(id))
    }
}

/// Runs children to completion one after another
#[derive(Debug)]
pub struct OrStage {
    children: Vec<PlanStage>,
    current: usize,
}

impl OrStage {
    pub fn new(children: Vec<PlanStage>) -> Self {
        Self {
            children,
            current: 0,
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        let child = match self.children.get_mut(self.current) {
            Some(child) => child,
            None => return Ok(StageState::Eof),
        };
        match child.work(coll, ws)? {
            StageState::Eof => {
                self.current += 1;
                if self.current >= self.children.len() {
                    Ok(StageState::Eof)
                } else {
                    Ok(StageState::NeedTime)
                }
            }
            other => Ok(other),
        }
    }
}

/// Drops records whose id was already returned
#[derive(Debug)]
pub struct DedupStage {
    seen: HashSet<RecordId>,
    child: Box<PlanStage>,
}

impl DedupStage {
    pub fn new(child: PlanStage) -> Self {
        Self {
            seen: HashSet::new(),
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        let id = match self.child.work(coll, ws)? {
            StageState::Advanced(id) => id,
            other => return Ok(other),
        };
        let fresh = ws.get(id).map(|m| self.seen.insert(m.rid)).unwrap_or(false);
        if fresh {
            Ok(StageState::Advanced(id))
        } else {
            ws.free(id);
            Ok(StageState::NeedTime)
        }
    }
}

#[derive(Debug)]
pub struct FilterStage {
    filter: MatchExpr,
    child: Box<PlanStage>,
}

impl FilterStage {
    pub fn new(filter: MatchExpr, child: PlanStage) -> Self {
        Self {
            filter,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        let id = match self.child.work(coll, ws)? {
            StageState::Advanced(id) => id,
            other => return Ok(other),
        };
        let keep = ws
            .get(id)
            .map(|m| PredicateFilter::matches(&m.doc, &self.filter))
            .unwrap_or(false);
        if keep {
            Ok(StageState::Advanced(id))
        } else {
            ws.free(id);
            Ok(StageState::NeedTime)
        }
    }
}

/// Blocking sort: buffers every child result, then emits in order
#[derive(Debug)]
pub struct SortStage {
    spec: SortSpec,
    buffer: Vec<WsId>,
    sorted: Option<VecDeque<WsId>>,
    child: Box<PlanStage>,
}

impl SortStage {
    pub fn new(spec: SortSpec, child: PlanStage) -> Self {
        Self {
            spec,
            buffer: Vec::new(),
            sorted: None,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        if let Some(sorted) = &mut self.sorted {
            return Ok(match sorted.pop_front() {
                Some(id) => StageState::Advanced(id),
                None => StageState::Eof,
            });
        }
        match self.child.work(coll, ws)? {
            StageState::Advanced(id) => self.buffer.push(id),
            StageState::NeedTime => {}
            StageState::Eof => {
                let mut ids = std::mem::take(&mut self.buffer);
                ResultSorter::sort(&mut ids, ws, &self.spec);
                self.sorted = Some(ids.into());
            }
        }
        Ok(StageState::NeedTime)
    }
}

/// Inclusion projection; `_id` always kept
#[derive(Debug)]
pub struct ProjectionStage {
    projection: Projection,
    child: Box<PlanStage>,
}

impl ProjectionStage {
    pub fn new(projection: Projection, child: PlanStage) -> Self {
        Self {
            projection,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        let id = match self.child.work(coll, ws)? {
            StageState::Advanced(id) => id,
            other => return Ok(other),
        };
        if let Some(member) = ws.get_mut(id) {
            let mut out = Map::new();
            for field in self.projection.required_fields() {
                if let Some(v) = member.doc.get(&field) {
                    out.insert(field, v.clone());
                }
            }
            member.doc = Value::Object(out);
        }
        Ok(StageState::Advanced(id))
    }
}

#[derive(Debug)]
pub struct SkipStage {
    remaining: u64,
    child: Box<PlanStage>,
}

impl SkipStage {
    pub fn new(n: u64, child: PlanStage) -> Self {
        Self {
            remaining: n,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        match self.child.work(coll, ws)? {
            StageState::Advanced(id) if self.remaining > 0 => {
                self.remaining -= 1;
                ws.free(id);
                Ok(StageState::NeedTime)
            }
            other => Ok(other),
        }
    }
}

#[derive(Debug)]
pub struct LimitStage {
    remaining: u64,
    child: Box<PlanStage>,
}

impl LimitStage {
    pub fn new(n: u64, child: PlanStage) -> Self {
        Self {
            remaining: n,
            child: Box::new(child),
        }
    }

    fn work(&mut self, coll: &Collection, ws: &mut WorkingSet) -> ExecResult<StageState> {
        if self.remaining == 0 {
            return Ok(StageState::Eof);
        }
        let state = self.child.work(coll, ws)?;
        if let StageState::Advanced(_) = state {
            self.remaining -= 1;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexDescriptor;
    use crate::query::Predicate;
    use crate::solution::IndexBounds;
    use serde_json::json;

    fn coll() -> Collection {
        let mut c = Collection::new("t");
        for i in 0..10 {
            c.insert(json!({"_id": i, "a": i % 3, "b": i}));
        }
        c.create_index(IndexDescriptor::new("a_1", "a")).unwrap();
        c.create_index(IndexDescriptor::new("b_1", "b")).unwrap();
        c
    }

    fn drain(stage: &mut PlanStage, c: &Collection) -> ExecResult<Vec<Value>> {
        let mut ws = WorkingSet::new();
        let mut out = Vec::new();
        loop {
            match stage.work(c, &mut ws)? {
                StageState::Advanced(id) => out.push(ws.take(id).unwrap().doc),
                StageState::NeedTime => {}
                StageState::Eof => return Ok(out),
            }
        }
    }

    fn ids(docs: &[Value]) -> Vec<i64> {
        docs.iter().map(|d| d["_id"].as_i64().unwrap()).collect()
    }

    fn ixscan_fetch(index: &str, field: &str, v: Value) -> SolutionNode {
        SolutionNode::fetch(None, SolutionNode::index_scan(index, field, IndexBounds::point(v)))
    }

    #[test]
    fn test_collection_scan_filters() {
        let c = coll();
        let mut stage = PlanStage::from_solution(&SolutionNode::collection_scan(Some(
            MatchExpr::leaf(Predicate::eq("a", json!(1))),
        )));
        assert_eq!(ids(&drain(&mut stage, &c).unwrap()), vec![1, 4, 7]);
    }

    #[test]
    fn test_index_scan_is_covered() {
        let c = coll();
        let mut stage = PlanStage::from_solution(&SolutionNode::index_scan(
            "a_1",
            "a",
            IndexBounds::point(json!(2)),
        ));
        let docs = drain(&mut stage, &c).unwrap();
        assert_eq!(docs, vec![json!({"a": 2}), json!({"a": 2}), json!({"a": 2})]);
    }

    #[test]
    fn test_or_dedup_returns_each_record_once() {
        let c = coll();
        let tree = SolutionNode::Dedup {
            child: Box::new(SolutionNode::Or {
                children: vec![
                    ixscan_fetch("a_1", "a", json!(0)),
                    SolutionNode::fetch(
                        None,
                        SolutionNode::index_scan(
                            "b_1",
                            "b",
                            IndexBounds {
                                lower: crate::solution::KeyBound::Included(json!(0)),
                                upper: crate::solution::KeyBound::Excluded(json!(4)),
                            },
                        ),
                    ),
                ],
            }),
        };
        let mut stage = PlanStage::from_solution(&tree);
        assert_eq!(ids(&drain(&mut stage, &c).unwrap()), vec![0, 3, 6, 9, 1, 2]);
    }

    #[test]
    fn test_sort_projection_skip_limit() {
        let c = coll();
        let tree = SolutionNode::Pipeline {
            stage: PipelineStage::Limit(2),
            child: Box::new(SolutionNode::Pipeline {
                stage: PipelineStage::Skip(1),
                child: Box::new(SolutionNode::Projection {
                    projection: Projection::include(["b"]),
                    child: Box::new(SolutionNode::Sort {
                        spec: SortSpec::desc("b"),
                        child: Box::new(SolutionNode::collection_scan(None)),
                    }),
                }),
            }),
        };
        let mut stage = PlanStage::from_solution(&tree);
        let docs = drain(&mut stage, &c).unwrap();
        assert_eq!(docs, vec![json!({"_id": 8, "b": 8}), json!({"_id": 7, "b": 7})]);
    }

    #[test]
    fn test_dropped_index_fails_scan() {
        let mut c = coll();
        let mut stage = PlanStage::from_solution(&ixscan_fetch("a_1", "a", json!(0)));
        c.drop_index("a_1").unwrap();
        let err = drain(&mut stage, &c).unwrap_err();
        assert_eq!(err, ExecError::IndexDropped("a_1".into()));
    }

    #[test]
    fn test_rebuilt_index_on_other_field_fails_scan() {
        let mut c = coll();
        let mut stage = PlanStage::from_solution(&ixscan_fetch("a_1", "a", json!(0)));
        c.drop_index("a_1").unwrap();
        c.create_index(IndexDescriptor::new("a_1", "b")).unwrap();
        let err = drain(&mut stage, &c).unwrap_err();
        assert!(err.is_invalidation());
    }

    #[test]
    fn test_corrupt_record_fails_fetch() {
        let mut c = coll();
        c.mark_corrupt(RecordId(1));
        let mut stage = PlanStage::from_solution(&ixscan_fetch("a_1", "a", json!(0)));
        let err = drain(&mut stage, &c).unwrap_err();
        assert_eq!(err.code(), "EXEC_DATA_CORRUPTION");
    }

    #[test]
    fn test_stages_survive_collection_changes_between_works() {
        let mut c = coll();
        let mut ws = WorkingSet::new();
        let mut stage = PlanStage::from_solution(&SolutionNode::collection_scan(None));
        let first = match stage.work(&c, &mut ws).unwrap() {
            StageState::Advanced(id) => ws.take(id).unwrap().rid,
            other => panic!("unexpected {:?}", other),
        };
        c.remove(RecordId(first.0 + 1));
        let second = match stage.work(&c, &mut ws).unwrap() {
            StageState::Advanced(id) => ws.take(id).unwrap().rid,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(second, RecordId(first.0 + 2));
    }
}
