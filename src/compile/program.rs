//! Executable program form of an access plan
//!
//! A program is a flat, post-order list of ops; each op names its inputs by
//! position and the root is the last op. Field names, index names and query
//! constants live in `AuxData`, so the op list itself depends only on the
//! query shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{CompileError, CompileResult};
use crate::exec::{
    CollectionScanStage, DedupStage, FetchStage, FilterStage, IndexScanStage, OrStage, PlanStage,
    ProjectionStage, SortStage,
};
use crate::query::{FilterOp, MatchExpr, PipelineStage, Predicate, Projection, SortDirection, SortSpec};
use crate::solution::KeyBound;

/// Reference to a constant in `AuxData::params`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRef(pub usize);

/// Reference to a field name in `AuxData::slots`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn of(op: &FilterOp) -> Self {
        match op {
            FilterOp::Eq(_) => CmpOp::Eq,
            FilterOp::Gt(_) => CmpOp::Gt,
            FilterOp::Gte(_) => CmpOp::Gte,
            FilterOp::Lt(_) => CmpOp::Lt,
            FilterOp::Lte(_) => CmpOp::Lte,
        }
    }

    fn with_value(self, value: Value) -> FilterOp {
        match self {
            CmpOp::Eq => FilterOp::Eq(value),
            CmpOp::Gt => FilterOp::Gt(value),
            CmpOp::Gte => FilterOp::Gte(value),
            CmpOp::Lt => FilterOp::Lt(value),
            CmpOp::Lte => FilterOp::Lte(value),
        }
    }
}

/// Predicate tree with fields and constants bound through slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterProgram {
    Leaf { slot: SlotRef, op: CmpOp, param: ParamRef },
    And(Vec<FilterProgram>),
    Or(Vec<FilterProgram>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundProgram {
    Unbounded,
    Included(ParamRef),
    Excluded(ParamRef),
}

/// One program op
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanOp {
    CollectionScan {
        filter: Option<FilterProgram>,
    },
    IndexScan {
        index: usize,
        slot: SlotRef,
        lower: BoundProgram,
        upper: BoundProgram,
    },
    Fetch {
        input: usize,
        filter: Option<FilterProgram>,
    },
    Or {
        inputs: Vec<usize>,
    },
    Dedup {
        input: usize,
    },
    Filter {
        input: usize,
        filter: FilterProgram,
    },
    Sort {
        input: usize,
        slot: SlotRef,
        direction: SortDirection,
    },
    Projection {
        input: usize,
        slots: Vec<SlotRef>,
    },
    Skip {
        input: usize,
        n: u64,
    },
    Limit {
        input: usize,
        n: u64,
    },
}

impl PlanOp {
    /// Positions of the ops this op consumes
    pub fn inputs(&self) -> Vec<usize> {
        match self {
            PlanOp::CollectionScan { .. } | PlanOp::IndexScan { .. } => Vec::new(),
            PlanOp::Or { inputs } => inputs.clone(),
            PlanOp::Fetch { input, .. }
            | PlanOp::Dedup { input }
            | PlanOp::Filter { input, .. }
            | PlanOp::Sort { input, .. }
            | PlanOp::Projection { input, .. }
            | PlanOp::Skip { input, .. }
            | PlanOp::Limit { input, .. } => vec![*input],
        }
    }
}

/// Runtime bindings for a program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxData {
    /// Field names referenced by the program
    pub slots: Vec<String>,
    /// Index names referenced by the program
    pub indexes: Vec<String>,
    /// Query constants, in first-use order
    pub params: Vec<Value>,
    /// Catalog epoch the program was compiled against
    pub catalog_epoch: u64,
}

impl AuxData {
    pub fn new(catalog_epoch: u64) -> Self {
        Self {
            catalog_epoch,
            ..Self::default()
        }
    }

    /// Slot for `field`, allocating on first use
    pub fn bind_slot(&mut self, field: &str) -> SlotRef {
        match self.slots.iter().position(|s| s == field) {
            Some(i) => SlotRef(i),
            None => {
                self.slots.push(field.to_string());
                SlotRef(self.slots.len() - 1)
            }
        }
    }

    pub fn bind_index(&mut self, name: &str) -> usize {
        match self.indexes.iter().position(|s| s == name) {
            Some(i) => i,
            None => {
                self.indexes.push(name.to_string());
                self.indexes.len() - 1
            }
        }
    }

    pub fn bind_param(&mut self, value: Value) -> ParamRef {
        self.params.push(value);
        ParamRef(self.params.len() - 1)
    }

    pub(crate) fn slot(&self, slot: SlotRef) -> CompileResult<&str> {
        self.slots
            .get(slot.0)
            .map(String::as_str)
            .ok_or_else(|| CompileError::MalformedPlan(format!("unbound slot {}", slot.0)))
    }

    fn param(&self, param: ParamRef) -> CompileResult<Value> {
        self.params
            .get(param.0)
            .cloned()
            .ok_or_else(|| CompileError::MalformedPlan(format!("unbound param {}", param.0)))
    }

    fn index(&self, index: usize) -> CompileResult<&str> {
        self.indexes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| CompileError::MalformedPlan(format!("unbound index {}", index)))
    }

    /// Rebuild a predicate tree from its program form
    pub fn resolve_filter(&self, filter: &FilterProgram) -> CompileResult<MatchExpr> {
        Ok(match filter {
            FilterProgram::Leaf { slot, op, param } => MatchExpr::Leaf(Predicate {
                field: self.slot(*slot)?.to_string(),
                op: op.with_value(self.param(*param)?),
            }),
            FilterProgram::And(children) => MatchExpr::And(
                children
                    .iter()
                    .map(|c| self.resolve_filter(c))
                    .collect::<CompileResult<_>>()?,
            ),
            FilterProgram::Or(children) => MatchExpr::Or(
                children
                    .iter()
                    .map(|c| self.resolve_filter(c))
                    .collect::<CompileResult<_>>()?,
            ),
        })
    }

    fn resolve_bound(&self, bound: BoundProgram) -> CompileResult<KeyBound> {
        Ok(match bound {
            BoundProgram::Unbounded => KeyBound::Unbounded,
            BoundProgram::Included(p) => KeyBound::Included(self.param(p)?),
            BoundProgram::Excluded(p) => KeyBound::Excluded(self.param(p)?),
        })
    }
}

/// Compiled, flat program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutablePlan {
    pub ops: Vec<PlanOp>,
}

impl ExecutablePlan {
    /// Append an op, returning its position
    pub fn push(&mut self, op: PlanOp) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Rebuild the runtime stage tree.
    ///
    /// Every op except the root must be consumed exactly once, by a later op.
    pub fn instantiate(&self, aux: &AuxData) -> CompileResult<PlanStage> {
        let mut built: Vec<Option<PlanStage>> = Vec::with_capacity(self.ops.len());

        for (pos, op) in self.ops.iter().enumerate() {
            let mut take = |input: usize| -> CompileResult<PlanStage> {
                if input >= pos {
                    return Err(CompileError::MalformedPlan(format!(
                        "op {} reads forward input {}",
                        pos, input
                    )));
                }
                built
                    .get_mut(input)
                    .and_then(Option::take)
                    .ok_or_else(|| {
                        CompileError::MalformedPlan(format!("op {} input {} already consumed", pos, input))
                    })
            };

            let stage = match op {
                PlanOp::CollectionScan { filter } => {
                    let filter = filter.as_ref().map(|f| aux.resolve_filter(f)).transpose()?;
                    PlanStage::CollectionScan(CollectionScanStage::new(filter))
                }
                PlanOp::IndexScan {
                    index,
                    slot,
                    lower,
                    upper,
                } => {
                    let lower = aux.resolve_bound(*lower)?.to_key_bound();
                    let upper = aux.resolve_bound(*upper)?.to_key_bound();
                    PlanStage::IndexScan(IndexScanStage::new(
                        aux.index(*index)?.to_string(),
                        aux.slot(*slot)?.to_string(),
                        lower,
                        upper,
                    ))
                }
                PlanOp::Fetch { input, filter } => {
                    let child = take(*input)?;
                    let filter = filter.as_ref().map(|f| aux.resolve_filter(f)).transpose()?;
                    PlanStage::Fetch(FetchStage::new(filter, child))
                }
                PlanOp::Or { inputs } => {
                    let children = inputs
                        .iter()
                        .map(|i| take(*i))
                        .collect::<CompileResult<Vec<_>>>()?;
                    PlanStage::Or(OrStage::new(children))
                }
                PlanOp::Dedup { input } => PlanStage::Dedup(DedupStage::new(take(*input)?)),
                PlanOp::Filter { input, filter } => {
                    let child = take(*input)?;
                    PlanStage::Filter(FilterStage::new(aux.resolve_filter(filter)?, child))
                }
                PlanOp::Sort {
                    input,
                    slot,
                    direction,
                } => {
                    let child = take(*input)?;
                    let spec = SortSpec {
                        field: aux.slot(*slot)?.to_string(),
                        direction: *direction,
                    };
                    PlanStage::Sort(SortStage::new(spec, child))
                }
                PlanOp::Projection { input, slots } => {
                    let child = take(*input)?;
                    let fields = slots
                        .iter()
                        .map(|s| aux.slot(*s).map(str::to_string))
                        .collect::<CompileResult<Vec<_>>>()?;
                    PlanStage::Projection(ProjectionStage::new(Projection { fields }, child))
                }
                PlanOp::Skip { input, n } => PlanStage::pipeline(PipelineStage::Skip(*n), take(*input)?),
                PlanOp::Limit { input, n } => PlanStage::pipeline(PipelineStage::Limit(*n), take(*input)?),
            };
            built.push(Some(stage));
        }

        let root = built
            .pop()
            .flatten()
            .ok_or_else(|| CompileError::MalformedPlan("empty program".to_string()))?;
        if built.iter().any(Option::is_some) {
            return Err(CompileError::MalformedPlan("unreferenced op".to_string()));
        }
        Ok(root)
    }
}
