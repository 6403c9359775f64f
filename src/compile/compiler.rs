//! Lowering of access plans into programs

use super::errors::{CompileError, CompileResult};
use super::program::{AuxData, BoundProgram, CmpOp, ExecutablePlan, FilterProgram, PlanOp};
use crate::catalog::Collection;
use crate::query::{MatchExpr, PipelineStage};
use crate::solution::{KeyBound, QuerySolution, SolutionNode};

/// Compiles a query solution into an executable program plus bindings
pub trait SolutionCompiler {
    fn compile(&self, solution: &QuerySolution, coll: &Collection) -> CompileResult<(ExecutablePlan, AuxData)>;
}

/// Reference compiler: post-order lowering with constants hoisted into
/// `AuxData::params`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgramCompiler;

impl ProgramCompiler {
    pub fn new() -> Self {
        Self
    }

    fn lower(
        &self,
        node: &SolutionNode,
        coll: &Collection,
        plan: &mut ExecutablePlan,
        aux: &mut AuxData,
    ) -> CompileResult<usize> {
        let op = match node {
            SolutionNode::CollectionScan { filter } => PlanOp::CollectionScan {
                filter: filter.as_ref().map(|f| lower_filter(f, aux)),
            },
            SolutionNode::IndexScan {
                index,
                field,
                bounds,
            } => {
                match coll.descriptor(index) {
                    None => return Err(CompileError::IndexMissing(index.clone())),
                    Some(d) if d.field != *field => {
                        return Err(CompileError::IndexMismatch {
                            index: index.clone(),
                            expected: field.clone(),
                            actual: d.field.clone(),
                        })
                    }
                    Some(_) => {}
                }
                PlanOp::IndexScan {
                    index: aux.bind_index(index),
                    slot: aux.bind_slot(field),
                    lower: lower_bound(&bounds.lower, aux),
                    upper: lower_bound(&bounds.upper, aux),
                }
            }
            SolutionNode::Fetch { filter, child } => {
                let input = self.lower(child, coll, plan, aux)?;
                PlanOp::Fetch {
                    input,
                    filter: filter.as_ref().map(|f| lower_filter(f, aux)),
                }
            }
            SolutionNode::Or { children } => {
                if children.is_empty() {
                    return Err(CompileError::MalformedPlan("OR without children".to_string()));
                }
                let inputs = children
                    .iter()
                    .map(|c| self.lower(c, coll, plan, aux))
                    .collect::<CompileResult<Vec<_>>>()?;
                PlanOp::Or { inputs }
            }
            SolutionNode::Dedup { child } => PlanOp::Dedup {
                input: self.lower(child, coll, plan, aux)?,
            },
            SolutionNode::Filter { filter, child } => {
                let input = self.lower(child, coll, plan, aux)?;
                PlanOp::Filter {
                    input,
                    filter: lower_filter(filter, aux),
                }
            }
            SolutionNode::Sort { spec, child } => {
                let input = self.lower(child, coll, plan, aux)?;
                PlanOp::Sort {
                    input,
                    slot: aux.bind_slot(&spec.field),
                    direction: spec.direction,
                }
            }
            SolutionNode::Projection { projection, child } => {
                let input = self.lower(child, coll, plan, aux)?;
                PlanOp::Projection {
                    input,
                    slots: projection.fields.iter().map(|f| aux.bind_slot(f)).collect(),
                }
            }
            SolutionNode::Pipeline { stage, child } => {
                let input = self.lower(child, coll, plan, aux)?;
                match stage {
                    PipelineStage::Skip(n) => PlanOp::Skip { input, n: *n },
                    PipelineStage::Limit(n) => PlanOp::Limit { input, n: *n },
                }
            }
        };
        Ok(plan.push(op))
    }
}

impl SolutionCompiler for ProgramCompiler {
    fn compile(&self, solution: &QuerySolution, coll: &Collection) -> CompileResult<(ExecutablePlan, AuxData)> {
        let mut plan = ExecutablePlan::default();
        let mut aux = AuxData::new(coll.epoch());
        self.lower(solution.root(), coll, &mut plan, &mut aux)?;
        Ok((plan, aux))
    }
}

fn lower_filter(expr: &MatchExpr, aux: &mut AuxData) -> FilterProgram {
    match expr {
        MatchExpr::Leaf(p) => FilterProgram::Leaf {
            slot: aux.bind_slot(&p.field),
            op: CmpOp::of(&p.op),
            param: aux.bind_param(p.op.value().clone()),
        },
        MatchExpr::And(children) => {
            FilterProgram::And(children.iter().map(|c| lower_filter(c, aux)).collect())
        }
        MatchExpr::Or(children) => {
            FilterProgram::Or(children.iter().map(|c| lower_filter(c, aux)).collect())
        }
    }
}

fn lower_bound(bound: &KeyBound, aux: &mut AuxData) -> BoundProgram {
    match bound {
        KeyBound::Unbounded => BoundProgram::Unbounded,
        KeyBound::Included(v) => BoundProgram::Included(aux.bind_param(v.clone())),
        KeyBound::Excluded(v) => BoundProgram::Excluded(aux.bind_param(v.clone())),
    }
}
