//! Rebinding cached programs to a new query's constants
//!
//! A cached program answers every query of its shape, but `AuxData::params`
//! holds the constants of the query that compiled it. Binding re-derives
//! each param from the new query the way the compiler produced it: branch
//! filters for scans and fetches, index bounds for index scans, the residual
//! conjuncts for the filter above the OR. Anything that does not line up is
//! a `BindMismatch`; the caller replans.

use serde_json::Value;

use super::errors::{CompileError, CompileResult};
use super::program::{AuxData, BoundProgram, CmpOp, ExecutablePlan, FilterProgram, ParamRef, PlanOp};
use crate::planner::bounds_for_field;
use crate::query::{CanonicalQuery, MatchExpr};
use crate::solution::KeyBound;

fn mismatch(detail: impl Into<String>) -> CompileError {
    CompileError::BindMismatch(detail.into())
}

/// Copy of `aux` with every param taken from `query`
pub fn bind_params(plan: &ExecutablePlan, aux: &AuxData, query: &CanonicalQuery) -> CompileResult<AuxData> {
    let disjunction = query
        .disjunction()
        .ok_or_else(|| mismatch("query has no disjunction"))?;
    let owners = branch_owners(plan, disjunction.len())?;
    let residual = disjunction.residual_filter();
    let mut residual_bound = false;
    let mut binder = Binder::new(aux);

    for (pos, op) in plan.ops.iter().enumerate() {
        let branch = owners[pos].map(|b| &disjunction.branches[b]);
        match (op, branch) {
            (PlanOp::CollectionScan { filter }, Some(expr)) | (PlanOp::Fetch { filter, .. }, Some(expr)) => {
                if let Some(filter) = filter {
                    binder.filter(filter, expr)?;
                }
            }
            (PlanOp::IndexScan { slot, lower, upper, .. }, Some(expr)) => {
                let field = aux.slot(*slot)?;
                let bounds = bounds_for_field(field, &expr.conjunct_predicates())
                    .ok_or_else(|| mismatch(format!("no usable bounds on {}", field)))?;
                binder.bound(*lower, &bounds.lower)?;
                binder.bound(*upper, &bounds.upper)?;
            }
            (PlanOp::Filter { filter, .. }, None) => {
                let expr = match (&residual, residual_bound) {
                    (Some(expr), false) => expr,
                    _ => return Err(mismatch(format!("unexpected filter at op {}", pos))),
                };
                binder.filter(filter, expr)?;
                residual_bound = true;
            }
            (
                PlanOp::Or { .. }
                | PlanOp::Dedup { .. }
                | PlanOp::Sort { .. }
                | PlanOp::Projection { .. }
                | PlanOp::Skip { .. }
                | PlanOp::Limit { .. },
                None,
            ) => {}
            _ => return Err(mismatch(format!("unexpected op at {}", pos))),
        }
    }

    if residual.is_some() && !residual_bound {
        return Err(mismatch("residual filter missing from program"));
    }
    binder.finish()
}

/// Branch index owning each op, `None` above the OR
fn branch_owners(plan: &ExecutablePlan, branches: usize) -> CompileResult<Vec<Option<usize>>> {
    let or_inputs = plan
        .ops
        .iter()
        .rev()
        .find_map(|op| match op {
            PlanOp::Or { inputs } => Some(inputs),
            _ => None,
        })
        .ok_or_else(|| mismatch("program has no OR"))?;
    if or_inputs.len() != branches {
        return Err(mismatch(format!(
            "program has {} branches, query has {}",
            or_inputs.len(),
            branches
        )));
    }

    let mut owners = vec![None; plan.ops.len()];
    for (branch, &input) in or_inputs.iter().enumerate() {
        let mut stack = vec![input];
        while let Some(pos) = stack.pop() {
            let op = plan
                .ops
                .get(pos)
                .ok_or_else(|| CompileError::MalformedPlan(format!("missing op {}", pos)))?;
            if owners[pos].replace(branch).is_some() {
                return Err(CompileError::MalformedPlan(format!("op {} shared between branches", pos)));
            }
            stack.extend(op.inputs());
        }
    }
    Ok(owners)
}

struct Binder<'a> {
    aux: &'a AuxData,
    params: Vec<Option<Value>>,
}

impl<'a> Binder<'a> {
    fn new(aux: &'a AuxData) -> Self {
        Self {
            aux,
            params: vec![None; aux.params.len()],
        }
    }

    fn set(&mut self, param: ParamRef, value: &Value) -> CompileResult<()> {
        let slot = self
            .params
            .get_mut(param.0)
            .ok_or_else(|| CompileError::MalformedPlan(format!("unbound param {}", param.0)))?;
        if slot.is_some() {
            return Err(mismatch(format!("param {} bound twice", param.0)));
        }
        *slot = Some(value.clone());
        Ok(())
    }

    fn filter(&mut self, program: &FilterProgram, expr: &MatchExpr) -> CompileResult<()> {
        match (program, expr) {
            (FilterProgram::Leaf { slot, op, param }, MatchExpr::Leaf(p)) => {
                if self.aux.slot(*slot)? != p.field || *op != CmpOp::of(&p.op) {
                    return Err(mismatch(format!("predicate on {} does not fit", p.field)));
                }
                self.set(*param, p.op.value())
            }
            (FilterProgram::And(programs), MatchExpr::And(exprs))
            | (FilterProgram::Or(programs), MatchExpr::Or(exprs))
                if programs.len() == exprs.len() =>
            {
                programs
                    .iter()
                    .zip(exprs)
                    .try_for_each(|(p, e)| self.filter(p, e))
            }
            _ => Err(mismatch("filter structure differs")),
        }
    }

    fn bound(&mut self, program: BoundProgram, bound: &KeyBound) -> CompileResult<()> {
        match (program, bound) {
            (BoundProgram::Unbounded, KeyBound::Unbounded) => Ok(()),
            (BoundProgram::Included(p), KeyBound::Included(v))
            | (BoundProgram::Excluded(p), KeyBound::Excluded(v)) => self.set(p, v),
            _ => Err(mismatch("index bound kind differs")),
        }
    }

    fn finish(self) -> CompileResult<AuxData> {
        let params = self
            .params
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| mismatch(format!("param {} left unbound", i))))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(AuxData {
            params,
            ..self.aux.clone()
        })
    }
}
