//! Compiled plan cache entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::binder::bind_params;
use super::checksum::{compute_checksum, frame, unframe};
use super::errors::{CompileError, CompileResult};
use super::program::{AuxData, ExecutablePlan};
use crate::cache::PlanCacheKey;
use crate::exec::PlanStage;
use crate::query::CanonicalQuery;

/// Executable form of a query solution, as stored in the plan cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledEntry {
    pub plan: ExecutablePlan,
    pub aux: AuxData,
    /// Normalized query shape this entry answers
    pub shape_key: PlanCacheKey,
    /// One-line rendering of the source solution
    pub solution_summary: String,
    pub compiled_at: DateTime<Utc>,
    /// CRC32 over the serialized plan and bindings
    pub checksum: u32,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
    plan: &'a ExecutablePlan,
    aux: &'a AuxData,
}

fn content_checksum(plan: &ExecutablePlan, aux: &AuxData) -> CompileResult<u32> {
    let bytes = serde_json::to_vec(&ChecksumInput { plan, aux })?;
    Ok(compute_checksum(&bytes))
}

impl CompiledEntry {
    pub fn new(
        plan: ExecutablePlan,
        aux: AuxData,
        shape_key: PlanCacheKey,
        solution_summary: impl Into<String>,
    ) -> CompileResult<Self> {
        let checksum = content_checksum(&plan, &aux)?;
        Ok(Self {
            plan,
            aux,
            shape_key,
            solution_summary: solution_summary.into(),
            compiled_at: Utc::now(),
            checksum,
        })
    }

    /// Recompute the content checksum and compare
    pub fn verify(&self) -> CompileResult<()> {
        let actual = content_checksum(&self.plan, &self.aux)?;
        if actual != self.checksum {
            return Err(CompileError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            });
        }
        Ok(())
    }

    /// True if the catalog changed since compilation
    pub fn is_stale(&self, catalog_epoch: u64) -> bool {
        self.aux.catalog_epoch != catalog_epoch
    }

    /// Checksummed binary form
    pub fn encode(&self) -> CompileResult<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        Ok(frame(&body))
    }

    /// Decode and verify both the frame and the content checksum
    pub fn decode(bytes: &[u8]) -> CompileResult<Self> {
        let body = unframe(bytes)?;
        let entry: CompiledEntry = serde_json::from_slice(body)?;
        entry.verify()?;
        Ok(entry)
    }

    /// Fresh runtime stage tree for this entry, with the constants of the
    /// query that compiled it
    pub fn instantiate(&self) -> CompileResult<PlanStage> {
        self.plan.instantiate(&self.aux)
    }

    /// Fresh runtime stage tree answering `query`.
    ///
    /// `query` must have this entry's shape; its own constants replace the
    /// stored ones.
    pub fn instantiate_for(&self, query: &CanonicalQuery) -> CompileResult<PlanStage> {
        let key = query.cache_key();
        if key != self.shape_key {
            return Err(CompileError::BindMismatch(format!(
                "query shape {} is not entry shape {}",
                key.short(),
                self.shape_key.short()
            )));
        }
        let aux = bind_params(&self.plan, &self.aux, query)?;
        self.plan.instantiate(&aux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::program::PlanOp;
    use serde_json::json;

    fn entry() -> CompiledEntry {
        let mut plan = ExecutablePlan::default();
        plan.push(PlanOp::CollectionScan { filter: None });
        let mut aux = AuxData::new(2);
        aux.bind_param(json!("x"));
        CompiledEntry::new(plan, aux, PlanCacheKey::new("k"), "COLLSCAN").unwrap()
    }

    #[test]
    fn test_encode_decode_verifies() {
        let e = entry();
        let decoded = CompiledEntry::decode(&e.encode().unwrap()).unwrap();
        assert_eq!(decoded, e);
        assert!(decoded.instantiate().is_ok());
    }

    #[test]
    fn test_tampered_content_detected() {
        let mut e = entry();
        e.aux.params[0] = json!("y");
        assert_eq!(e.verify().unwrap_err().code(), "COMPILE_CHECKSUM_MISMATCH");
        let bytes = e.encode().unwrap();
        assert!(CompiledEntry::decode(&bytes).is_err());
    }

    #[test]
    fn test_stale_epoch() {
        let e = entry();
        assert!(!e.is_stale(2));
        assert!(e.is_stale(3));
    }
}
