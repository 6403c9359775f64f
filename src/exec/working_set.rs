//! Working set: the intermediate-result buffer stages pass members through
//!
//! Members are addressed by `WsId`. Freed slots are reused, so ids are only
//! meaningful while the member is live.

use serde_json::Value;

use crate::catalog::RecordId;

/// Handle to a working set member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WsId(usize);

/// A record flowing between stages
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingSetMember {
    pub rid: RecordId,
    /// Full document, or only the covered fields after an index scan
    pub doc: Value,
}

/// Arena of in-flight members
#[derive(Debug, Default)]
pub struct WorkingSet {
    slots: Vec<Option<WorkingSetMember>>,
    free: Vec<usize>,
    live: usize,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, member: WorkingSetMember) -> WsId {
        self.live += 1;
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(member);
                WsId(slot)
            }
            None => {
                self.slots.push(Some(member));
                WsId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: WsId) -> Option<&WorkingSetMember> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: WsId) -> Option<&mut WorkingSetMember> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Remove a member and hand it to the caller
    pub fn take(&mut self, id: WsId) -> Option<WorkingSetMember> {
        let member = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(member)
    }

    pub fn free(&mut self, id: WsId) {
        self.take(id);
    }

    /// Live member count
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}
