//! The process table.
//!
//! Owns every [`Pcb`] ever admitted during a run, terminated ones included
//! (they stay around for display). Iteration follows creation order.

use crate::helpe::*;

#[derive(Debug, Clone)]
pub struct ProcessTable {
    procs:      IndexMap<Pid, Pcb>,
    next_id:    Pid,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            procs:      IndexMap::new(),
            next_id:    1,
        }
    }

    /// The identifier the next admitted process will get.
    pub fn peek_pid(&self) -> Pid {
        self.next_id
    }

    /// Hands out the next identifier. Identifiers are never reused within
    /// a run.
    pub fn issue_pid(&mut self) -> Pid {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Takes ownership of `pcb`.
    pub fn admit(&mut self, pcb: Pcb) {
        debug_assert!(!self.procs.contains_key(&pcb.id), "Pid {} admitted twice", pcb.id);
        self.procs.insert(pcb.id, pcb);
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.procs.get(&pid)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        self.procs.get_mut(&pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pcb> {
        self.procs.values()
    }

    /// Live processes that own memory; what compaction gets to move.
    pub fn live_placed_mut(&mut self) -> impl Iterator<Item = &mut Pcb> {
        self.procs
            .values_mut()
            .filter(|p| p.is_live() && p.address.is_some())
    }

    /// Blocked processes whose wait is over at tick `now`, in creation
    /// order.
    pub fn due_for_unblock(&self, now: Ticks) -> Vec<Pid> {
        self.procs
            .values()
            .filter(|p| p.state == ProcState::Blocked)
            .filter(|p| p.blocked_until.is_some_and(|t| now >= t))
            .map(|p| p.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Forgets every process and restarts numbering at 1.
    pub fn clear(&mut self) {
        self.procs.clear();
        self.next_id = 1;
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
