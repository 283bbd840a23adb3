//! Round-robin CPU scheduling.
//!
//! The [`Scheduler`] only ever holds identifiers. The queue may contain
//! stale entries (processes that were terminated or re-queued in the
//! meantime), so [`Scheduler::dispatch`] checks each candidate against the
//! [`ProcessTable`] before promoting it.

use crate::helpe::*;

/// Why the running process was sent back to the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreemptReason {
    QuantumExhausted,
    Requested,
}

impl fmt::Display for PreemptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreemptReason::QuantumExhausted => f.write_str("quantum exhausted"),
            PreemptReason::Requested        => f.write_str("preemption request"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    ready:          VecDeque<Pid>,
    running:        Option<Pid>,
    // Ticks left before the CPU may be handed to someone again.
    switch_left:    Ticks,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Option<Pid> {
        self.running
    }

    /// Identifiers waiting for the CPU, head first.
    pub fn ready_queue(&self) -> &VecDeque<Pid> {
        &self.ready
    }

    pub fn switch_left(&self) -> Ticks {
        self.switch_left
    }

    /// `true` while a context switch is still being paid for.
    pub fn is_switching(&self) -> bool {
        self.switch_left > 0
    }

    pub fn enqueue(&mut self, pid: Pid) {
        self.ready.push_back(pid);
    }

    /// Starts a context switch of `cost` ticks. A zero cost is free.
    pub fn arm_switch(&mut self, cost: Ticks) {
        if cost > 0 {
            self.switch_left = cost;
        }
    }

    /// Pays one tick of an ongoing context switch. Returns `true` when
    /// that was the last one.
    pub fn count_down(&mut self) -> bool {
        if self.switch_left == 0 {
            return false;
        }
        self.switch_left -= 1;

        self.switch_left == 0
    }

    /// Hands the CPU to the first genuinely ready process in the queue.
    ///
    /// No-op while something is running. Entries whose process is gone or
    /// no longer ready are dropped on the way.
    pub fn dispatch(&mut self, table: &mut ProcessTable) -> Option<Pid> {
        if self.running.is_some() {
            return None;
        }
        while let Some(pid) = self.ready.pop_front() {
            let Some(p) = table.get_mut(pid) else { continue; };
            if !p.transition(ProcState::Running) {
                continue;
            }
            p.quantum_used = 0;
            self.running = Some(pid);
            return Some(pid);
        }

        None
    }

    /// Sends the running process to the tail of the ready queue and starts
    /// a context switch of `switch_cost` ticks. No-op when idle.
    pub fn preempt(&mut self, table: &mut ProcessTable, switch_cost: Ticks) -> Option<Pid> {
        let pid = self.running.take()?;
        if let Some(p) = table.get_mut(pid) {
            if p.transition(ProcState::Ready) {
                self.ready.push_back(pid);
            }
        }
        self.arm_switch(switch_cost);

        Some(pid)
    }

    /// Parks the running process until tick `until`. Blocking counts as a
    /// context switch too.
    pub fn block_running(
        &mut self,
        table:          &mut ProcessTable,
        until:          Ticks,
        switch_cost:    Ticks,
    ) -> Option<Pid> {
        let pid = self.running?;
        let p = table.get_mut(pid)?;
        if !p.transition(ProcState::Blocked) {
            return None;
        }
        p.blocked_until = Some(until);
        self.running = None;
        self.arm_switch(switch_cost);

        Some(pid)
    }

    /// Frees the CPU if `pid` holds it.
    pub fn release(&mut self, pid: Pid) {
        if self.running == Some(pid) {
            self.running = None;
        }
    }

    pub fn clear(&mut self) {
        self.ready.clear();
        self.running = None;
        self.switch_left = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(n: usize) -> (Scheduler, ProcessTable) {
        let mut sched = Scheduler::new();
        let mut table = ProcessTable::new();
        for _ in 0..n {
            let pid = table.issue_pid();
            let mut p = Pcb::new(pid, 16, 10, 0);
            p.transition(ProcState::Ready);
            table.admit(p);
            sched.enqueue(pid);
        }
        (sched, table)
    }

    #[test]
    fn dispatch_is_fifo_and_resets_quantum() {
        let (mut sched, mut table) = setup(2);
        table.get_mut(1).unwrap().quantum_used = 4;
        assert_eq!(sched.dispatch(&mut table), Some(1));
        assert_eq!(table.get(1).unwrap().state(), ProcState::Running);
        assert_eq!(table.get(1).unwrap().quantum_used, 0);
        // Busy CPU: nothing happens.
        assert_eq!(sched.dispatch(&mut table), None);
        assert_eq!(sched.ready_queue().len(), 1);
    }

    #[test]
    fn dispatch_skips_stale_entries() {
        let (mut sched, mut table) = setup(2);
        let p = table.get_mut(1).unwrap();
        p.transition(ProcState::Running);
        p.transition(ProcState::Blocked);
        // Unknown pid first, then one that is no longer ready.
        sched.ready = VecDeque::from([42, 1, 2]);

        assert_eq!(sched.dispatch(&mut table), Some(2));
        assert!(sched.ready_queue().is_empty());
    }

    #[test]
    fn dispatch_on_empty_queue_leaves_cpu_idle() {
        let (mut sched, mut table) = setup(0);
        assert_eq!(sched.dispatch(&mut table), None);
        assert_eq!(sched.running(), None);
    }

    #[test]
    fn preemption_requeues_at_tail_and_arms_switch() {
        let (mut sched, mut table) = setup(3);
        sched.dispatch(&mut table);
        assert_eq!(sched.preempt(&mut table, 2), Some(1));
        assert_eq!(sched.running(), None);
        assert_eq!(sched.ready_queue().iter().copied().collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(table.get(1).unwrap().state(), ProcState::Ready);
        assert!(sched.is_switching());

        assert!(!sched.count_down());
        assert!(sched.count_down());
        assert!(!sched.is_switching());
        assert!(!sched.count_down());
    }

    #[test]
    fn preempting_an_idle_cpu_is_a_no_op() {
        let (mut sched, mut table) = setup(1);
        assert_eq!(sched.preempt(&mut table, 3), None);
        assert!(!sched.is_switching());
        assert_eq!(sched.ready_queue().len(), 1);
    }

    #[test]
    fn blocking_records_deadline() {
        let (mut sched, mut table) = setup(1);
        sched.dispatch(&mut table);
        assert_eq!(sched.block_running(&mut table, 9, 0), Some(1));
        let p = table.get(1).unwrap();
        assert_eq!(p.state(), ProcState::Blocked);
        assert_eq!(p.blocked_until, Some(9));
        assert_eq!(sched.running(), None);
        assert!(!sched.is_switching());
        assert_eq!(sched.block_running(&mut table, 12, 0), None);
    }
}
