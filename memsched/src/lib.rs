//! Welcome to `memsched`!
//!
//! A tick-driven simulator of a contiguous-memory allocator working side by
//! side with a round-robin process scheduler. Everything lives inside one
//! [`Simulation`]: the block array, the process table, the ready queue and
//! the logical clock. A driver (see `src/bin/memsched.rs`) decides when to
//! call [`Simulation::tick`] and reads snapshots in between.

mod pcb;
mod sim;
mod clock;

pub mod config;
pub mod log;
pub mod memory;
pub mod sched;
pub mod table;
pub mod helpe;

pub use crate::helpe::*;
pub use crate::sim::{ProcessRow, Snapshot};

/// The record of one simulated process.
///
/// A [`Pcb`] is owned by the [`ProcessTable`]; every other component refers
/// to it through its [`Pid`]. Lifecycle changes go through
/// [`Pcb::transition`], which silently refuses anything the state machine
/// does not allow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pcb {
    pub id:             Pid,
    /// Requested memory, in KB. The allocator rounds it up to whole blocks.
    pub size_kb:        Kilobytes,
    /// Total CPU work, in ticks.
    pub duration:       Ticks,
    pub remaining:      Ticks,
    /// Ticks of CPU consumed so far.
    pub progress:       Ticks,
    pub(crate) state:   ProcState,
    /// Index of the first owned block. `None` before allocation and
    /// after termination.
    pub address:        Option<usize>,
    /// CPU ticks consumed since the last dispatch.
    pub quantum_used:   Ticks,
    /// Tick at which a blocked process may go back to the ready queue.
    pub blocked_until:  Option<Ticks>,
    pub arrival:        Ticks,
}

/// Lifecycle states of a [`Pcb`]. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcState {
    New,
    Ready,
    Running,
    Blocked,
    Terminated,
}

/// The whole simulated machine.
///
/// There is no shared or global state: a [`Simulation`] is built from a
/// [`Config`] and an [`Entropy`] source, and mutated only through its own
/// methods. Ticks run to completion on `&mut self`, so no two of them can
/// ever interleave.
pub struct Simulation<E: Entropy = StdEntropy> {
    pub(crate) config:      Config,
    pub(crate) memory:      Memory,
    pub(crate) table:       ProcessTable,
    pub(crate) sched:       Scheduler,
    pub(crate) now:         Ticks,
    // Auto-generation fires once `now` reaches this. `None` means the
    // schedule is armed on the next tick.
    pub(crate) next_auto:   Option<Ticks>,
    pub(crate) log:         EventLog,
    pub(crate) entropy:     E,
}
