pub use std::{
    collections::VecDeque,
    fmt,
    path::{Path, PathBuf},
};
pub use thiserror::Error;
pub use itertools::Itertools;
pub use indexmap::IndexMap;
pub use clap::{Parser, ValueEnum};
pub use serde::{Deserialize, Serialize};
pub use rand::{rngs::StdRng, Rng, SeedableRng};

pub use crate::{Pcb, ProcState, Simulation,
    config::*,
    log::*,
    memory::*,
    sched::*,
    table::*,
};

/// Process identifiers start at 1. Zero never names a process, which is
/// what lets the block array use it as the "free" marker.
pub type Pid = u32;

/// The unit of logical time. The simulator has no notion of wall-clock
/// time; a tick is simply one call to [`Simulation::tick`].
pub type Ticks = u64;

/// Sizes are expressed in KB everywhere outside the allocator, which
/// works in blocks.
pub type Kilobytes = usize;

/// Content of a block that no process owns.
pub const FREE: Pid = 0;

/// Source of every random decision the simulation takes: I/O blocking,
/// block durations and auto-generated processes.
///
/// Production code uses [`StdEntropy`]. Tests plug in
/// [`ScriptedEntropy`] to replay an exact sequence of outcomes.
pub trait Entropy {
    /// A uniform sample from `[0, 1)`.
    fn unit(&mut self) -> f64;
    /// A uniform integer from the inclusive range `[lo, hi]`. Degenerate
    /// ranges yield `lo`.
    fn between(&mut self, lo: i64, hi: i64) -> i64;
}

/// [`Entropy`] backed by `rand`'s standard generator.
pub struct StdEntropy {
    rng: StdRng,
}

impl StdEntropy {
    /// Same seed, same simulation.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_os() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl Entropy for StdEntropy {
    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn between(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo { lo }
        else { self.rng.gen_range(lo..=hi) }
    }
}

/// [`Entropy`] that replays queued values.
///
/// Once a queue runs dry the source falls back to outcomes that never
/// trigger anything: `unit` returns the largest value below 1.0 (so only
/// a probability of exactly 1.0 still fires) and `between` returns the
/// lower bound. Scripted integers are clamped into the requested range.
#[derive(Debug, Default, Clone)]
pub struct ScriptedEntropy {
    units:  VecDeque<f64>,
    ints:   VecDeque<i64>,
}

impl ScriptedEntropy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_units(mut self, units: impl IntoIterator<Item = f64>) -> Self {
        self.units.extend(units);
        self
    }

    pub fn with_ints(mut self, ints: impl IntoIterator<Item = i64>) -> Self {
        self.ints.extend(ints);
        self
    }
}

impl Entropy for ScriptedEntropy {
    fn unit(&mut self) -> f64 {
        self.units
            .pop_front()
            .unwrap_or(1.0 - f64::EPSILON)
    }

    fn between(&mut self, lo: i64, hi: i64) -> i64 {
        match self.ints.pop_front() {
            Some(v) if hi > lo  => v.clamp(lo, hi),
            _                   => lo,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
/// Why a request for a new process was turned down. A rejected request
/// leaves no process behind and does not consume an identifier.
pub enum SpawnError {
    #[error("process requires {requested}KB but total memory is {total}KB")]
    TooLarge {
        requested:  Kilobytes,
        total:      Kilobytes,
    },
    #[error("process of {size_kb}KB lasting {duration} ticks has nothing to run")]
    Empty {
        size_kb:    Kilobytes,
        duration:   Ticks,
    },
    #[error("not enough contiguous memory for {requested}KB, even after compaction")]
    NoContiguousSpace {
        requested:  Kilobytes,
    },
}

impl SpawnError {
    /// Running out of contiguous space is an expected outcome of the
    /// simulation; malformed requests are not.
    pub fn level(&self) -> Level {
        match self {
            SpawnError::NoContiguousSpace { .. }    => Level::Warning,
            _                                       => Level::Error,
        }
    }
}
