//! The simulation's own event log.
//!
//! A bounded, chronological record of everything worth showing to a
//! user: allocations, compactions, dispatches, preemptions, I/O waits,
//! terminations. Oldest entries fall off first. Every entry carries a
//! sequence number so a reader can ask only for what it has not seen.

use crate::helpe::*;

/// Severity used for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so that width specifiers line entries up.
        f.pad(match self {
            Level::Info     => "INFO",
            Level::Success  => "OK",
            Level::Warning  => "WARN",
            Level::Error    => "ERROR",
        })
    }
}

/// Something notable that happened inside the simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Initialized         { strategy: Strategy },
    StrategyChanged     { strategy: Strategy },
    MemoryResized       { total_kb: Kilobytes },
    Created             { pid: Pid, size_kb: Kilobytes, duration: Ticks, base: usize },
    Rejected            { error: SpawnError },
    Freed               { pid: Pid, base: usize, blocks: usize },
    Compacted           { moved: usize },
    Dispatched          { pid: Pid },
    Preempted           { pid: Pid, reason: PreemptReason },
    Blocked             { pid: Pid, ticks: Ticks },
    Unblocked           { pid: Pid },
    Terminated          { pid: Pid },
    AutoGeneration      { enabled: bool },
    GenerationPostponed,
    SettingChanged      { setting: &'static str, value: String },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::Created { .. }
            | Event::Terminated { .. }      => Level::Success,
            Event::Rejected { error }       => error.level(),
            Event::GenerationPostponed      => Level::Warning,
            _                               => Level::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Initialized { strategy } =>
                write!(f, "system initialized, allocating with {strategy}"),
            Event::StrategyChanged { strategy } =>
                write!(f, "allocation strategy changed to {strategy}"),
            Event::MemoryResized { total_kb } =>
                write!(f, "memory resized to {total_kb}KB"),
            Event::Created { pid, size_kb, duration, base } =>
                write!(f, "process {pid} created ({size_kb}KB, {duration} ticks) at block {base}"),
            Event::Rejected { error } =>
                write!(f, "process rejected: {error}"),
            Event::Freed { pid, base, blocks } =>
                write!(f, "released {blocks} block(s) of process {pid} starting at block {base}"),
            Event::Compacted { moved } =>
                write!(f, "memory compacted to reduce external fragmentation ({moved} process(es) moved)"),
            Event::Dispatched { pid } =>
                write!(f, "process {pid} dispatched"),
            Event::Preempted { pid, reason } =>
                write!(f, "process {pid} preempted: {reason}"),
            Event::Blocked { pid, ticks } =>
                write!(f, "process {pid} blocked on I/O for {ticks} ticks"),
            Event::Unblocked { pid } =>
                write!(f, "process {pid} unblocked and ready"),
            Event::Terminated { pid } =>
                write!(f, "process {pid} terminated, memory released"),
            Event::AutoGeneration { enabled: true } =>
                write!(f, "automatic process generation enabled"),
            Event::AutoGeneration { enabled: false } =>
                write!(f, "automatic process generation disabled"),
            Event::GenerationPostponed =>
                write!(f, "automatic generation postponed: no contiguous memory"),
            Event::SettingChanged { setting, value } =>
                write!(f, "{setting} set to {value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub seq:    u64,
    pub tick:   Ticks,
    pub level:  Level,
    pub event:  Event,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>5}] {:<5} {}", self.tick, self.level, self.event)
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    entries:    VecDeque<LogEntry>,
    capacity:   usize,
    next_seq:   u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries:    VecDeque::with_capacity(capacity),
            capacity:   capacity.max(1),
            next_seq:   0,
        }
    }

    /// Appends `event`, dropping the oldest entries beyond capacity.
    pub fn push(&mut self, tick: Ticks, event: Event) {
        let entry = LogEntry {
            seq:    self.next_seq,
            tick,
            level:  event.level(),
            event,
        };
        self.next_seq += 1;
        self.entries.push_back(entry);
        self.trim();
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Retained entries with a sequence number of at least `seq`.
    pub fn since(&self, seq: u64) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .skip_while(move |e| e.seq < seq)
    }

    /// The most recent entry, if any.
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    /// Sequence number the next entry will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_entries_are_discarded_first() {
        let mut log = EventLog::new(3);
        for pid in 1..=5 {
            log.push(pid as Ticks, Event::Dispatched { pid });
        }
        assert_eq!(log.len(), 3);
        let seqs: Vec<u64> = log.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(log.next_seq(), 5);

        log.set_capacity(1);
        assert_eq!(log.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn since_returns_only_unseen_entries() {
        let mut log = EventLog::new(10);
        log.push(0, Event::GenerationPostponed);
        log.push(1, Event::Unblocked { pid: 2 });
        log.push(1, Event::Terminated { pid: 2 });
        let fresh: Vec<&Event> = log.since(1).map(|e| &e.event).collect();
        assert_eq!(fresh, vec![&Event::Unblocked { pid: 2 }, &Event::Terminated { pid: 2 }]);
        assert_eq!(log.since(3).count(), 0);
    }

    #[test]
    fn levels_follow_the_event() {
        assert_eq!(Event::Terminated { pid: 1 }.level(), Level::Success);
        assert_eq!(Event::Compacted { moved: 2 }.level(), Level::Info);
        assert_eq!(
            Event::Rejected { error: SpawnError::NoContiguousSpace { requested: 64 } }.level(),
            Level::Warning,
        );
        assert_eq!(
            Event::Rejected { error: SpawnError::TooLarge { requested: 2048, total: 1024 } }.level(),
            Level::Error,
        );
    }

    #[test]
    fn entries_render_for_display() {
        let mut log = EventLog::new(4);
        log.push(12, Event::Preempted { pid: 3, reason: PreemptReason::QuantumExhausted });
        let line = log.last().unwrap().to_string();
        assert!(line.contains("[   12]"), "{line}");
        assert!(line.ends_with("process 3 preempted: quantum exhausted"), "{line}");
    }
}
