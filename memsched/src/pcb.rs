use crate::helpe::*;

impl Pcb {
    /// Creates a process in state [`ProcState::New`], not yet placed
    /// anywhere in memory.
    pub fn new(
        id:         Pid,
        size_kb:    Kilobytes,
        duration:   Ticks,
        arrival:    Ticks,
    ) -> Self {
        Self {
            id,
            size_kb,
            duration,
            remaining:      duration,
            progress:       0,
            state:          ProcState::New,
            address:        None,
            quantum_used:   0,
            blocked_until:  None,
            arrival,
        }
    }

    pub fn state(&self) -> ProcState {
        self.state
    }

    /// Returns `true` unless the process has terminated.
    #[inline(always)]
    pub fn is_live(&self) -> bool {
        self.state != ProcState::Terminated
    }

    /// Moves the process to `next` if the state machine allows it.
    ///
    /// Returns whether the transition happened. Invalid requests are not
    /// errors: the process is simply left untouched.
    pub fn transition(&mut self, next: ProcState) -> bool {
        if self.state.can_become(next) {
            self.state = next;
            true
        } else { false }
    }

    /// Burns one tick of CPU on behalf of this process.
    pub(crate) fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.progress += 1;
        self.quantum_used += 1;
    }
}

impl ProcState {
    /// The complete transition table. Anything not listed is refused.
    pub fn can_become(self, next: ProcState) -> bool {
        use ProcState::*;
        matches!(
            (self, next),
            (New, Ready)
                | (Ready, Running)
                | (Running, Ready)
                | (Running, Blocked)
                | (Blocked, Ready)
                | (Running, Terminated)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ProcState::New          => "new",
            ProcState::Ready        => "ready",
            ProcState::Running      => "running",
            ProcState::Blocked      => "blocked",
            ProcState::Terminated   => "terminated",
        }
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}
