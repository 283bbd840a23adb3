use crate::helpe::*;

/// One row of the process table, as a driver would display it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRow {
    pub id:         Pid,
    pub size_kb:    Kilobytes,
    pub state:      ProcState,
    pub address:    Option<usize>,
    pub progress:   Ticks,
    pub duration:   Ticks,
}

impl From<&Pcb> for ProcessRow {
    fn from(p: &Pcb) -> Self {
        Self {
            id:         p.id,
            size_kb:    p.size_kb,
            state:      p.state,
            address:    p.address,
            progress:   p.progress,
            duration:   p.duration,
        }
    }
}

/// An owned, read-only picture of the simulation between two ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub tick:           Ticks,
    pub strategy:       Strategy,
    pub total_kb:       Kilobytes,
    pub free_kb:        Kilobytes,
    pub block_kb:       Kilobytes,
    pub blocks:         Vec<Pid>,
    pub processes:      Vec<ProcessRow>,
    pub running:        Option<Pid>,
    pub ready:          Vec<Pid>,
    pub switch_left:    Ticks,
    pub log:            Vec<LogEntry>,
}

impl<E: Entropy> Simulation<E> {
    /// Builds a freshly initialized simulation.
    pub fn new(config: Config, entropy: E) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut sim = Self {
            memory:     Memory::for_config(&config),
            table:      ProcessTable::new(),
            sched:      Scheduler::new(),
            now:        0,
            next_auto:  None,
            log:        EventLog::new(config.log_capacity),
            entropy,
            config,
        };
        sim.record(Event::Initialized { strategy: sim.config.strategy });

        Ok(sim)
    }

    /// Throws away every process, wipes memory and the scheduler, and
    /// rewinds both the clock and the identifier counter. The event log
    /// survives, so the reset itself shows up in it.
    pub fn reset(&mut self) {
        self.wipe();
        self.record(Event::Initialized { strategy: self.config.strategy });
    }

    fn wipe(&mut self) {
        self.memory = Memory::for_config(&self.config);
        self.table.clear();
        self.sched.clear();
        self.now = 0;
        self.next_auto = None;
    }

    pub(crate) fn record(&mut self, event: Event) {
        self.log.push(self.now, event);
    }

    /// Admits a new process of `size_kb` running for `duration` ticks.
    ///
    /// Allocation is two-phase: if no hole fits, memory is compacted once
    /// and the allocation retried once. A rejected request leaves nothing
    /// behind (the compaction, if any, stays).
    pub fn spawn(&mut self, size_kb: Kilobytes, duration: Ticks) -> Result<Pid, SpawnError> {
        if size_kb == 0 || duration == 0 {
            return self.reject(SpawnError::Empty { size_kb, duration });
        }
        if size_kb > self.config.memory_kb {
            return self.reject(SpawnError::TooLarge {
                requested:  size_kb,
                total:      self.config.memory_kb,
            });
        }

        let pid = self.table.peek_pid();
        let placed = self.memory
            .allocate(size_kb, pid)
            .or_else(|| {
                self.compact();
                self.memory.allocate(size_kb, pid)
            });
        let Some(base) = placed else {
            return self.reject(SpawnError::NoContiguousSpace { requested: size_kb });
        };

        let pid = self.table.issue_pid();
        let mut pcb = Pcb::new(pid, size_kb, duration, self.now);
        pcb.address = Some(base);
        pcb.transition(ProcState::Ready);
        self.table.admit(pcb);
        self.sched.enqueue(pid);
        self.record(Event::Created { pid, size_kb, duration, base });

        Ok(pid)
    }

    fn reject(&mut self, error: SpawnError) -> Result<Pid, SpawnError> {
        self.record(Event::Rejected { error });
        Err(error)
    }

    /// Packs every live process towards block 0. Returns how many moved.
    pub fn compact(&mut self) -> usize {
        let moved = self.memory.compact(self.table.live_placed_mut());
        self.record(Event::Compacted { moved });

        moved
    }

    /// Sends the running process back to the ready queue on the driver's
    /// behalf. `None` if the CPU was idle.
    pub fn preempt(&mut self) -> Option<Pid> {
        self.preempt_running(PreemptReason::Requested)
    }

    pub(crate) fn preempt_running(&mut self, reason: PreemptReason) -> Option<Pid> {
        let pid = self.sched.preempt(&mut self.table, self.config.switch_cost)?;
        self.record(Event::Preempted { pid, reason });

        Some(pid)
    }

    pub(crate) fn dispatch(&mut self) -> Option<Pid> {
        let pid = self.sched.dispatch(&mut self.table)?;
        self.record(Event::Dispatched { pid });

        Some(pid)
    }

    /// Retires `pid`: its memory goes back to the allocator, its address
    /// is forgotten and it leaves the CPU. No-op unless it is running.
    pub(crate) fn terminate(&mut self, pid: Pid) {
        let Some(p) = self.table.get_mut(pid) else { return; };
        if !p.transition(ProcState::Terminated) {
            return;
        }
        let (base, size_kb) = (p.address.take(), p.size_kb);
        if let Some(base) = base {
            let blocks = self.memory.free(base, size_kb);
            self.record(Event::Freed { pid, base, blocks });
        }
        self.sched.release(pid);
        self.record(Event::Terminated { pid });
    }

    //---START SETTINGS
    /// Applies `change` to a copy of the configuration and commits it only
    /// if the result validates.
    fn retune(&mut self, change: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        let mut next = self.config.clone();
        change(&mut next);
        next.validate()?;
        self.config = next;

        Ok(())
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.config.strategy = strategy;
        self.memory.set_strategy(strategy);
        self.record(Event::StrategyChanged { strategy });
    }

    /// Changing the amount of memory invalidates every placement, so it
    /// resets the whole simulation.
    pub fn set_memory_size(&mut self, memory_kb: Kilobytes) -> Result<(), ConfigError> {
        self.retune(|c| c.memory_kb = memory_kb)?;
        self.wipe();
        self.record(Event::MemoryResized { total_kb: memory_kb });

        Ok(())
    }

    pub fn set_quantum(&mut self, quantum: Ticks) -> Result<(), ConfigError> {
        self.retune(|c| c.quantum = quantum)?;
        self.record(Event::SettingChanged { setting: "quantum", value: quantum.to_string() });

        Ok(())
    }

    pub fn set_switch_cost(&mut self, cost: Ticks) -> Result<(), ConfigError> {
        self.retune(|c| c.switch_cost = cost)?;
        self.record(Event::SettingChanged { setting: "context switch cost", value: cost.to_string() });

        Ok(())
    }

    pub fn set_speed(&mut self, speed: u32) -> Result<(), ConfigError> {
        self.retune(|c| c.speed = speed)?;
        self.record(Event::SettingChanged { setting: "speed", value: speed.to_string() });

        Ok(())
    }

    pub fn set_io_probability(&mut self, p: f64) -> Result<(), ConfigError> {
        self.retune(|c| c.io_probability = p)?;
        self.record(Event::SettingChanged { setting: "I/O probability", value: p.to_string() });

        Ok(())
    }

    pub fn set_io_block_range(&mut self, min: Ticks, max: Ticks) -> Result<(), ConfigError> {
        self.retune(|c| {
            c.io_block_min = min;
            c.io_block_max = max;
        })?;
        self.record(Event::SettingChanged { setting: "I/O block range", value: format!("[{min}, {max}]") });

        Ok(())
    }

    pub fn set_log_capacity(&mut self, capacity: usize) -> Result<(), ConfigError> {
        self.retune(|c| c.log_capacity = capacity)?;
        self.log.set_capacity(capacity);

        Ok(())
    }

    /// Turning generation on (again) always re-arms its schedule.
    pub fn set_auto_generate(&mut self, enabled: bool) {
        self.config.auto_generate = enabled;
        if enabled {
            self.next_auto = None;
        }
        self.record(Event::AutoGeneration { enabled });
    }

    pub fn toggle_auto_generate(&mut self) -> bool {
        let enabled = !self.config.auto_generate;
        self.set_auto_generate(enabled);

        enabled
    }
    //---END SETTINGS

    //---START READ-ONLY VIEWS
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn blocks(&self) -> &[Pid] {
        self.memory.blocks()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn processes(&self) -> impl Iterator<Item = &Pcb> {
        self.table.iter()
    }

    pub fn process(&self, pid: Pid) -> Option<&Pcb> {
        self.table.get(pid)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn free_kb(&self) -> Kilobytes {
        self.memory.free_kb()
    }

    /// Configured memory size. Blocks may cover slightly less when the
    /// block size does not divide it.
    pub fn total_kb(&self) -> Kilobytes {
        self.config.memory_kb
    }

    /// Tick at which the next process will be generated, once scheduled.
    pub fn next_generation_at(&self) -> Option<Ticks> {
        self.next_auto
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick:           self.now,
            strategy:       self.config.strategy,
            total_kb:       self.total_kb(),
            free_kb:        self.free_kb(),
            block_kb:       self.config.block_kb,
            blocks:         self.memory.blocks().to_vec(),
            processes:      self.table.iter().map(ProcessRow::from).collect(),
            running:        self.sched.running(),
            ready:          self.sched.ready_queue().iter().copied().collect(),
            switch_left:    self.sched.switch_left(),
            log:            self.log.iter().cloned().collect(),
        }
    }
    //---END READ-ONLY VIEWS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(memory_kb: Kilobytes) -> Simulation<ScriptedEntropy> {
        let config = Config {
            memory_kb,
            block_kb:       16,
            io_probability: 0.0,
            ..Config::default()
        };
        Simulation::new(config, ScriptedEntropy::new()).unwrap()
    }

    #[test]
    fn spawn_places_and_queues() {
        let mut sim = small(64);
        assert_eq!(sim.spawn(16, 3), Ok(1));
        assert_eq!(sim.spawn(20, 3), Ok(2));
        assert_eq!(sim.blocks(), &[1, 2, 2, 0]);
        assert_eq!(sim.free_kb(), 16);
        let p = sim.process(2).unwrap();
        assert_eq!(p.state(), ProcState::Ready);
        assert_eq!(p.address, Some(1));
        assert_eq!(sim.scheduler().ready_queue().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sim.log().last().unwrap().level, Level::Success);
    }

    #[test]
    fn oversized_and_empty_requests_are_errors() {
        let mut sim = small(64);
        assert_eq!(sim.spawn(80, 3), Err(SpawnError::TooLarge { requested: 80, total: 64 }));
        assert_eq!(sim.log().last().unwrap().level, Level::Error);
        assert_eq!(sim.spawn(0, 3), Err(SpawnError::Empty { size_kb: 0, duration: 3 }));
        assert_eq!(sim.spawn(16, 0), Err(SpawnError::Empty { size_kb: 16, duration: 0 }));
        assert_eq!(sim.processes().count(), 0);
        assert_eq!(sim.free_kb(), 64);
    }

    #[test]
    fn failed_spawn_consumes_no_identifier() {
        let mut sim = small(64);
        sim.spawn(48, 5).unwrap();
        let err = sim.spawn(48, 5).unwrap_err();
        assert_eq!(err, SpawnError::NoContiguousSpace { requested: 48 });
        assert_eq!(sim.log().last().unwrap().level, Level::Warning);
        // The retry compacted memory before giving up.
        assert!(sim.log().iter().any(|e| matches!(e.event, Event::Compacted { .. })));
        assert_eq!(sim.spawn(16, 5), Ok(2));
    }

    #[test]
    fn reset_rewinds_everything_but_the_log() {
        let mut sim = small(64);
        sim.spawn(16, 3).unwrap();
        sim.tick();
        sim.reset();
        assert_eq!(sim.now(), 0);
        assert_eq!(sim.processes().count(), 0);
        assert_eq!(sim.free_kb(), 64);
        assert_eq!(sim.scheduler().running(), None);
        assert_eq!(sim.spawn(16, 3), Ok(1));
        assert!(sim.log().len() > 3);
    }

    #[test]
    fn resizing_memory_reinitializes() {
        let mut sim = small(64);
        sim.spawn(16, 3).unwrap();
        sim.set_memory_size(128).unwrap();
        assert_eq!(sim.blocks().len(), 8);
        assert_eq!(sim.processes().count(), 0);
        assert_eq!(sim.now(), 0);
        // One command, one line.
        let last: Vec<&Event> = sim.log().since(sim.log().next_seq() - 2).map(|e| &e.event).collect();
        assert!(matches!(last[0], Event::Created { .. }));
        assert_eq!(last[1], &Event::MemoryResized { total_kb: 128 });

        assert!(matches!(sim.set_memory_size(8), Err(ConfigError::BlockTooLarge { .. })));
        // A rejected change leaves the old settings in place.
        assert_eq!(sim.total_kb(), 128);
    }

    #[test]
    fn settings_are_validated() {
        let mut sim = small(64);
        assert!(sim.set_quantum(0).is_err());
        assert!(sim.set_io_probability(2.0).is_err());
        assert!(sim.set_io_block_range(5, 2).is_err());
        assert_eq!(sim.config(), &Config { memory_kb: 64, io_probability: 0.0, ..Config::default() });

        sim.set_quantum(2).unwrap();
        sim.set_switch_cost(1).unwrap();
        sim.set_strategy(Strategy::BestFit);
        assert_eq!(sim.config().quantum, 2);
        assert_eq!(sim.memory().strategy(), Strategy::BestFit);
    }

    #[test]
    fn toggling_generation_rearms_its_schedule() {
        let mut sim = small(64);
        assert!(sim.toggle_auto_generate());
        assert_eq!(sim.next_generation_at(), None);
        sim.tick();
        assert_eq!(sim.next_generation_at(), Some(4));

        assert!(!sim.toggle_auto_generate());
        sim.tick();
        assert_eq!(sim.next_generation_at(), Some(4));

        assert!(sim.toggle_auto_generate());
        assert_eq!(sim.next_generation_at(), None);
        assert!(sim.config().auto_generate);
        assert_eq!(sim.log().last().unwrap().event, Event::AutoGeneration { enabled: true });
    }

    #[test]
    fn shrinking_the_log_drops_oldest_entries() {
        let mut sim = small(64);
        for _ in 0..4 {
            sim.spawn(16, 3).unwrap();
        }
        let newest = sim.log().next_seq() - 1;
        sim.set_log_capacity(2).unwrap();
        assert_eq!(sim.config().log_capacity, 2);
        assert_eq!(sim.log().len(), 2);
        assert_eq!(sim.log().last().unwrap().seq, newest);

        assert!(matches!(sim.set_log_capacity(0), Err(ConfigError::ZeroLogCapacity)));
        assert_eq!(sim.log().len(), 2);
    }

    #[test]
    fn explicit_preemption() {
        let mut sim = small(64);
        assert_eq!(sim.preempt(), None);
        sim.spawn(16, 10).unwrap();
        sim.spawn(16, 10).unwrap();
        sim.tick();
        assert_eq!(sim.preempt(), Some(1));
        assert_eq!(sim.process(1).unwrap().state(), ProcState::Ready);
        sim.tick();
        assert_eq!(sim.scheduler().running(), Some(2));
    }

    #[test]
    fn snapshot_mirrors_state() {
        let mut sim = small(64);
        sim.spawn(32, 4).unwrap();
        sim.tick();
        let snap = sim.snapshot();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.blocks, vec![1, 1, 0, 0]);
        assert_eq!(snap.free_kb, 32);
        assert_eq!(snap.running, Some(1));
        assert_eq!(snap.processes, vec![ProcessRow {
            id:         1,
            size_kb:    32,
            state:      ProcState::Running,
            address:    Some(0),
            progress:   1,
            duration:   4,
        }]);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["processes"][0]["state"], "running");
        assert_eq!(json["strategy"], "firstFit");
        assert_eq!(json["log"][0]["event"]["kind"], "initialized");
    }
}
