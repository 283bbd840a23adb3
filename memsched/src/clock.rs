use crate::helpe::*;

// Bounds, in ticks, of the delay before the first generated process.
const FIRST_GENERATION_DELAY: (i64, i64) = (3, 8);
// Generated processes take at most this fraction of memory.
const GENERATED_SIZE_DIVISOR: usize = 4;
const GENERATED_DURATION: (i64, i64) = (5, 50);
const DURATION_NOISE: (i64, i64) = (-3, 5);

impl<E: Entropy> Simulation<E> {
    /// Advances logical time by exactly one tick and returns the new time.
    ///
    /// Phases run in a fixed order:
    /// 1. the clock moves forward;
    /// 2. processes whose I/O wait is over rejoin the ready queue;
    /// 3. an ongoing context switch eats the whole tick (dispatching on its
    ///    last one);
    /// 4. an idle CPU picks the next ready process;
    /// 5. the running process consumes one tick and then either blocks on
    ///    I/O, terminates, or is preempted if its quantum is spent;
    /// 6. a new process may be generated.
    ///
    /// A tick that ends early in phase 3 or 5 skips everything after it,
    /// generation included.
    pub fn tick(&mut self) -> Ticks {
        self.now += 1;
        self.unblock_due();

        if self.sched.is_switching() {
            if self.sched.count_down() {
                self.dispatch();
            }
            return self.now;
        }

        if self.sched.running().is_none() {
            self.dispatch();
        }
        if let Some(pid) = self.sched.running() {
            if self.execute(pid) {
                return self.now;
            }
        }

        if self.config.auto_generate {
            self.auto_generate();
        }

        self.now
    }

    fn unblock_due(&mut self) {
        for pid in self.table.due_for_unblock(self.now) {
            let Some(p) = self.table.get_mut(pid) else { continue; };
            if p.transition(ProcState::Ready) {
                p.blocked_until = None;
                self.sched.enqueue(pid);
                self.record(Event::Unblocked { pid });
            }
        }
    }

    /// Runs `pid` for one tick. Returns `true` if it blocked on I/O.
    fn execute(&mut self, pid: Pid) -> bool {
        let Some(p) = self.table.get_mut(pid) else {
            // Stale running slot.
            self.sched.release(pid);
            return false;
        };
        p.consume();
        let (remaining, quantum_used) = (p.remaining, p.quantum_used);

        if remaining > 0 && self.roll_for_io() {
            return true;
        }
        if remaining == 0 {
            self.terminate(pid);
        } else if quantum_used >= self.config.quantum {
            self.preempt_running(PreemptReason::QuantumExhausted);
        }

        false
    }

    /// Decides whether the running process blocks on I/O this tick and, if
    /// so, for how long.
    fn roll_for_io(&mut self) -> bool {
        if self.entropy.unit() >= self.config.io_probability {
            return false;
        }
        // `validate` keeps both bounds within `i64`.
        let wait = self.entropy.between(
            self.config.io_block_min as i64,
            self.config.io_block_max as i64,
        ) as Ticks;
        let until = self.now + wait;
        match self.sched.block_running(&mut self.table, until, self.config.switch_cost) {
            Some(pid)   => {
                self.record(Event::Blocked { pid, ticks: wait });
                true
            },
            None        => false,
        }
    }

    fn auto_generate(&mut self) {
        match self.next_auto {
            None    => {
                let (lo, hi) = FIRST_GENERATION_DELAY;
                self.next_auto = Some(self.now + self.entropy.between(lo, hi) as Ticks);
            },
            Some(at) if self.now >= at  => {
                let (size_kb, duration) = self.draw_process();
                if self.spawn(size_kb, duration).is_err() {
                    self.record(Event::GenerationPostponed);
                }
                // Faster simulations get denser arrivals, down to a floor.
                let base = 12_i64 - i64::from(self.config.speed.min(10));
                let base = base.max(3);
                self.next_auto = Some(self.now + self.entropy.between(base, base + 8) as Ticks);
            },
            Some(_) => {},
        }
    }

    /// Size and duration of an auto-generated process. Sizes go up to a
    /// quarter of memory in whole blocks; bigger processes tend to run
    /// longer.
    fn draw_process(&mut self) -> (Kilobytes, Ticks) {
        let block_kb = self.config.block_kb;
        let max_kb = block_kb.max(self.config.memory_kb / GENERATED_SIZE_DIVISOR);
        let drawn = self.entropy.between(block_kb as i64, max_kb as i64) as Kilobytes;
        let size_kb = drawn.div_ceil(block_kb).max(1) * block_kb;

        let (lo, hi) = GENERATED_DURATION;
        let base = ((2 * size_kb / block_kb) as i64).max(lo);
        let (noise_lo, noise_hi) = DURATION_NOISE;
        let duration = (base + self.entropy.between(noise_lo, noise_hi)).clamp(lo, hi);

        (size_kb, duration as Ticks)
    }
}
