//! Contiguous, block-granular memory.
//!
//! Memory is an array of equally-sized blocks, each either [`FREE`] or
//! holding the [`Pid`] of its owner. Processes always occupy one
//! contiguous run of blocks. Free space is never tracked separately: the
//! [`Hole`]s are recomputed from the array whenever they are needed, so
//! they can never drift out of sync with it.

use crate::helpe::*;

/// A maximal run of free blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Hole {
    pub start:  usize,
    pub len:    usize,
}

/// How a hole is chosen among those large enough for a request.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    /// Lowest address
    #[default]
    FirstFit,
    /// Smallest hole, earliest on ties
    BestFit,
    /// Largest hole, earliest on ties
    WorstFit,
}

impl Strategy {
    /// Picks a hole of at least `needed` blocks. `holes` must come in scan
    /// (ascending address) order, which is what breaks ties.
    pub fn pick(
        self,
        holes:  impl IntoIterator<Item = Hole>,
        needed: usize,
    ) -> Option<Hole> {
        let mut fitting = holes.into_iter()
            .filter(|h| h.len >= needed);
        match self {
            Strategy::FirstFit  => fitting.next(),
            // `reduce` keeps the incumbent on ties, so the earliest
            // hole wins. (`min_by_key` would too, `max_by_key` would not.)
            Strategy::BestFit   => fitting.reduce(|best, h| if h.len < best.len { h } else { best }),
            Strategy::WorstFit  => fitting.reduce(|worst, h| if h.len > worst.len { h } else { worst }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::FirstFit  => "First Fit",
            Strategy::BestFit   => "Best Fit",
            Strategy::WorstFit  => "Worst Fit",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The block array plus the policy used to carve it up.
#[derive(Debug, Clone)]
pub struct Memory {
    blocks:     Vec<Pid>,
    block_kb:   Kilobytes,
    strategy:   Strategy,
}

impl Memory {
    /// All-free memory laid out as `config` says. Any remainder that does
    /// not fill a whole block is unusable.
    pub fn for_config(config: &Config) -> Self {
        Self {
            blocks:     vec![FREE; config.total_blocks()],
            block_kb:   config.block_kb,
            strategy:   config.strategy,
        }
    }

    pub fn blocks(&self) -> &[Pid] {
        &self.blocks
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_kb(&self) -> Kilobytes {
        self.block_kb
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    /// Number of blocks a request of `size_kb` occupies.
    #[inline(always)]
    pub fn blocks_for(&self, size_kb: Kilobytes) -> usize {
        size_kb.div_ceil(self.block_kb)
    }

    pub fn free_blocks(&self) -> usize {
        self.blocks.iter()
            .filter(|&&b| b == FREE)
            .count()
    }

    pub fn free_kb(&self) -> Kilobytes {
        self.free_blocks() * self.block_kb
    }

    /// How many blocks currently name `pid` as their owner.
    pub fn owned_by(&self, pid: Pid) -> usize {
        self.blocks.iter()
            .filter(|&&b| b == pid)
            .count()
    }

    /// All maximal runs of free blocks, lowest address first.
    pub fn holes(&self) -> Vec<Hole> {
        let mut res = vec![];
        let mut current: Option<Hole> = None;
        for (idx, &owner) in self.blocks.iter().enumerate() {
            if owner == FREE {
                match current {
                    Some(ref mut h) => { h.len += 1; },
                    None            => { current = Some(Hole { start: idx, len: 1 }); },
                }
            } else if let Some(h) = current.take() {
                res.push(h);
            }
        }
        if let Some(h) = current {
            res.push(h);
        }

        res
    }

    /// Places `size_kb` worth of blocks for `owner` in a hole chosen by
    /// the current strategy, returning the first block index.
    ///
    /// `None` means no single hole is large enough. Nothing is modified in
    /// that case; it is up to the caller to compact and retry.
    pub fn allocate(&mut self, size_kb: Kilobytes, owner: Pid) -> Option<usize> {
        let needed = self.blocks_for(size_kb);
        if needed == 0 || owner == FREE {
            return None;
        }
        let hole = self.strategy.pick(self.holes(), needed)?;
        self.blocks[hole.start..hole.start + needed].fill(owner);

        Some(hole.start)
    }

    /// Frees the blocks a `size_kb` request starting at `base` would
    /// occupy, clamped to the end of memory. Freeing free blocks is
    /// harmless. Returns how many blocks the range covered.
    pub fn free(&mut self, base: usize, size_kb: Kilobytes) -> usize {
        let start = base.min(self.blocks.len());
        let end = base
            .saturating_add(self.blocks_for(size_kb))
            .min(self.blocks.len());
        self.blocks[start..end].fill(FREE);

        end - start
    }

    /// Slides every live, placed process towards block 0, keeping their
    /// relative order by address, and leaves one single hole at the top.
    ///
    /// Addresses are updated in place. Returns how many processes actually
    /// moved.
    pub fn compact<'a, I>(&mut self, live: I) -> usize
    where I: IntoIterator<Item = &'a mut Pcb> {
        let mut cursor = 0;
        let mut moved = 0;
        self.blocks.fill(FREE);
        for p in live.into_iter()
            .filter(|p| p.is_live() && p.address.is_some())
            .sorted_by_key(|p| p.address) {
            let end = (cursor + self.blocks_for(p.size_kb)).min(self.blocks.len());
            self.blocks[cursor..end].fill(p.id);
            if p.address != Some(cursor) {
                moved += 1;
            }
            p.address = Some(cursor);
            cursor = end;
        }

        moved
    }

    /// Test helper: memory with an explicit block layout.
    #[cfg(test)]
    pub(crate) fn with_layout(block_kb: Kilobytes, blocks: Vec<Pid>, strategy: Strategy) -> Self {
        Self { blocks, block_kb, strategy }
    }
}
