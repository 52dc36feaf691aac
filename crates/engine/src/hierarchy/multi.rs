//! Multi-core cache hierarchy.
//!
//! Per-core L1 caches, prefetchers, and data TLBs over a shared L2/L3, tied
//! together by a directory-based MESI-like coherence controller. The
//! simulated parallelism is a property of the input trace: thread ids map to
//! cores round-robin on first appearance and stay pinned, and all state is
//! mutated by the one event-processing thread.
//!
//! Beyond the coherence directory (which over-reports true sharing), every
//! access deposits a witness record `(thread, byte offset, is_write, source)`
//! against its cache line. A line enters the false-sharing set the first
//! moment its witnesses simultaneously span two threads, two distinct byte
//! offsets, and at least one write; only that first insertion increments the
//! event counter.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cache::CacheLevel;
use crate::coherence::{CoherenceController, CoherenceState};
use crate::common::error::ConfigError;
use crate::config::{CacheConfig, PrefetchPolicy, TlbConfig};
use crate::prefetch::Prefetcher;
use crate::stats::{
    FalseSharingAccess, FalseSharingReport, MultiCoreStats, PrefetchStats, TlbStats,
};
use crate::tlb::Tlb;
use crate::trace::SourceLocation;

/// Result of routing one access through the multi-core hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreAccessOutcome {
    /// Serviced by the core's own L1.
    pub l1_hit: bool,
    /// Serviced by the shared L2.
    pub l2_hit: bool,
    /// Serviced by the shared L3.
    pub l3_hit: bool,
    /// Serviced by main memory.
    pub memory_access: bool,
}

impl CoreAccessOutcome {
    const L1_HIT: Self = Self {
        l1_hit: true,
        l2_hit: false,
        l3_hit: false,
        memory_access: false,
    };

    const L2_HIT: Self = Self {
        l1_hit: false,
        l2_hit: true,
        l3_hit: false,
        memory_access: false,
    };

    const fn outer(l3_hit: bool) -> Self {
        Self {
            l1_hit: false,
            l2_hit: false,
            l3_hit,
            memory_access: !l3_hit,
        }
    }
}

/// Witness history for one cache line, with incremental summaries so the
/// false-sharing predicate is O(1) per access.
#[derive(Debug, Default)]
struct WitnessLog {
    accesses: Vec<FalseSharingAccess>,
    threads: BTreeSet<u32>,
    offsets: BTreeSet<u32>,
    has_write: bool,
}

/// Multi-core hierarchy: per-core L1s behind a shared L2/L3 with directory
/// coherence.
#[derive(Debug)]
pub struct MultiCoreHierarchy {
    num_cores: usize,
    l1: Vec<CacheLevel>,
    prefetchers: Vec<Prefetcher>,
    dtlbs: Vec<Tlb>,
    l2: CacheLevel,
    l3: CacheLevel,
    controller: CoherenceController,
    thread_to_core: HashMap<u32, usize>,
    next_core: usize,
    line_witnesses: HashMap<u64, WitnessLog>,
    false_sharing_lines: HashSet<u64>,
    coherence_invalidations: u64,
    false_sharing_events: u64,
    prefetch_enabled: bool,
    line_bytes: u64,
}

impl MultiCoreHierarchy {
    /// Builds a hierarchy with `cores` L1 caches over shared L2 and L3.
    ///
    /// Each core gets its own prefetcher (initially off) and data TLB.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCores`] for an empty machine, or the first
    /// geometry error from any level.
    pub fn new(
        cores: usize,
        l1_cfg: &CacheConfig,
        l2_cfg: &CacheConfig,
        l3_cfg: &CacheConfig,
    ) -> Result<Self, ConfigError> {
        if cores == 0 {
            return Err(ConfigError::ZeroCores);
        }
        let mut l1 = Vec::with_capacity(cores);
        let mut prefetchers = Vec::with_capacity(cores);
        let mut dtlbs = Vec::with_capacity(cores);
        for _ in 0..cores {
            l1.push(CacheLevel::new(l1_cfg.clone())?);
            prefetchers.push(Prefetcher::new(PrefetchPolicy::None, 2, l1_cfg.line_bytes));
            dtlbs.push(Tlb::new(TlbConfig::default())?);
        }
        Ok(Self {
            num_cores: cores,
            l1,
            prefetchers,
            dtlbs,
            l2: CacheLevel::new(l2_cfg.clone())?,
            l3: CacheLevel::new(l3_cfg.clone())?,
            controller: CoherenceController::new(),
            thread_to_core: HashMap::new(),
            next_core: 0,
            line_witnesses: HashMap::new(),
            false_sharing_lines: HashSet::new(),
            coherence_invalidations: 0,
            false_sharing_events: 0,
            prefetch_enabled: false,
            line_bytes: l1_cfg.line_bytes as u64,
        })
    }

    /// Turns on hardware prefetching on every core.
    pub fn enable_prefetching(&mut self, policy: PrefetchPolicy, degree: usize) {
        for prefetcher in &mut self.prefetchers {
            prefetcher.set_policy(policy);
            prefetcher.set_degree(degree);
        }
        self.prefetch_enabled = policy != PrefetchPolicy::None;
    }

    /// Routes a read from `thread_id` through its core.
    pub fn read(
        &mut self,
        addr: u64,
        thread_id: u32,
        source: Option<&SourceLocation>,
    ) -> CoreAccessOutcome {
        let core = self.core_for_thread(thread_id);
        self.witness(addr, thread_id, false, source);
        let _ = self.dtlbs[core].access(addr);

        let line = self.line_base(addr);
        let l1_info = self.l1[core].access(line, false);
        self.note_l1_eviction(core, l1_info.evicted_address);
        if l1_info.is_hit() {
            return CoreAccessOutcome::L1_HIT;
        }

        self.issue_prefetches(core, line, 0);

        let snoop = self.controller.request_read(core, line, &self.l1);
        if snoop.was_modified {
            self.coherence_invalidations += 1;
            if let Some(owner) = snoop.data_source_core {
                // Owner surrenders exclusivity; its dirty data rides along as
                // an implicit writeback.
                let _ = self.l1[owner].downgrade_to_shared(line);
            }
        }
        let new_state = if snoop.found {
            CoherenceState::Shared
        } else {
            CoherenceState::Exclusive
        };

        let l2_info = self.l2.access(line, false);
        if l2_info.is_hit() {
            let install = self.l1[core].install_with_state(line, new_state);
            self.note_l1_eviction(core, install.evicted_address);
            return CoreAccessOutcome::L2_HIT;
        }

        let l3_info = self.l3.access(line, false);
        let _ = self.l2.install(line, false);
        let install = self.l1[core].install_with_state(line, new_state);
        self.note_l1_eviction(core, install.evicted_address);
        CoreAccessOutcome::outer(l3_info.is_hit())
    }

    /// Routes a write from `thread_id` through its core.
    ///
    /// Exclusivity is requested before the L1 lookup so that a write hit on
    /// a Shared line still invalidates every peer copy.
    pub fn write(
        &mut self,
        addr: u64,
        thread_id: u32,
        source: Option<&SourceLocation>,
    ) -> CoreAccessOutcome {
        let core = self.core_for_thread(thread_id);
        self.witness(addr, thread_id, true, source);
        let _ = self.dtlbs[core].access(addr);

        let line = self.line_base(addr);
        let snoop = self.controller.request_exclusive(core, line, &mut self.l1);
        if snoop.found {
            self.coherence_invalidations += 1;
        }

        let l1_info = self.l1[core].access(line, true);
        self.note_l1_eviction(core, l1_info.evicted_address);
        if l1_info.is_hit() {
            self.l1[core].set_coherence_state(line, CoherenceState::Modified);
            return CoreAccessOutcome::L1_HIT;
        }

        self.issue_prefetches(core, line, 0);

        let l2_info = self.l2.access(line, false);
        if l2_info.is_hit() {
            let install = self.l1[core].install_with_state(line, CoherenceState::Modified);
            self.note_l1_eviction(core, install.evicted_address);
            return CoreAccessOutcome::L2_HIT;
        }

        let l3_info = self.l3.access(line, false);
        let _ = self.l2.install(line, false);
        let install = self.l1[core].install_with_state(line, CoherenceState::Modified);
        self.note_l1_eviction(core, install.evicted_address);
        CoreAccessOutcome::outer(l3_info.is_hit())
    }

    /// Snapshot of per-core and shared counters.
    pub fn stats(&self) -> MultiCoreStats {
        MultiCoreStats {
            l1_per_core: self.l1.iter().map(|l1| *l1.stats()).collect(),
            l2: *self.l2.stats(),
            l3: *self.l3.stats(),
            coherence_invalidations: self.coherence_invalidations,
            false_sharing_events: self.false_sharing_events,
        }
    }

    /// Reports for every line in the false-sharing set, ordered by line
    /// address for deterministic output.
    pub fn false_sharing_reports(&self) -> Vec<FalseSharingReport> {
        let mut lines: Vec<u64> = self.false_sharing_lines.iter().copied().collect();
        lines.sort_unstable();
        lines
            .into_iter()
            .map(|line| FalseSharingReport {
                line_address: line,
                accesses: self
                    .line_witnesses
                    .get(&line)
                    .map(|log| log.accesses.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Number of simulated cores.
    pub const fn num_cores(&self) -> usize {
        self.num_cores
    }

    /// L1 line size in bytes.
    pub const fn line_bytes(&self) -> u64 {
        self.line_bytes
    }

    /// Number of distinct threads seen so far.
    pub fn thread_count(&self) -> usize {
        self.thread_to_core.len()
    }

    /// Core a thread is pinned to; `None` before its first access.
    pub fn core_of(&self, thread_id: u32) -> Option<usize> {
        self.thread_to_core.get(&thread_id).copied()
    }

    /// Coherence state of `addr`'s line in `core`'s L1;
    /// [`CoherenceState::Invalid`] for out-of-range cores.
    pub fn l1_coherence_state(&self, core: usize, addr: u64) -> CoherenceState {
        self.l1
            .get(core)
            .map_or(CoherenceState::Invalid, |l1| {
                l1.coherence_state(self.line_base(addr))
            })
    }

    /// Whether `addr`'s line is resident in `core`'s L1; `false` for
    /// out-of-range cores.
    pub fn is_line_in_l1(&self, core: usize, addr: u64) -> bool {
        self.l1
            .get(core)
            .is_some_and(|l1| l1.is_present(self.line_base(addr)))
    }

    /// Per-core data-TLB counters; zero-valued for out-of-range cores.
    pub fn tlb_stats_for_core(&self, core: usize) -> TlbStats {
        self.dtlbs.get(core).map_or_else(TlbStats::default, |tlb| *tlb.stats())
    }

    /// Per-core prefetch counters; zero-valued for out-of-range cores.
    pub fn prefetch_stats_for_core(&self, core: usize) -> PrefetchStats {
        self.prefetchers
            .get(core)
            .map_or_else(PrefetchStats::default, |p| *p.stats())
    }

    /// Prefetch counters summed over all cores.
    pub fn prefetch_stats(&self) -> PrefetchStats {
        let mut total = PrefetchStats::default();
        for prefetcher in &self.prefetchers {
            total += *prefetcher.stats();
        }
        total
    }

    /// Clears every counter, the witness map, and the false-sharing set.
    ///
    /// Cache contents, the coherence directory, and the thread-to-core map
    /// survive so a reset mid-trace keeps simulating the same machine.
    pub fn reset_stats(&mut self) {
        for l1 in &mut self.l1 {
            l1.reset_stats();
        }
        self.l2.reset_stats();
        self.l3.reset_stats();
        for tlb in &mut self.dtlbs {
            tlb.reset_stats();
        }
        for prefetcher in &mut self.prefetchers {
            prefetcher.reset_stats();
        }
        self.line_witnesses.clear();
        self.false_sharing_lines.clear();
        self.coherence_invalidations = 0;
        self.false_sharing_events = 0;
    }

    /// Disables (or re-enables) 3C miss classification on every level.
    pub fn set_fast_mode(&mut self, fast: bool) {
        for l1 in &mut self.l1 {
            l1.set_track_classification(!fast);
        }
        self.l2.set_track_classification(!fast);
        self.l3.set_track_classification(!fast);
    }

    /// Stable round-robin thread-to-core assignment.
    fn core_for_thread(&mut self, thread_id: u32) -> usize {
        if let Some(&core) = self.thread_to_core.get(&thread_id) {
            return core;
        }
        let core = self.next_core % self.num_cores;
        let _ = self.thread_to_core.insert(thread_id, core);
        self.next_core += 1;
        core
    }

    #[inline]
    const fn line_base(&self, addr: u64) -> u64 {
        addr & !(self.line_bytes - 1)
    }

    /// Appends a witness record and promotes the line into the
    /// false-sharing set the moment the predicate first holds.
    fn witness(&mut self, addr: u64, thread_id: u32, is_write: bool, source: Option<&SourceLocation>) {
        let line = self.line_base(addr);
        let byte_offset = (addr & (self.line_bytes - 1)) as u32;

        let log = self.line_witnesses.entry(line).or_default();
        log.accesses.push(FalseSharingAccess {
            thread_id,
            byte_offset,
            is_write,
            file: source.map(|s| s.file.clone()).unwrap_or_default(),
            line: source.map_or(0, |s| s.line),
        });
        let _ = log.threads.insert(thread_id);
        let _ = log.offsets.insert(byte_offset);
        log.has_write |= is_write;

        if log.threads.len() > 1
            && log.offsets.len() > 1
            && log.has_write
            && self.false_sharing_lines.insert(line)
        {
            self.false_sharing_events += 1;
            tracing::debug!(line = format_args!("{line:#x}"), "line entered false-sharing set");
        }
    }

    /// Directory upkeep: a displaced L1 victim leaves its core's sharer
    /// entry.
    fn note_l1_eviction(&mut self, core: usize, evicted: Option<u64>) {
        if let Some(evicted) = evicted {
            self.controller.evict_line(core, evicted);
        }
    }

    /// Runs the core's prefetcher on a demand miss and installs its targets
    /// with the coherence state peer residency dictates.
    fn issue_prefetches(&mut self, core: usize, miss_addr: u64, pc: u64) {
        if !self.prefetch_enabled {
            return;
        }
        let targets = self.prefetchers[core].on_miss(miss_addr, pc);
        for target in targets {
            let line = self.line_base(target);
            if self.l1[core].is_present(line) {
                continue;
            }

            let others_have_it = self
                .l1
                .iter()
                .enumerate()
                .any(|(other, l1)| other != core && l1.is_present(line));
            let state = if others_have_it {
                CoherenceState::Shared
            } else {
                CoherenceState::Exclusive
            };

            // Fill the shared levels without touching their demand counters.
            if !self.l2.is_present(line) {
                if !self.l3.is_present(line) {
                    let _ = self.l3.install(line, false);
                }
                let _ = self.l2.install(line, false);
            }
            let install = self.l1[core].install_with_state(line, state);
            self.note_l1_eviction(core, install.evicted_address);
        }
    }
}
