//! Trace event dispatch.
//!
//! The [`TraceProcessor`] consumes [`TraceEvent`]s serially, splits each
//! event's byte extent into cache-line accesses, and routes every line
//! access into its hierarchy (`fetch` for instruction events, `write` for
//! stores, `read` otherwise). Exactly one dispatch branch fires per event:
//! software prefetch, memcpy/memmove, memset, or the standard split path
//! (with vector and atomic counters layered on top of the standard path).
//!
//! Per-source-line attribution charges only the first line access of each
//! event, keyed by `(file, line)`. An optional callback observes every line
//! access for streaming output.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::common::addr::line_base;
use crate::common::error::ConfigError;
use crate::config::{CacheConfig, HierarchyConfig, PrefetchPolicy};
use crate::hierarchy::{MultiCoreHierarchy, SingleCoreHierarchy};
use crate::stats::{
    AtomicStats, FalseSharingReport, HierarchyStats, MemoryIntrinsicStats, MultiCoreStats,
    PrefetchStats, SoftwarePrefetchStats, SourceStats, VectorStats,
};
use crate::trace::{TraceEvent, split_into_line_accesses};

/// Per-line-access record handed to the event callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    /// The line access hit in L1.
    pub l1_hit: bool,
    /// The line access was serviced by L2.
    pub l2_hit: bool,
    /// The line access was serviced by L3.
    pub l3_hit: bool,
    /// Line-base address that was accessed.
    pub address: u64,
    /// Byte size of the originating event.
    pub size: u32,
    /// Source file of the originating event, empty when unknown.
    pub file: String,
    /// Source line of the originating event, 0 when unknown.
    pub line: u32,
}

/// Callback invoked for every line access.
pub type EventCallback = Box<dyn FnMut(&LineEvent)>;

/// The hierarchy a processor drives.
#[derive(Debug)]
enum HierarchyKind {
    Single(SingleCoreHierarchy),
    Multi(MultiCoreHierarchy),
}

/// Serial consumer of trace events over an owned cache hierarchy.
pub struct TraceProcessor {
    hierarchy: HierarchyKind,
    source_stats: HashMap<(String, u32), SourceStats>,
    callback: Option<EventCallback>,
    sw_prefetch: SoftwarePrefetchStats,
    vector: VectorStats,
    atomics: AtomicStats,
    intrinsics: MemoryIntrinsicStats,
    /// Software-prefetched line bases awaiting a consuming read.
    sw_prefetched: HashSet<u64>,
    events_processed: u64,
}

impl fmt::Debug for TraceProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceProcessor")
            .field("hierarchy", &self.hierarchy)
            .field("events_processed", &self.events_processed)
            .finish_non_exhaustive()
    }
}

impl TraceProcessor {
    /// Builds a processor over a single-core hierarchy.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] from the hierarchy configuration.
    pub fn new(config: &HierarchyConfig) -> Result<Self, ConfigError> {
        Ok(Self::over(HierarchyKind::Single(SingleCoreHierarchy::new(
            config,
        )?)))
    }

    /// Builds a processor over a multi-core hierarchy with coherence and
    /// false-sharing detection.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] from the level configurations or a
    /// zero core count.
    pub fn new_multi_core(
        cores: usize,
        l1: &CacheConfig,
        l2: &CacheConfig,
        l3: &CacheConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::over(HierarchyKind::Multi(MultiCoreHierarchy::new(
            cores, l1, l2, l3,
        )?)))
    }

    fn over(hierarchy: HierarchyKind) -> Self {
        Self {
            hierarchy,
            source_stats: HashMap::new(),
            callback: None,
            sw_prefetch: SoftwarePrefetchStats::default(),
            vector: VectorStats::default(),
            atomics: AtomicStats::default(),
            intrinsics: MemoryIntrinsicStats::default(),
            sw_prefetched: HashSet::new(),
            events_processed: 0,
        }
    }

    /// Turns on hardware prefetching in the underlying hierarchy.
    pub fn enable_prefetching(&mut self, policy: PrefetchPolicy, degree: usize) {
        match &mut self.hierarchy {
            HierarchyKind::Single(h) => h.enable_prefetching(policy, degree),
            HierarchyKind::Multi(h) => h.enable_prefetching(policy, degree),
        }
    }

    /// Turns off hardware prefetching (single-core hierarchies).
    pub fn disable_prefetching(&mut self) {
        match &mut self.hierarchy {
            HierarchyKind::Single(h) => h.disable_prefetching(),
            HierarchyKind::Multi(h) => h.enable_prefetching(PrefetchPolicy::None, 1),
        }
    }

    /// Registers a callback observing every line access.
    pub fn set_event_callback(&mut self, callback: EventCallback) {
        self.callback = Some(callback);
    }

    /// Disables (or re-enables) 3C miss classification everywhere.
    pub fn set_fast_mode(&mut self, fast: bool) {
        match &mut self.hierarchy {
            HierarchyKind::Single(h) => h.set_fast_mode(fast),
            HierarchyKind::Multi(h) => h.set_fast_mode(fast),
        }
    }

    /// Consumes one event, dispatching exactly one branch of the event
    /// table.
    pub fn process(&mut self, event: &TraceEvent) {
        self.events_processed += 1;
        let line_bytes = self.line_bytes_for(event.is_icache);

        if event.is_prefetch {
            self.sw_prefetch.issued += 1;
            let line = line_base(event.address, line_bytes);
            if self.l1_holds(line) {
                self.sw_prefetch.redundant += 1;
            }
            // Warm the cache without touching source stats or the callback.
            self.warm_line(line, event.thread_id);
            let _ = self.sw_prefetched.insert(line);
            return;
        }

        if event.is_memcpy || event.is_memmove {
            if event.is_memcpy {
                self.intrinsics.memcpy_count += 1;
                self.intrinsics.memcpy_bytes += u64::from(event.size);
            } else {
                self.intrinsics.memmove_count += 1;
                self.intrinsics.memmove_bytes += u64::from(event.size);
            }

            let mut charged = false;
            if let Some(src) = event.src_address {
                for (i, line) in split_into_line_accesses(src, event.size, line_bytes)
                    .into_iter()
                    .enumerate()
                {
                    let addr = if i == 0 { src } else { line };
                    self.dispatch_line(addr, line, false, false, event, !charged);
                    charged = true;
                }
            }
            for (i, line) in split_into_line_accesses(event.address, event.size, line_bytes)
                .into_iter()
                .enumerate()
            {
                let addr = if i == 0 { event.address } else { line };
                self.dispatch_line(addr, line, true, false, event, !charged);
                charged = true;
            }
            return;
        }

        if event.is_memset {
            self.intrinsics.memset_count += 1;
            self.intrinsics.memset_bytes += u64::from(event.size);
            let mut charged = false;
            for (i, line) in split_into_line_accesses(event.address, event.size, line_bytes)
                .into_iter()
                .enumerate()
            {
                let addr = if i == 0 { event.address } else { line };
                self.dispatch_line(addr, line, true, false, event, !charged);
                charged = true;
            }
            return;
        }

        let lines = split_into_line_accesses(event.address, event.size, line_bytes);

        if event.is_vector {
            if event.is_write {
                self.vector.stores += 1;
                self.vector.bytes_stored += u64::from(event.size);
            } else {
                self.vector.loads += 1;
                self.vector.bytes_loaded += u64::from(event.size);
            }
            if lines.len() > 1 {
                self.vector.cross_line_accesses += 1;
            }
        }

        if event.is_atomic {
            if event.is_cmpxchg {
                self.atomics.cmpxchg_count += 1;
            } else if event.is_rmw {
                self.atomics.rmw_count += 1;
            } else if event.is_write {
                self.atomics.store_count += 1;
            } else {
                self.atomics.load_count += 1;
            }
        }

        for (i, line) in lines.into_iter().enumerate() {
            let addr = if i == 0 { event.address } else { line };
            self.dispatch_line(addr, line, event.is_write, event.is_icache, event, i == 0);
        }
    }

    /// Aggregate hierarchy counters.
    ///
    /// On a multi-core processor this is the summed view (per-core L1s folded
    /// into `l1d`; no L1i or timing model); the detailed numbers are in
    /// [`TraceProcessor::get_multicore_stats`].
    pub fn get_stats(&self) -> HierarchyStats {
        match &self.hierarchy {
            HierarchyKind::Single(h) => h.stats(),
            HierarchyKind::Multi(h) => {
                let stats = h.stats();
                let mut l1d = crate::stats::CacheStats::default();
                for core in &stats.l1_per_core {
                    l1d += *core;
                }
                HierarchyStats {
                    l1d,
                    l2: stats.l2,
                    l3: stats.l3,
                    ..HierarchyStats::default()
                }
            }
        }
    }

    /// Per-core and coherence counters; `None` on a single-core processor.
    pub fn get_multicore_stats(&self) -> Option<MultiCoreStats> {
        match &self.hierarchy {
            HierarchyKind::Single(_) => None,
            HierarchyKind::Multi(h) => Some(h.stats()),
        }
    }

    /// False-sharing reports; empty on a single-core processor.
    pub fn get_false_sharing_reports(&self) -> Vec<FalseSharingReport> {
        match &self.hierarchy {
            HierarchyKind::Single(_) => Vec::new(),
            HierarchyKind::Multi(h) => h.false_sharing_reports(),
        }
    }

    /// The hottest source lines, sorted by miss count descending (ties
    /// broken by location for stable output).
    pub fn get_hot_lines(&self, limit: usize) -> Vec<SourceStats> {
        let mut sorted: Vec<SourceStats> = self.source_stats.values().cloned().collect();
        sorted.sort_by(|a, b| {
            b.misses
                .cmp(&a.misses)
                .then_with(|| a.file.cmp(&b.file))
                .then_with(|| a.line.cmp(&b.line))
        });
        sorted.truncate(limit);
        sorted
    }

    /// Hardware prefetcher counters (summed over cores on a multi-core
    /// processor).
    pub fn get_prefetch_stats(&self) -> PrefetchStats {
        match &self.hierarchy {
            HierarchyKind::Single(h) => *h.prefetch_stats(),
            HierarchyKind::Multi(h) => h.prefetch_stats(),
        }
    }

    /// Software prefetch counters.
    pub const fn get_software_prefetch_stats(&self) -> &SoftwarePrefetchStats {
        &self.sw_prefetch
    }

    /// Vector access counters.
    pub const fn get_vector_stats(&self) -> &VectorStats {
        &self.vector
    }

    /// Atomic operation counters.
    pub const fn get_atomic_stats(&self) -> &AtomicStats {
        &self.atomics
    }

    /// Memory intrinsic counters.
    pub const fn get_memory_intrinsic_stats(&self) -> &MemoryIntrinsicStats {
        &self.intrinsics
    }

    /// Events consumed so far.
    pub const fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// The underlying single-core hierarchy, if that is what this processor
    /// drives.
    pub const fn as_single_core(&self) -> Option<&SingleCoreHierarchy> {
        match &self.hierarchy {
            HierarchyKind::Single(h) => Some(h),
            HierarchyKind::Multi(_) => None,
        }
    }

    /// The underlying multi-core hierarchy, if that is what this processor
    /// drives.
    pub const fn as_multi_core(&self) -> Option<&MultiCoreHierarchy> {
        match &self.hierarchy {
            HierarchyKind::Single(_) => None,
            HierarchyKind::Multi(h) => Some(h),
        }
    }

    /// Clears every statistic: hierarchy counters, source attribution, and
    /// the specialty counters. Cache contents survive.
    pub fn reset(&mut self) {
        match &mut self.hierarchy {
            HierarchyKind::Single(h) => h.reset_stats(),
            HierarchyKind::Multi(h) => h.reset_stats(),
        }
        self.source_stats.clear();
        self.sw_prefetch = SoftwarePrefetchStats::default();
        self.vector = VectorStats::default();
        self.atomics = AtomicStats::default();
        self.intrinsics = MemoryIntrinsicStats::default();
        self.sw_prefetched.clear();
        self.events_processed = 0;
    }

    /// L1 line size governing event splitting.
    fn line_bytes_for(&self, is_icache: bool) -> u64 {
        match &self.hierarchy {
            HierarchyKind::Single(h) => {
                if is_icache {
                    h.l1i().line_bytes() as u64
                } else {
                    h.l1d().line_bytes() as u64
                }
            }
            HierarchyKind::Multi(h) => h.line_bytes(),
        }
    }

    /// Whether `line` is already resident in some L1.
    fn l1_holds(&self, line: u64) -> bool {
        match &self.hierarchy {
            HierarchyKind::Single(h) => h.l1d().is_present(line),
            HierarchyKind::Multi(h) => (0..h.num_cores()).any(|core| h.is_line_in_l1(core, line)),
        }
    }

    /// Pulls `line` into the cache without demand attribution (software
    /// prefetch warm-up).
    fn warm_line(&mut self, line: u64, thread_id: u32) {
        match &mut self.hierarchy {
            HierarchyKind::Single(h) => {
                let _ = h.read(line, 0);
            }
            HierarchyKind::Multi(h) => {
                let _ = h.read(line, thread_id, None);
            }
        }
    }

    /// Routes one line access into the hierarchy and updates attribution,
    /// software-prefetch crediting, and the callback.
    ///
    /// `addr` preserves the original byte address for the first line of a
    /// split so multi-core witness offsets stay exact; `line` is the
    /// line-base address. `charge` attributes this access to the event's
    /// source location.
    fn dispatch_line(
        &mut self,
        addr: u64,
        line: u64,
        is_write: bool,
        is_icache: bool,
        event: &TraceEvent,
        charge: bool,
    ) {
        let (l1_hit, l2_hit, l3_hit) = match &mut self.hierarchy {
            HierarchyKind::Single(h) => {
                let result = if is_icache {
                    h.fetch(addr, 0)
                } else if is_write {
                    h.write(addr, 0)
                } else {
                    h.read(addr, 0)
                };
                (result.l1_hit, result.l2_hit, result.l3_hit)
            }
            HierarchyKind::Multi(h) => {
                let result = if is_write {
                    h.write(addr, event.thread_id, event.source.as_ref())
                } else {
                    h.read(addr, event.thread_id, event.source.as_ref())
                };
                (result.l1_hit, result.l2_hit, result.l3_hit)
            }
        };

        // A demand read consumes an outstanding software prefetch.
        if !is_write && self.sw_prefetched.remove(&line) {
            self.sw_prefetch.useful += 1;
        }

        if charge {
            if let Some(location) = &event.source {
                let entry = self
                    .source_stats
                    .entry((location.file.clone(), location.line))
                    .or_insert_with(|| SourceStats {
                        file: location.file.clone(),
                        line: location.line,
                        ..SourceStats::default()
                    });
                if l1_hit {
                    entry.hits += 1;
                } else {
                    entry.misses += 1;
                }
                let _ = entry.threads.insert(event.thread_id);
            }
        }

        if let Some(callback) = &mut self.callback {
            callback(&LineEvent {
                l1_hit,
                l2_hit,
                l3_hit,
                address: line,
                size: event.size,
                file: event
                    .source
                    .as_ref()
                    .map(|s| s.file.clone())
                    .unwrap_or_default(),
                line: event.source.as_ref().map_or(0, |s| s.line),
            });
        }
    }
}
