//! Simulation statistics collection.
//!
//! This module defines the counter structures accumulated by the simulator:
//! 1. **Per-level:** hit/miss/writeback/invalidation counts with optional 3C
//!    miss classification.
//! 2. **Timing:** cycles accumulated per outcome and in total.
//! 3. **Specialty:** TLB, hardware/software prefetch, vector, atomic, and
//!    memory-intrinsic counters.
//! 4. **Attribution:** per-source-line statistics and false-sharing reports.
//!
//! All rate helpers define `x / 0` as `0.0` so empty simulations serialize
//! cleanly. Every struct is `serde::Serialize` so reports can be emitted as
//! JSON without hand-rolled formatting.

use std::collections::BTreeSet;
use std::ops::AddAssign;

use serde::Serialize;

/// Counters for one cache level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Demand accesses that found their line resident.
    pub hits: u64,
    /// Demand accesses that had to install their line.
    pub misses: u64,
    /// Dirty victims pushed out of the level (including write-through
    /// traffic on levels configured that way).
    pub writebacks: u64,
    /// Lines removed by invalidation (coherence or back-invalidation).
    pub invalidations: u64,
    /// Misses to lines never referenced before (3C classification).
    pub compulsory_misses: u64,
    /// Misses a fully-associative cache of the same capacity would also
    /// take (3C classification).
    pub capacity_misses: u64,
    /// Misses caused by set-mapping collisions (3C classification).
    pub conflict_misses: u64,
}

impl CacheStats {
    /// Total demand accesses: `hits + misses`.
    #[inline]
    pub const fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate in `[0, 1]`; `0.0` when no accesses occurred.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Miss rate in `[0, 1]`; `0.0` when no accesses occurred.
    pub fn miss_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign for CacheStats {
    /// Accumulates another level's counters, used when aggregating per-core
    /// L1 stats.
    fn add_assign(&mut self, rhs: Self) {
        self.hits += rhs.hits;
        self.misses += rhs.misses;
        self.writebacks += rhs.writebacks;
        self.invalidations += rhs.invalidations;
        self.compulsory_misses += rhs.compulsory_misses;
        self.capacity_misses += rhs.capacity_misses;
        self.conflict_misses += rhs.conflict_misses;
    }
}

/// Cycles accumulated per access outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimingStats {
    /// Cycles spent on accesses serviced by L1.
    pub l1_hit_cycles: u64,
    /// Cycles spent on accesses serviced by L2.
    pub l2_hit_cycles: u64,
    /// Cycles spent on accesses serviced by L3.
    pub l3_hit_cycles: u64,
    /// Cycles spent on accesses serviced by main memory.
    pub memory_cycles: u64,
    /// Cycles added by TLB miss penalties.
    pub tlb_miss_cycles: u64,
    /// Total cycles across all accesses.
    pub total_cycles: u64,
}

impl TimingStats {
    /// Average cycles per access; `0.0` when no accesses occurred.
    pub fn average_latency(&self, total_accesses: u64) -> f64 {
        if total_accesses == 0 {
            0.0
        } else {
            self.total_cycles as f64 / total_accesses as f64
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Hit/miss counters for one TLB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TlbStats {
    /// Lookups that found their page mapping resident.
    pub hits: u64,
    /// Lookups that installed a new mapping.
    pub misses: u64,
}

impl TlbStats {
    /// Hit rate in `[0, 1]`; `0.0` when no lookups occurred.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hardware prefetcher effectiveness counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStats {
    /// Prefetch addresses emitted.
    pub issued: u64,
    /// Prefetched lines consumed by a later demand access.
    pub useful: u64,
    /// Reserved for timed models; the instant-install model never marks a
    /// prefetch late.
    pub late: u64,
    /// Prefetched lines evicted from the hierarchy before any use.
    pub useless: u64,
}

impl PrefetchStats {
    /// Fraction of issued prefetches that proved useful; `0.0` when none
    /// were issued.
    pub fn accuracy(&self) -> f64 {
        if self.issued == 0 {
            0.0
        } else {
            self.useful as f64 / self.issued as f64
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign for PrefetchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.issued += rhs.issued;
        self.useful += rhs.useful;
        self.late += rhs.late;
        self.useless += rhs.useless;
    }
}

/// Software prefetch hint counters (trace `P` events).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SoftwarePrefetchStats {
    /// Prefetch events seen in the trace.
    pub issued: u64,
    /// Prefetched lines later consumed by a demand read.
    pub useful: u64,
    /// Prefetch events whose line was already resident in L1.
    pub redundant: u64,
}

impl SoftwarePrefetchStats {
    /// Fraction of issued prefetches that proved useful; `0.0` when none
    /// were issued.
    pub fn accuracy(&self) -> f64 {
        if self.issued == 0 {
            0.0
        } else {
            self.useful as f64 / self.issued as f64
        }
    }
}

/// Vector/SIMD access counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VectorStats {
    /// Vector loads seen.
    pub loads: u64,
    /// Vector stores seen.
    pub stores: u64,
    /// Bytes moved by vector loads.
    pub bytes_loaded: u64,
    /// Bytes moved by vector stores.
    pub bytes_stored: u64,
    /// Vector accesses whose extent spanned more than one cache line.
    pub cross_line_accesses: u64,
}

/// Atomic operation counters, bucketed by precedence
/// (cmpxchg > rmw > store > load).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AtomicStats {
    /// Plain atomic loads.
    pub load_count: u64,
    /// Plain atomic stores.
    pub store_count: u64,
    /// Read-modify-write operations (fetch_add and friends).
    pub rmw_count: u64,
    /// Compare-and-exchange operations.
    pub cmpxchg_count: u64,
}

/// Counters for memcpy/memmove/memset intrinsic events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryIntrinsicStats {
    /// memcpy events seen.
    pub memcpy_count: u64,
    /// Bytes copied by memcpy events.
    pub memcpy_bytes: u64,
    /// memmove events seen.
    pub memmove_count: u64,
    /// Bytes moved by memmove events.
    pub memmove_bytes: u64,
    /// memset events seen.
    pub memset_count: u64,
    /// Bytes written by memset events.
    pub memset_bytes: u64,
}

/// Aggregate view of a single-core hierarchy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyStats {
    /// L1 data cache counters.
    pub l1d: CacheStats,
    /// L1 instruction cache counters.
    pub l1i: CacheStats,
    /// L2 counters.
    pub l2: CacheStats,
    /// L3 counters; zero-valued when the hierarchy has no L3.
    pub l3: CacheStats,
    /// Accumulated timing.
    pub timing: TimingStats,
}

/// Aggregate view of a multi-core hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MultiCoreStats {
    /// Per-core L1 counters, indexed by core id.
    pub l1_per_core: Vec<CacheStats>,
    /// Shared L2 counters.
    pub l2: CacheStats,
    /// Shared L3 counters.
    pub l3: CacheStats,
    /// Snoops that invalidated or downgraded a peer copy.
    pub coherence_invalidations: u64,
    /// Distinct cache lines that entered the false-sharing set.
    pub false_sharing_events: u64,
}

/// Per-source-line attribution of L1 behavior.
///
/// Keyed by `(file, line)`; only the first line-access of each trace event is
/// charged here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    /// Source file path as recorded in the trace.
    pub file: String,
    /// 1-based source line number.
    pub line: u32,
    /// Events whose first line-access hit in L1.
    pub hits: u64,
    /// Events whose first line-access missed in L1.
    pub misses: u64,
    /// Thread ids observed at this location.
    pub threads: BTreeSet<u32>,
}

impl SourceStats {
    /// Total events attributed to this location.
    #[inline]
    pub const fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Miss rate in `[0, 1]`; `0.0` when nothing was attributed.
    pub fn miss_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}

/// One recorded access to a contended cache line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FalseSharingAccess {
    /// Thread that performed the access.
    pub thread_id: u32,
    /// Byte offset of the access within the line.
    pub byte_offset: u32,
    /// Whether the access was a write.
    pub is_write: bool,
    /// Source file, empty when the trace carried no location.
    pub file: String,
    /// Source line, zero when the trace carried no location.
    pub line: u32,
}

/// Witness history for one cache line flagged as falsely shared.
///
/// A line enters the false-sharing set the first moment its witness list
/// simultaneously contains two or more threads, two or more distinct byte
/// offsets, and at least one write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FalseSharingReport {
    /// Line-base address of the contended line.
    pub line_address: u64,
    /// Every recorded access to the line, in trace order.
    pub accesses: Vec<FalseSharingAccess>,
}
