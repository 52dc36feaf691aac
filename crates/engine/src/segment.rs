//! Segment memoization cache.
//!
//! Loops dominate real traces: the same window of events recurs millions of
//! times. The [`SegmentCache`] memoizes the simulation result of a
//! fixed-length event window keyed by `(pattern hash, cache state hash)` so
//! a driver can replay the aggregated counters instead of re-simulating.
//!
//! The pattern hash is FNV-1a over each event's type bits, address, size,
//! and thread id. It deliberately skips the source location, so the same
//! loop matches wherever debug info points. The cache state hash is supplied
//! by the caller; lookups under different state hashes are independent.

use std::collections::HashMap;

use serde::Serialize;

use crate::trace::TraceEvent;

/// FNV-1a offset basis.
const FNV_OFFSET_BASIS: u64 = 14695981039346656037;

/// FNV-1a prime.
const FNV_PRIME: u64 = 1099511628211;

/// Default number of events per memoized segment.
pub const DEFAULT_SEGMENT_LEN: usize = 20;

/// Default capacity before LRU eviction.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Aggregated simulation result for one event segment.
///
/// The caller replays these counters directly on a cache hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CachedSegmentResult {
    /// L1d hits across the segment.
    pub l1d_hits: u64,
    /// L1d misses across the segment.
    pub l1d_misses: u64,
    /// L1i hits across the segment.
    pub l1i_hits: u64,
    /// L1i misses across the segment.
    pub l1i_misses: u64,
    /// L2 hits across the segment.
    pub l2_hits: u64,
    /// L2 misses across the segment.
    pub l2_misses: u64,
    /// L3 hits across the segment.
    pub l3_hits: u64,
    /// L3 misses across the segment.
    pub l3_misses: u64,
    /// Data-TLB hits across the segment.
    pub dtlb_hits: u64,
    /// Data-TLB misses across the segment.
    pub dtlb_misses: u64,
    /// Instruction-TLB hits across the segment.
    pub itlb_hits: u64,
    /// Instruction-TLB misses across the segment.
    pub itlb_misses: u64,
    /// Writebacks produced by the segment.
    pub writebacks: u64,
    /// Coherence invalidations produced by the segment.
    pub coherence_invalidations: u64,
    /// Cycles consumed by the segment.
    pub total_cycles: u64,
    /// Number of events the segment covers.
    pub segment_length: usize,
    /// Times this cached entry has been replayed.
    pub times_used: u64,
}

/// Composite lookup key: access pattern plus starting cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SegmentKey {
    pattern_hash: u64,
    state_hash: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    result: CachedSegmentResult,
    last_used: u64,
}

/// LRU-bounded memoization cache over fixed-length event windows.
#[derive(Debug)]
pub struct SegmentCache {
    segment_len: usize,
    capacity: usize,
    entries: HashMap<SegmentKey, Slot>,
    hits: u64,
    misses: u64,
    clock: u64,
}

impl SegmentCache {
    /// Creates a cache memoizing `segment_len`-event windows, evicting LRU
    /// past `capacity` entries.
    pub fn new(segment_len: usize, capacity: usize) -> Self {
        Self {
            segment_len: segment_len.max(1),
            capacity: capacity.max(1),
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            clock: 0,
        }
    }

    /// Events per memoized segment.
    pub const fn segment_len(&self) -> usize {
        self.segment_len
    }

    /// Looks up the segment starting at `events[start]` under
    /// `state_hash`.
    ///
    /// Returns `None` when fewer than a full segment of events remains or
    /// nothing is cached for the key.
    pub fn lookup(
        &mut self,
        events: &[TraceEvent],
        start: usize,
        state_hash: u64,
    ) -> Option<CachedSegmentResult> {
        if start + self.segment_len > events.len() {
            return None;
        }
        let key = SegmentKey {
            pattern_hash: Self::hash_pattern(events, start, self.segment_len),
            state_hash,
        };
        self.clock += 1;
        if let Some(slot) = self.entries.get_mut(&key) {
            self.hits += 1;
            slot.last_used = self.clock;
            slot.result.times_used += 1;
            return Some(slot.result);
        }
        self.misses += 1;
        None
    }

    /// Stores a simulated segment result for later replay.
    ///
    /// A key that is already cached keeps its first result.
    pub fn store(
        &mut self,
        events: &[TraceEvent],
        start: usize,
        state_hash: u64,
        result: CachedSegmentResult,
    ) {
        if start + self.segment_len > events.len() {
            return;
        }
        let key = SegmentKey {
            pattern_hash: Self::hash_pattern(events, start, self.segment_len),
            state_hash,
        };
        if self.entries.contains_key(&key) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.clock += 1;
        let _ = self.entries.insert(
            key,
            Slot {
                result,
                last_used: self.clock,
            },
        );
    }

    /// FNV-1a over each event's type bits, address, size, and thread id.
    ///
    /// Source location is deliberately excluded so the same loop body
    /// matches regardless of where debug info attributes it.
    pub fn hash_pattern(events: &[TraceEvent], start: usize, len: usize) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        let end = (start + len).min(events.len());
        for event in &events[start..end] {
            let mut type_bits = 0u64;
            if event.is_write {
                type_bits |= 1;
            }
            if event.is_icache {
                type_bits |= 2;
            }
            if event.is_vector {
                type_bits |= 4;
            }
            if event.is_atomic {
                type_bits |= 8;
            }
            if event.is_prefetch {
                type_bits |= 16;
            }
            hash ^= type_bits;
            hash = hash.wrapping_mul(FNV_PRIME);
            hash ^= event.address;
            hash = hash.wrapping_mul(FNV_PRIME);
            hash ^= u64::from(event.size);
            hash = hash.wrapping_mul(FNV_PRIME);
            hash ^= u64::from(event.thread_id);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// Successful replays.
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Lookups that found nothing.
    pub const fn misses(&self) -> u64 {
        self.misses
    }

    /// Replay rate in `[0, 1]`; `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Cached segment count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry and counter.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Evicts the least recently used entry.
    fn evict_lru(&mut self) {
        if let Some(victim) = self
            .entries
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(&key, _)| key)
        {
            let _ = self.entries.remove(&victim);
        }
    }
}

impl Default for SegmentCache {
    /// 20-event segments, 10 000-entry capacity.
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_LEN, DEFAULT_CAPACITY)
    }
}
