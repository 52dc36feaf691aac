//! Hardware prefetcher.
//!
//! Observes demand misses and emits line-base addresses to fetch ahead of
//! use. Two pattern detectors are maintained:
//! - **Stream:** a fixed table of per-4KiB-page entries locking onto
//!   contiguous ascending or descending line sequences. Prefetches never
//!   cross the page.
//! - **Stride:** a table keyed by instruction address detecting constant
//!   strides. Inert for traces that carry no PC (entries are only created
//!   for non-zero PCs).
//!
//! Policy dispatch is a match over the closed [`PrefetchPolicy`] set; the
//! prefetcher sits on the miss path of every level, so the indirection of a
//! trait object buys nothing here.
//!
//! Confidence counters saturate at 8 and gate issue at 2.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::trace;

use crate::common::addr::{line_base, page_number};
use crate::config::PrefetchPolicy;
use crate::stats::PrefetchStats;

/// Number of stream table entries.
const STREAM_TABLE_ENTRIES: usize = 16;

/// Consecutive confirmations required before prefetches are issued.
const CONFIDENCE_THRESHOLD: i32 = 2;

/// Saturation cap for detector confidence counters.
const MAX_CONFIDENCE: i32 = 8;

/// One tracked sequential stream within a 4 KiB page.
#[derive(Debug, Clone, Copy, Default)]
struct StreamEntry {
    /// Line address that started the stream.
    start_addr: u64,
    /// Most recent line address observed.
    last_addr: u64,
    /// +1 ascending, -1 descending, 0 undetermined.
    direction: i64,
    /// Saturating confirmation counter.
    confidence: i32,
    /// Entry validity flag.
    valid: bool,
}

/// One tracked stride pattern, keyed by instruction address.
#[derive(Debug, Clone, Copy, Default)]
struct StrideEntry {
    /// Most recent line address observed for this PC.
    last_addr: u64,
    /// Detected stride in bytes (signed); 0 until measured.
    stride: i64,
    /// Saturating confirmation counter.
    confidence: i32,
}

/// Stateful per-cache (or per-core) prefetch engine.
#[derive(Debug)]
pub struct Prefetcher {
    policy: PrefetchPolicy,
    /// Lines emitted per triggering miss.
    degree: usize,
    line_bytes: u64,
    stream_table: [StreamEntry; STREAM_TABLE_ENTRIES],
    stride_table: HashMap<u64, StrideEntry>,
    stats: PrefetchStats,
}

impl Prefetcher {
    /// Creates a prefetcher for a cache with `line_bytes` lines.
    ///
    /// A degree of 0 is clamped to 1.
    pub fn new(policy: PrefetchPolicy, degree: usize, line_bytes: usize) -> Self {
        Self {
            policy,
            degree: degree.max(1),
            line_bytes: line_bytes as u64,
            stream_table: [StreamEntry::default(); STREAM_TABLE_ENTRIES],
            stride_table: HashMap::new(),
            stats: PrefetchStats::default(),
        }
    }

    /// Reacts to a demand miss at `addr` (issued by instruction `pc`, 0 when
    /// unknown) and returns the line-base addresses to prefetch.
    ///
    /// Updates the detector state and the `issued` counter.
    pub fn on_miss(&mut self, addr: u64, pc: u64) -> Vec<u64> {
        let targets = match self.policy {
            PrefetchPolicy::None => Vec::new(),
            PrefetchPolicy::NextLine => self.next_line_prefetch(addr),
            PrefetchPolicy::Stream => self.stream_prefetch(addr),
            PrefetchPolicy::Stride => self.stride_prefetch(addr, pc),
            PrefetchPolicy::Adaptive | PrefetchPolicy::Intel => self.adaptive_prefetch(addr, pc),
        };
        self.stats.issued += targets.len() as u64;
        targets
    }

    /// Credits a prefetched line consumed by a demand access.
    pub fn record_useful_prefetch(&mut self) {
        self.stats.useful += 1;
    }

    /// Records a prefetched line evicted before any use.
    pub fn record_useless_prefetch(&mut self) {
        self.stats.useless += 1;
    }

    /// Current policy.
    pub const fn policy(&self) -> PrefetchPolicy {
        self.policy
    }

    /// Switches the policy; detector state is retained.
    pub fn set_policy(&mut self, policy: PrefetchPolicy) {
        self.policy = policy;
    }

    /// Current prefetch degree.
    pub const fn degree(&self) -> usize {
        self.degree
    }

    /// Sets the prefetch degree (clamped to at least 1).
    pub fn set_degree(&mut self, degree: usize) {
        self.degree = degree.max(1);
    }

    /// Accumulated effectiveness counters.
    pub const fn stats(&self) -> &PrefetchStats {
        &self.stats
    }

    /// Clears the counters (detector state is retained).
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Next-line: the `degree` lines following `addr`.
    fn next_line_prefetch(&self, addr: u64) -> Vec<u64> {
        let line = line_base(addr, self.line_bytes);
        (1..=self.degree as u64)
            .map(|i| line.wrapping_add(i * self.line_bytes))
            .collect()
    }

    /// Stream: update the page's entry, then emit ahead of the stream once
    /// confidence clears the threshold. Never crosses the 4 KiB page.
    fn stream_prefetch(&mut self, addr: u64) -> Vec<u64> {
        self.update_stream_table(addr);

        let line = line_base(addr, self.line_bytes);
        let page = page_number(addr);
        let mut targets = Vec::new();

        for entry in &self.stream_table {
            if !entry.valid || page_number(entry.last_addr) != page {
                continue;
            }
            if entry.confidence >= CONFIDENCE_THRESHOLD {
                for i in 1..=self.degree as i64 {
                    let target = (line as i64).wrapping_add(entry.direction * i * self.line_bytes as i64) as u64;
                    if page_number(target) == page {
                        targets.push(target);
                    }
                }
                break;
            }
        }

        targets
    }

    /// Stream table update rule: extend a matching stream (±1 line in its
    /// direction), decay on a near gap (within 4 lines), otherwise start or
    /// steal an entry.
    fn update_stream_table(&mut self, addr: u64) {
        let line = line_base(addr, self.line_bytes);
        let page = page_number(addr);
        let line_size = self.line_bytes as i64;

        for entry in &mut self.stream_table {
            if !entry.valid || page_number(entry.last_addr) != page {
                continue;
            }
            let delta = (line as i64).wrapping_sub(entry.last_addr as i64);
            if delta == line_size && entry.direction >= 0 {
                entry.last_addr = line;
                entry.direction = 1;
                entry.confidence = (entry.confidence + 1).min(MAX_CONFIDENCE);
                return;
            } else if delta == -line_size && entry.direction <= 0 {
                entry.last_addr = line;
                entry.direction = -1;
                entry.confidence = (entry.confidence + 1).min(MAX_CONFIDENCE);
                return;
            } else if delta.abs() <= 4 * line_size {
                // Near gap: decay rather than retarget.
                entry.confidence -= 1;
                if entry.confidence <= 0 {
                    entry.valid = false;
                }
                return;
            }
        }

        for entry in &mut self.stream_table {
            if !entry.valid {
                *entry = StreamEntry {
                    start_addr: line,
                    last_addr: line,
                    direction: 0,
                    confidence: 1,
                    valid: true,
                };
                return;
            }
        }

        // Table full: steal the lowest-confidence entry.
        let mut victim = 0;
        let mut min_confidence = self.stream_table[0].confidence;
        for (i, entry) in self.stream_table.iter().enumerate().skip(1) {
            if entry.confidence < min_confidence {
                min_confidence = entry.confidence;
                victim = i;
            }
        }
        trace!(
            start_addr = self.stream_table[victim].start_addr,
            "stealing lowest-confidence stream entry"
        );
        self.stream_table[victim] = StreamEntry {
            start_addr: line,
            last_addr: line,
            direction: 0,
            confidence: 1,
            valid: true,
        };
    }

    /// Stride: update the PC's entry, then emit along the stride once
    /// confidence clears the threshold.
    fn stride_prefetch(&mut self, addr: u64, pc: u64) -> Vec<u64> {
        self.update_stride_table(addr, pc);

        let Some(entry) = self.stride_table.get(&pc) else {
            return Vec::new();
        };
        if entry.confidence < CONFIDENCE_THRESHOLD || entry.stride == 0 {
            return Vec::new();
        }

        let line = line_base(addr, self.line_bytes);
        (1..=self.degree as i64)
            .map(|i| (line as i64).wrapping_add(i * entry.stride) as u64)
            .collect()
    }

    /// Stride table update rule: measure the first stride, confirm or decay
    /// thereafter, and retarget once confidence is exhausted.
    fn update_stride_table(&mut self, addr: u64, pc: u64) {
        if pc == 0 {
            // No PC information in the trace.
            return;
        }

        let line = line_base(addr, self.line_bytes);
        let entry = match self.stride_table.entry(pc) {
            Entry::Vacant(slot) => {
                let _ = slot.insert(StrideEntry {
                    last_addr: line,
                    stride: 0,
                    confidence: 1,
                });
                return;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        let new_stride = (line as i64).wrapping_sub(entry.last_addr as i64);
        if entry.stride == 0 {
            entry.stride = new_stride;
            entry.last_addr = line;
            return;
        }

        if new_stride == entry.stride {
            entry.confidence = (entry.confidence + 1).min(MAX_CONFIDENCE);
        } else {
            entry.confidence -= 1;
            if entry.confidence <= 0 {
                entry.stride = new_stride;
                entry.confidence = 1;
            }
        }
        entry.last_addr = line;
    }

    /// Adaptive: stride first (more specific), stream as the fallback.
    fn adaptive_prefetch(&mut self, addr: u64, pc: u64) -> Vec<u64> {
        let stride_targets = self.stride_prefetch(addr, pc);
        if !stride_targets.is_empty() {
            return stride_targets;
        }
        self.stream_prefetch(addr)
    }
}
