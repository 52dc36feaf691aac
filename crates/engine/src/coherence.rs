//! Directory-based MESI-like cache coherence.
//!
//! This module implements the coherence machinery for multi-core
//! hierarchies:
//! 1. **States:** the four-state Modified/Exclusive/Shared/Invalid protocol
//!    (no Owned state) tagged on each L1 line.
//! 2. **Directory:** a map from line-base address to the set of sharing
//!    cores and the current owner.
//! 3. **Snooping:** read and read-exclusive requests that query and
//!    invalidate peer L1 copies.
//!
//! Only peer L1 caches participate; the shared L2/L3 are outside the
//! invalidation protocol. The controller holds no references to caches: it
//! borrows the per-core L1 slice for the scope of a single request, so no
//! reference outlives one `process(event)` call.

use std::collections::{BTreeSet, HashMap};

use crate::cache::CacheLevel;

/// Coherence state of one cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoherenceState {
    /// Line not present (or invalidated by a peer write).
    #[default]
    Invalid,
    /// Present in this cache and possibly others; clean.
    Shared,
    /// Present only in this cache; clean.
    Exclusive,
    /// Present only in this cache; dirty.
    Modified,
}

impl CoherenceState {
    /// Whether a read may be serviced from a line in this state.
    #[inline]
    pub const fn can_read(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Whether a write may proceed without a bus transaction.
    #[inline]
    pub const fn can_write_silently(self) -> bool {
        matches!(self, Self::Modified | Self::Exclusive)
    }

    /// Whether the state implies dirty data.
    #[inline]
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Modified)
    }
}

/// Outcome of snooping peer caches for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnoopResult {
    /// At least one peer had the line.
    pub found: bool,
    /// A peer held the line dirty; its data must be routed as a writeback.
    pub was_modified: bool,
    /// The core that held the dirty copy, when `was_modified` is set.
    pub data_source_core: Option<usize>,
}

/// Directory record for one line: which cores share it and who owns it.
#[derive(Debug, Clone, Default)]
struct DirectoryEntry {
    sharers: BTreeSet<usize>,
    owner: Option<usize>,
}

/// Directory-based coherence controller for the per-core L1 caches.
///
/// The directory tracks `line base → {sharers, owner}`. Entries appear on the
/// first sharing request for a line and disappear when every core has evicted
/// it.
#[derive(Debug, Default)]
pub struct CoherenceController {
    directory: HashMap<u64, DirectoryEntry>,
}

impl CoherenceController {
    /// Creates an empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Services a read request from `requester` for `line`.
    ///
    /// Marks `found` when any peer L1 in `l1s` holds the line; when a peer
    /// holds it dirty, sets `was_modified` and names that core as the data
    /// source. The requester and every found peer are recorded as sharers.
    ///
    /// The caller must, on `was_modified`, downgrade the owner's line
    /// Modified→Shared and route its dirty data as a writeback; the owner's
    /// sharers entry is preserved.
    pub fn request_read(
        &mut self,
        requester: usize,
        line: u64,
        l1s: &[CacheLevel],
    ) -> SnoopResult {
        let mut result = SnoopResult::default();
        let entry = self.directory.entry(line).or_default();

        for (core, l1) in l1s.iter().enumerate() {
            if core == requester || !l1.is_present(line) {
                continue;
            }
            result.found = true;
            if l1.is_dirty(line) {
                result.was_modified = true;
                result.data_source_core = Some(core);
            }
            let _ = entry.sharers.insert(core);
        }

        let _ = entry.sharers.insert(requester);
        result
    }

    /// Services a read-exclusive (write) request from `requester` for
    /// `line`.
    ///
    /// Every peer copy is invalidated. The sharer set is cleared and the
    /// requester becomes the owner.
    pub fn request_exclusive(
        &mut self,
        requester: usize,
        line: u64,
        l1s: &mut [CacheLevel],
    ) -> SnoopResult {
        let mut result = SnoopResult::default();

        for (core, l1) in l1s.iter_mut().enumerate() {
            if core == requester || !l1.is_present(line) {
                continue;
            }
            result.found = true;
            if l1.is_dirty(line) {
                result.was_modified = true;
                result.data_source_core = Some(core);
            }
            l1.invalidate(line);
        }

        let entry = self.directory.entry(line).or_default();
        entry.sharers.clear();
        entry.owner = Some(requester);
        result
    }

    /// Records that `core` evicted `line` from its L1.
    ///
    /// The core leaves the sharer set, ownership is dropped if it held it,
    /// and the entry disappears once no sharers remain.
    pub fn evict_line(&mut self, core: usize, line: u64) {
        if let Some(entry) = self.directory.get_mut(&line) {
            let _ = entry.sharers.remove(&core);
            if entry.owner == Some(core) {
                entry.owner = None;
            }
            if entry.sharers.is_empty() {
                let _ = self.directory.remove(&line);
            }
        }
    }

    /// Number of cores currently sharing `line`.
    pub fn sharer_count(&self, line: u64) -> usize {
        self.directory.get(&line).map_or(0, |e| e.sharers.len())
    }

    /// Current owner of `line`, if any.
    pub fn owner(&self, line: u64) -> Option<usize> {
        self.directory.get(&line).and_then(|e| e.owner)
    }

    /// Advisory false-sharing signal: whether the line containing `addr` has
    /// two or more sharers.
    ///
    /// Over-reports true sharing; authoritative detection lives in the
    /// multi-core hierarchy's witness map.
    pub fn detect_false_sharing(&self, addr: u64, line_bytes: u64) -> bool {
        self.sharer_count(addr & !(line_bytes - 1)) > 1
    }
}
