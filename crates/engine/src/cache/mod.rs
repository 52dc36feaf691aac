//! Set-associative cache level.
//!
//! This module implements one level of the cache hierarchy:
//! 1. **Decode:** offset/index/tag extraction and line-base reconstruction
//!    driven by the level's [`CacheConfig`].
//! 2. **Replacement:** LRU, tree-PLRU, RANDOM, SRRIP, and BRRIP victim
//!    selection, dispatched by a match over the closed policy set.
//! 3. **Operations:** demand `access`, stat-neutral `install` (fills and
//!    prefetches), coherence-tagged installs, invalidation, and the
//!    Modified→Shared downgrade.
//!
//! An invalid way always wins victim selection; every policy breaks its
//! remaining ties toward the lowest way index so two runs of the same trace
//! produce identical placements. The RANDOM and BRRIP policies draw from a
//! per-level xorshift64 generator seeded with 0 by default.

/// 3C miss classification (compulsory / capacity / conflict).
pub mod classify;

use serde::Serialize;

use self::classify::{MissClassifier, MissKind};
use crate::coherence::CoherenceState;
use crate::common::error::ConfigError;
use crate::config::{CacheConfig, ReplacementPolicy, WritePolicy};
use crate::stats::CacheStats;

/// One way within one set: tag, validity, dirtiness, and replacement state.
#[derive(Debug, Clone, Default)]
struct CacheLine {
    tag: u64,
    valid: bool,
    dirty: bool,
    /// Monotonic access stamp for LRU.
    lru_time: u64,
    /// 2-bit re-reference prediction value for SRRIP/BRRIP.
    rrip_value: u8,
    /// Coherence tag; meaningful in multi-core hierarchies only.
    state: CoherenceState,
}

/// Lookup outcome of one cache-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccessResult {
    /// The line was resident.
    Hit,
    /// The line was installed without displacing a valid line.
    Miss,
    /// The line was installed and a valid victim was displaced.
    MissWithEviction,
}

/// Result of an access or install, including eviction details the caller
/// must route (writebacks, back-invalidation, directory maintenance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessInfo {
    /// Hit/miss/eviction classification.
    pub result: AccessResult,
    /// The displaced victim was dirty and needs a writeback.
    pub was_dirty: bool,
    /// Line-base address of the displaced victim, for any eviction of a
    /// valid line (clean or dirty).
    pub evicted_address: Option<u64>,
}

impl AccessInfo {
    /// A plain hit.
    const fn hit() -> Self {
        Self {
            result: AccessResult::Hit,
            was_dirty: false,
            evicted_address: None,
        }
    }

    /// Whether the operation hit.
    #[inline]
    pub const fn is_hit(&self) -> bool {
        matches!(self.result, AccessResult::Hit)
    }

    /// Whether the operation displaced a valid line.
    #[inline]
    pub const fn had_eviction(&self) -> bool {
        self.evicted_address.is_some()
    }
}

/// Marsaglia xorshift64 generator for RANDOM victim selection and BRRIP
/// insertion. Seeded deterministically so replacement is reproducible.
#[derive(Debug, Clone)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Classic non-zero xorshift64 seed, used when the caller's seed is 0.
    const DEFAULT_STATE: u64 = 88172645463325252;

    fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { Self::DEFAULT_STATE } else { seed },
        }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// One set-associative cache level.
///
/// Operates on line-base addresses (offset bits of incoming addresses are
/// ignored by the decode). Sole owner of its lines; all mutation goes through
/// the methods below.
#[derive(Debug)]
pub struct CacheLevel {
    config: CacheConfig,
    /// `num_sets * ways` lines, set-major.
    lines: Vec<CacheLine>,
    /// One tree-bit vector per set, used by PLRU.
    plru_bits: Vec<u64>,
    /// Monotonic operation counter; stamps lines for LRU.
    access_time: u64,
    rng: XorShift64,
    stats: CacheStats,
    classifier: Option<MissClassifier>,
}

impl CacheLevel {
    /// Builds a level from its configuration.
    ///
    /// 3C miss classification is enabled by default; disable it with
    /// [`CacheLevel::set_track_classification`] for faster runs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration violates a geometry
    /// invariant (see [`CacheConfig::validate`]).
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_lines = config.num_lines();
        let num_sets = config.num_sets();
        Ok(Self {
            lines: vec![CacheLine::default(); num_lines],
            plru_bits: vec![0; num_sets],
            access_time: 0,
            rng: XorShift64::new(0),
            classifier: Some(MissClassifier::new(num_lines)),
            stats: CacheStats::default(),
            config,
        })
    }

    /// The level's configuration.
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Line size in bytes.
    pub const fn line_bytes(&self) -> usize {
        self.config.line_bytes
    }

    /// Accumulated counters.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Clears the counters. Classifier history (first-touch knowledge) is
    /// kept so compulsory misses stay compulsory across a reset.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Enables or disables 3C miss classification.
    pub fn set_track_classification(&mut self, enabled: bool) {
        if enabled {
            if self.classifier.is_none() {
                self.classifier = Some(MissClassifier::new(self.config.num_lines()));
            }
        } else {
            self.classifier = None;
        }
    }

    /// Reseeds the replacement PRNG (RANDOM victim selection, BRRIP
    /// insertion). Seed 0 selects the built-in default state.
    pub fn set_rng_seed(&mut self, seed: u64) {
        self.rng = XorShift64::new(seed);
    }

    /// Demand access: looks the line up, promotes it on a hit, installs it
    /// on a miss, and counts against the level's hit/miss statistics.
    pub fn access(&mut self, addr: u64, is_write: bool) -> AccessInfo {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        self.access_time += 1;

        if let Some(way) = self.find_way(index, tag) {
            self.promote(index, way);
            if is_write {
                self.mark_written(index, way);
            }
            self.stats.hits += 1;
            self.classifier_touch(addr);
            return AccessInfo::hit();
        }

        self.stats.misses += 1;
        self.classify_miss(addr);
        let dirty = is_write && self.write_dirties();
        if is_write && self.config.write_policy == WritePolicy::WriteThrough {
            self.stats.writebacks += 1;
        }
        self.place(index, tag, dirty, CoherenceState::Invalid)
    }

    /// Installs a line without counting a demand hit or miss.
    ///
    /// Used for fills from lower levels, exclusive-policy victim moves, and
    /// prefetches. Returns the same eviction information as [`access`] so
    /// the caller can route writebacks.
    ///
    /// [`access`]: CacheLevel::access
    pub fn install(&mut self, addr: u64, is_dirty: bool) -> AccessInfo {
        self.fill(addr, is_dirty, None)
    }

    /// Installs a line carrying an explicit coherence state (multi-core
    /// fills). A [`CoherenceState::Modified`] install marks the line dirty.
    pub fn install_with_state(&mut self, addr: u64, state: CoherenceState) -> AccessInfo {
        self.fill(addr, state.is_dirty(), Some(state))
    }

    /// Shared fill path. `state: None` leaves the coherence tag of a
    /// resident line untouched.
    fn fill(&mut self, addr: u64, want_dirty: bool, state: Option<CoherenceState>) -> AccessInfo {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        self.access_time += 1;

        let dirty = want_dirty && self.write_dirties();
        if let Some(way) = self.find_way(index, tag) {
            self.promote(index, way);
            let line = &mut self.lines[index * self.config.ways + way];
            line.dirty |= dirty;
            if let Some(state) = state {
                line.state = state;
            }
            return AccessInfo::hit();
        }

        self.place(index, tag, dirty, state.unwrap_or_default())
    }

    /// Whether the line containing `addr` is resident.
    pub fn is_present(&self, addr: u64) -> bool {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        self.find_way(index, tag).is_some()
    }

    /// Whether the line containing `addr` is resident and dirty.
    pub fn is_dirty(&self, addr: u64) -> bool {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        self.find_way(index, tag)
            .is_some_and(|way| self.lines[index * self.config.ways + way].dirty)
    }

    /// Invalidates the line containing `addr` if resident.
    ///
    /// Clears valid, dirty, and coherence state; counts exactly one
    /// invalidation when the line was present.
    pub fn invalidate(&mut self, addr: u64) {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        if let Some(way) = self.find_way(index, tag) {
            let line = &mut self.lines[index * self.config.ways + way];
            line.valid = false;
            line.dirty = false;
            line.state = CoherenceState::Invalid;
            self.stats.invalidations += 1;
        }
    }

    /// Downgrades a Modified line to Shared, clearing its dirty bit.
    ///
    /// Returns the previous dirtiness so the caller can route the data as a
    /// writeback. Returns `false` when the line is absent.
    pub fn downgrade_to_shared(&mut self, addr: u64) -> bool {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        if let Some(way) = self.find_way(index, tag) {
            let line = &mut self.lines[index * self.config.ways + way];
            let was_dirty = line.dirty;
            line.dirty = false;
            line.state = CoherenceState::Shared;
            return was_dirty;
        }
        false
    }

    /// Coherence state of the line containing `addr`;
    /// [`CoherenceState::Invalid`] when absent.
    pub fn coherence_state(&self, addr: u64) -> CoherenceState {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        self.find_way(index, tag)
            .map_or(CoherenceState::Invalid, |way| {
                self.lines[index * self.config.ways + way].state
            })
    }

    /// Retags the coherence state of a resident line (S→M and E→M upgrades
    /// on write hits). A Modified retag also dirties the line.
    pub fn set_coherence_state(&mut self, addr: u64, state: CoherenceState) {
        let index = self.config.index_of(addr) as usize;
        let tag = self.config.tag_of(addr);
        if let Some(way) = self.find_way(index, tag) {
            let dirty = state.is_dirty() && self.write_dirties();
            let line = &mut self.lines[index * self.config.ways + way];
            line.state = state;
            line.dirty |= dirty;
        }
    }

    /// Reconstructs the line-base addresses of every valid line.
    ///
    /// Used by inclusion audits and tests.
    pub fn get_all_addresses(&self) -> Vec<u64> {
        let mut addresses = Vec::new();
        for index in 0..self.config.num_sets() {
            for way in 0..self.config.ways {
                let line = &self.lines[index * self.config.ways + way];
                if line.valid {
                    addresses.push(self.config.rebuild_address(line.tag, index as u64));
                }
            }
        }
        addresses
    }

    /// Finds the way holding `tag` in `index`, if any.
    fn find_way(&self, index: usize, tag: u64) -> Option<usize> {
        let base = index * self.config.ways;
        (0..self.config.ways)
            .find(|&way| self.lines[base + way].valid && self.lines[base + way].tag == tag)
    }

    /// Whether writes dirty lines under this level's write policy.
    const fn write_dirties(&self) -> bool {
        matches!(self.config.write_policy, WritePolicy::WriteBack)
    }

    /// Write-hit bookkeeping under the level's write policy.
    fn mark_written(&mut self, index: usize, way: usize) {
        match self.config.write_policy {
            WritePolicy::WriteBack => self.lines[index * self.config.ways + way].dirty = true,
            WritePolicy::WriteThrough => self.stats.writebacks += 1,
            WritePolicy::ReadOnly => {}
        }
    }

    /// Replacement-state promotion on a hit: fresh LRU stamp, RRPV to 0,
    /// PLRU path update.
    fn promote(&mut self, index: usize, way: usize) {
        let line = &mut self.lines[index * self.config.ways + way];
        line.lru_time = self.access_time;
        if matches!(
            self.config.policy,
            ReplacementPolicy::Srrip | ReplacementPolicy::Brrip
        ) {
            line.rrip_value = 0;
        }
        self.update_plru(index, way);
    }

    /// Installs `(tag, index)` over the policy's victim and reports what was
    /// displaced.
    fn place(&mut self, index: usize, tag: u64, dirty: bool, state: CoherenceState) -> AccessInfo {
        let way = self.find_victim(index);
        let insertion_rrip = self.insertion_rrip();

        let victim = &mut self.lines[index * self.config.ways + way];
        let victim_was_valid = victim.valid;
        let victim_tag = victim.tag;
        let was_dirty = victim.valid && victim.dirty;
        *victim = CacheLine {
            tag,
            valid: true,
            dirty,
            lru_time: self.access_time,
            rrip_value: insertion_rrip,
            state,
        };

        let evicted =
            victim_was_valid.then(|| self.config.rebuild_address(victim_tag, index as u64));
        if was_dirty {
            self.stats.writebacks += 1;
        }
        self.update_plru(index, way);

        AccessInfo {
            result: if evicted.is_some() {
                AccessResult::MissWithEviction
            } else {
                AccessResult::Miss
            },
            was_dirty,
            evicted_address: evicted,
        }
    }

    /// RRPV assigned to a newly installed line: 2 under SRRIP, mostly 3
    /// under BRRIP (2 in 1/32 of installs), 0 otherwise.
    fn insertion_rrip(&mut self) -> u8 {
        match self.config.policy {
            ReplacementPolicy::Srrip => 2,
            ReplacementPolicy::Brrip => {
                if self.rng.next() % 32 == 0 {
                    2
                } else {
                    3
                }
            }
            _ => 0,
        }
    }

    /// Selects the victim way for `index`: the first invalid way, otherwise
    /// the policy's choice.
    fn find_victim(&mut self, index: usize) -> usize {
        let base = index * self.config.ways;
        if let Some(way) = (0..self.config.ways).find(|&w| !self.lines[base + w].valid) {
            return way;
        }

        match self.config.policy {
            ReplacementPolicy::Lru => self.find_victim_lru(index),
            ReplacementPolicy::Plru => self.find_victim_plru(index),
            ReplacementPolicy::Random => (self.rng.next() as usize) % self.config.ways,
            ReplacementPolicy::Srrip | ReplacementPolicy::Brrip => self.find_victim_rrip(index),
        }
    }

    /// Smallest LRU stamp wins; strict comparison keeps the lowest way on
    /// ties.
    fn find_victim_lru(&self, index: usize) -> usize {
        let base = index * self.config.ways;
        let mut victim = 0;
        let mut oldest = self.lines[base].lru_time;
        for way in 1..self.config.ways {
            if self.lines[base + way].lru_time < oldest {
                oldest = self.lines[base + way].lru_time;
                victim = way;
            }
        }
        victim
    }

    /// Walks the PLRU tree bits from the root to a leaf: a set bit descends
    /// right, a clear bit descends left.
    fn find_victim_plru(&self, index: usize) -> usize {
        let bits = self.plru_bits[index];
        let mut node = 0usize;
        let mut way = 0usize;
        let mut level = self.config.ways / 2;
        while level >= 1 {
            if bits & (1 << node) != 0 {
                way += level;
                node = 2 * node + 2;
            } else {
                node = 2 * node + 1;
            }
            level /= 2;
        }
        way
    }

    /// Scans for RRPV 3; if none, ages every line and rescans. Bounded: each
    /// aging pass raises the maximum RRPV toward 3.
    fn find_victim_rrip(&mut self, index: usize) -> usize {
        let base = index * self.config.ways;
        loop {
            if let Some(way) =
                (0..self.config.ways).find(|&w| self.lines[base + w].rrip_value >= 3)
            {
                return way;
            }
            for way in 0..self.config.ways {
                self.lines[base + way].rrip_value += 1;
            }
        }
    }

    /// Points the PLRU tree bits along the path to `way` away from it, so
    /// the just-used way is protected from the next eviction.
    fn update_plru(&mut self, index: usize, way: usize) {
        if self.config.policy != ReplacementPolicy::Plru {
            return;
        }
        let bits = &mut self.plru_bits[index];
        let mut node = 0usize;
        let mut range_start = 0usize;
        let mut range_size = self.config.ways;
        while range_size > 1 {
            let mid = range_start + range_size / 2;
            if way < mid {
                *bits |= 1 << node;
                range_size /= 2;
                node = 2 * node + 1;
            } else {
                *bits &= !(1 << node);
                range_start = mid;
                range_size /= 2;
                node = 2 * node + 2;
            }
        }
    }

    /// Records a resident-line touch with the classifier's shadow cache.
    fn classifier_touch(&mut self, addr: u64) {
        let line = self.config.line_base(addr);
        if let Some(classifier) = &mut self.classifier {
            classifier.touch(line);
        }
    }

    /// Classifies a demand miss into the 3C buckets.
    fn classify_miss(&mut self, addr: u64) {
        let line = self.config.line_base(addr);
        if let Some(classifier) = &mut self.classifier {
            match classifier.classify(line) {
                MissKind::Compulsory => self.stats.compulsory_misses += 1,
                MissKind::Capacity => self.stats.capacity_misses += 1,
                MissKind::Conflict => self.stats.conflict_misses += 1,
            }
        }
    }
}
