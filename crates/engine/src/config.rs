//! Configuration system for the cache simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a simulation. It provides:
//! 1. **Defaults:** Baseline hardware constants (cache geometry, TLB shape,
//!    latencies).
//! 2. **Structures:** Per-level cache configuration, TLB configuration,
//!    latency table, and the hierarchy description.
//! 3. **Enums:** Replacement policy, write policy, inclusion policy, and
//!    prefetch policy.
//!
//! Configuration is supplied via JSON (`serde` deserialization) or built in
//! code; use [`HierarchyConfig::default`] for a generic three-level machine.

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden.
mod defaults {
    /// Default L1 cache size in bytes (32 KiB).
    pub const L1_SIZE: usize = 32 * 1024;

    /// Default L1 associativity (8 ways).
    pub const L1_WAYS: usize = 8;

    /// Default cache line size in bytes.
    ///
    /// Matches typical modern processor cache line sizes.
    pub const CACHE_LINE: usize = 64;

    /// Default L2 cache size in bytes (256 KiB).
    pub const L2_SIZE: usize = 256 * 1024;

    /// Default L2 associativity (4 ways).
    pub const L2_WAYS: usize = 4;

    /// Default L3 cache size in bytes (8 MiB).
    pub const L3_SIZE: usize = 8 * 1024 * 1024;

    /// Default L3 associativity (16 ways).
    pub const L3_WAYS: usize = 16;

    /// Default TLB entry count.
    pub const TLB_ENTRIES: usize = 64;

    /// Default TLB associativity (4 ways).
    pub const TLB_WAYS: usize = 4;

    /// Default page size in bytes (4 KiB).
    pub const PAGE_BYTES: u64 = 4096;

    /// L1 hit latency in cycles.
    pub const L1_HIT_CYCLES: u64 = 4;

    /// L2 hit latency in cycles.
    pub const L2_HIT_CYCLES: u64 = 12;

    /// L3 hit latency in cycles.
    pub const L3_HIT_CYCLES: u64 = 40;

    /// Main memory access latency in cycles.
    pub const MEMORY_CYCLES: u64 = 200;

    /// Penalty added to an access whose TLB lookup missed.
    pub const TLB_MISS_PENALTY: u64 = 30;
}

/// Cache replacement policy algorithms.
///
/// Specifies the algorithm used to select which cache line to evict when a
/// new line must be installed in a full set. An invalid way always takes
/// priority; all policies break remaining ties toward the lowest way index
/// for cross-run determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    /// Least Recently Used: evicts the line with the oldest access stamp.
    #[default]
    #[serde(alias = "Lru")]
    Lru,
    /// Pseudo-LRU (tree-based): approximates LRU with W-1 tree bits per set.
    ///
    /// Requires power-of-two associativity.
    #[serde(alias = "Plru")]
    Plru,
    /// Random replacement driven by the level's seeded xorshift generator.
    #[serde(alias = "Random")]
    Random,
    /// Static Re-Reference Interval Prediction: 2-bit RRPV per line,
    /// insertion at 2, promotion to 0 on hit, eviction at 3.
    #[serde(alias = "Srrip")]
    Srrip,
    /// Bimodal RRIP: scan-resistant variant inserting at RRPV 3 in 31/32 of
    /// cases and at 2 otherwise.
    #[serde(alias = "Brrip")]
    Brrip,
}

/// Write handling policy for one cache level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WritePolicy {
    /// Writes dirty the line; modified data leaves the level only on
    /// eviction.
    #[default]
    WriteBack,
    /// Writes propagate immediately: the line stays clean and each write
    /// counts one writeback.
    WriteThrough,
    /// Writes are ignored (instruction caches).
    ReadOnly,
}

/// Cross-level inclusion policy of a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum InclusionPolicy {
    /// Every line present in a higher level is also present below; outer
    /// evictions back-invalidate the levels above.
    #[default]
    Inclusive,
    /// A line lives in at most one level; hits in an outer level move the
    /// line inward, evictions push victims outward.
    Exclusive,
    /// Non-inclusive, non-exclusive: no cross-level invariant.
    #[serde(alias = "NINE")]
    Nine,
}

/// Hardware prefetcher policies.
///
/// Prefetchers observe demand misses and emit line-base addresses to fetch
/// ahead of use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PrefetchPolicy {
    /// No prefetching.
    #[default]
    None,
    /// Prefetch the next `degree` sequential lines after each miss.
    NextLine,
    /// Detect per-page sequential streams (ascending or descending) and
    /// prefetch ahead within the page.
    Stream,
    /// Detect constant strides per instruction address and prefetch along
    /// the stride.
    Stride,
    /// Try stride detection first; fall back to stream detection.
    Adaptive,
    /// Intel-like prefetching; behaves as [`PrefetchPolicy::Adaptive`].
    ///
    /// The adjacent-line component is intentionally omitted.
    Intel,
}

/// Configuration of one set-associative cache level.
///
/// Invariants enforced by [`CacheConfig::validate`]: the line size is a power
/// of two and the derived set count `size_bytes / (line_bytes * ways)` is a
/// positive power of two, so that index and tag extraction reduce to shifts
/// and masks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Total cache size in bytes.
    #[serde(default = "CacheConfig::default_size")]
    pub size_bytes: usize,

    /// Associativity (number of ways per set).
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,

    /// Cache line size in bytes (power of two).
    #[serde(default = "CacheConfig::default_line")]
    pub line_bytes: usize,

    /// Replacement policy.
    #[serde(default)]
    pub policy: ReplacementPolicy,

    /// Write handling policy.
    #[serde(default)]
    pub write_policy: WritePolicy,
}

impl CacheConfig {
    /// Returns the default cache size in bytes.
    fn default_size() -> usize {
        defaults::L1_SIZE
    }

    /// Returns the default associativity.
    fn default_ways() -> usize {
        defaults::L1_WAYS
    }

    /// Returns the default line size in bytes.
    fn default_line() -> usize {
        defaults::CACHE_LINE
    }

    /// Builds a level configuration from its geometry, keeping the default
    /// policies.
    pub fn new(size_bytes: usize, ways: usize, line_bytes: usize) -> Self {
        Self {
            size_bytes,
            ways,
            line_bytes,
            policy: ReplacementPolicy::default(),
            write_policy: WritePolicy::default(),
        }
    }

    /// Checks the geometry invariants.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first violated invariant: zero
    /// size, zero associativity, non-power-of-two line size, a set count
    /// that is not a positive power of two, or PLRU with non-power-of-two
    /// associativity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_bytes == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if self.ways == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if !self.line_bytes.is_power_of_two() {
            return Err(ConfigError::LineNotPowerOfTwo(self.line_bytes));
        }
        let sets = self.num_sets();
        if sets == 0 || !sets.is_power_of_two() {
            return Err(ConfigError::SetsNotPowerOfTwo(sets));
        }
        if self.policy == ReplacementPolicy::Plru && !self.ways.is_power_of_two() {
            return Err(ConfigError::PlruAssociativity(self.ways));
        }
        Ok(())
    }

    /// Number of sets: `size / (line * ways)`.
    #[inline]
    pub const fn num_sets(&self) -> usize {
        self.size_bytes / (self.line_bytes * self.ways)
    }

    /// Number of lines the level can hold.
    #[inline]
    pub const fn num_lines(&self) -> usize {
        self.size_bytes / self.line_bytes
    }

    /// Number of address bits selecting the byte within a line.
    #[inline]
    pub const fn offset_bits(&self) -> u32 {
        self.line_bytes.trailing_zeros()
    }

    /// Number of address bits selecting the set.
    #[inline]
    pub const fn index_bits(&self) -> u32 {
        self.num_sets().trailing_zeros()
    }

    /// Number of tag bits: `64 - offset_bits - index_bits`.
    #[inline]
    pub const fn tag_bits(&self) -> u32 {
        64 - self.offset_bits() - self.index_bits()
    }

    /// Extracts the byte offset of `addr` within its line.
    #[inline]
    pub const fn offset_of(&self, addr: u64) -> u64 {
        addr & (self.line_bytes as u64 - 1)
    }

    /// Extracts the set index from `addr`.
    #[inline]
    pub const fn index_of(&self, addr: u64) -> u64 {
        (addr >> self.offset_bits()) & (self.num_sets() as u64 - 1)
    }

    /// Extracts the tag from `addr`.
    #[inline]
    pub const fn tag_of(&self, addr: u64) -> u64 {
        addr >> (self.offset_bits() + self.index_bits())
    }

    /// Rebuilds the line-base address from a (tag, index) pair.
    ///
    /// For every address, `rebuild_address(tag_of(a), index_of(a)) |
    /// offset_of(a) == a` bit for bit.
    #[inline]
    pub const fn rebuild_address(&self, tag: u64, index: u64) -> u64 {
        (tag << (self.offset_bits() + self.index_bits())) | (index << self.offset_bits())
    }

    /// Returns `addr` with its offset bits cleared.
    #[inline]
    pub const fn line_base(&self, addr: u64) -> u64 {
        addr & !(self.line_bytes as u64 - 1)
    }
}

impl Default for CacheConfig {
    /// Default L1 geometry: 32 KiB, 8-way, 64-byte lines, LRU, write-back.
    fn default() -> Self {
        Self::new(defaults::L1_SIZE, defaults::L1_WAYS, defaults::CACHE_LINE)
    }
}

/// Configuration of a set-associative TLB.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TlbConfig {
    /// Total number of entries.
    #[serde(default = "TlbConfig::default_entries")]
    pub entries: usize,

    /// Associativity (number of ways per set).
    #[serde(default = "TlbConfig::default_ways")]
    pub ways: usize,

    /// Page size in bytes (power of two).
    #[serde(default = "TlbConfig::default_page")]
    pub page_bytes: u64,
}

impl TlbConfig {
    /// Returns the default entry count.
    fn default_entries() -> usize {
        defaults::TLB_ENTRIES
    }

    /// Returns the default associativity.
    fn default_ways() -> usize {
        defaults::TLB_WAYS
    }

    /// Returns the default page size in bytes.
    fn default_page() -> u64 {
        defaults::PAGE_BYTES
    }

    /// Number of sets: `entries / ways`.
    #[inline]
    pub const fn num_sets(&self) -> usize {
        self.entries / self.ways
    }

    /// Checks the TLB shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the entry count or associativity is
    /// zero, or the page size is not a power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ways == 0 {
            return Err(ConfigError::ZeroAssociativity);
        }
        if self.entries == 0 || self.num_sets() == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if !self.page_bytes.is_power_of_two() {
            return Err(ConfigError::LineNotPowerOfTwo(self.page_bytes as usize));
        }
        Ok(())
    }
}

impl Default for TlbConfig {
    /// Default TLB shape: 64 entries, 4-way, 4 KiB pages.
    fn default() -> Self {
        Self {
            entries: defaults::TLB_ENTRIES,
            ways: defaults::TLB_WAYS,
            page_bytes: defaults::PAGE_BYTES,
        }
    }
}

/// Cycle costs charged per access outcome.
///
/// An access is charged the latency of the level that serviced it, plus the
/// TLB miss penalty when its translation lookup missed. The numbers are
/// configurable constants, not a model of any specific CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LatencyConfig {
    /// Cycles for an access serviced by L1.
    #[serde(default = "LatencyConfig::default_l1_hit")]
    pub l1_hit: u64,

    /// Cycles for an access serviced by L2.
    #[serde(default = "LatencyConfig::default_l2_hit")]
    pub l2_hit: u64,

    /// Cycles for an access serviced by L3.
    #[serde(default = "LatencyConfig::default_l3_hit")]
    pub l3_hit: u64,

    /// Cycles for an access serviced by main memory.
    #[serde(default = "LatencyConfig::default_memory")]
    pub memory: u64,

    /// Extra cycles charged when the TLB lookup missed.
    #[serde(default = "LatencyConfig::default_tlb_miss")]
    pub tlb_miss_penalty: u64,
}

impl LatencyConfig {
    /// Returns the default L1 hit latency.
    fn default_l1_hit() -> u64 {
        defaults::L1_HIT_CYCLES
    }

    /// Returns the default L2 hit latency.
    fn default_l2_hit() -> u64 {
        defaults::L2_HIT_CYCLES
    }

    /// Returns the default L3 hit latency.
    fn default_l3_hit() -> u64 {
        defaults::L3_HIT_CYCLES
    }

    /// Returns the default memory latency.
    fn default_memory() -> u64 {
        defaults::MEMORY_CYCLES
    }

    /// Returns the default TLB miss penalty.
    fn default_tlb_miss() -> u64 {
        defaults::TLB_MISS_PENALTY
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            l1_hit: defaults::L1_HIT_CYCLES,
            l2_hit: defaults::L2_HIT_CYCLES,
            l3_hit: defaults::L3_HIT_CYCLES,
            memory: defaults::MEMORY_CYCLES,
            tlb_miss_penalty: defaults::TLB_MISS_PENALTY,
        }
    }
}

/// Description of a single-core cache hierarchy.
///
/// # Examples
///
/// Deserializing from JSON:
///
/// ```
/// use cachetrace_core::config::{HierarchyConfig, InclusionPolicy, ReplacementPolicy};
///
/// let json = r#"{
///     "l1d": { "size_bytes": 32768, "ways": 8, "line_bytes": 64, "policy": "PLRU" },
///     "l1i": { "size_bytes": 32768, "ways": 8, "line_bytes": 64, "write_policy": "ReadOnly" },
///     "l2":  { "size_bytes": 262144, "ways": 4, "line_bytes": 64 },
///     "l3":  { "size_bytes": 8388608, "ways": 16, "line_bytes": 64 },
///     "inclusion": "NINE"
/// }"#;
///
/// let config: HierarchyConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.l1d.policy, ReplacementPolicy::Plru);
/// assert_eq!(config.inclusion, InclusionPolicy::Nine);
/// assert!(config.l3.is_some());
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HierarchyConfig {
    /// L1 data cache.
    #[serde(default)]
    pub l1d: CacheConfig,

    /// L1 instruction cache.
    #[serde(default = "HierarchyConfig::default_l1i")]
    pub l1i: CacheConfig,

    /// Unified L2 cache.
    #[serde(default = "HierarchyConfig::default_l2")]
    pub l2: CacheConfig,

    /// Unified L3 cache; absent on machines without one.
    #[serde(default = "HierarchyConfig::default_l3")]
    pub l3: Option<CacheConfig>,

    /// Cross-level inclusion policy.
    #[serde(default)]
    pub inclusion: InclusionPolicy,

    /// Cycle cost table.
    #[serde(default)]
    pub latency: LatencyConfig,

    /// Shape shared by the data and instruction TLBs.
    #[serde(default)]
    pub tlb: TlbConfig,
}

impl HierarchyConfig {
    /// Returns the default L1 instruction cache (read-only write policy).
    fn default_l1i() -> CacheConfig {
        CacheConfig {
            write_policy: WritePolicy::ReadOnly,
            ..CacheConfig::default()
        }
    }

    /// Returns the default L2 geometry.
    fn default_l2() -> CacheConfig {
        CacheConfig::new(defaults::L2_SIZE, defaults::L2_WAYS, defaults::CACHE_LINE)
    }

    /// Returns the default L3 geometry.
    fn default_l3() -> Option<CacheConfig> {
        Some(CacheConfig::new(
            defaults::L3_SIZE,
            defaults::L3_WAYS,
            defaults::CACHE_LINE,
        ))
    }

    /// Validates every configured level and the TLB shape.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, scanning inward-out:
    /// L1d, L1i, L2, L3 (when present), then the TLB.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.l1d.validate()?;
        self.l1i.validate()?;
        self.l2.validate()?;
        if let Some(l3) = &self.l3 {
            l3.validate()?;
        }
        self.tlb.validate()
    }
}

impl Default for HierarchyConfig {
    /// Generic three-level machine: 32K/8w L1s, 256K/4w L2, 8M/16w L3,
    /// inclusive, default latencies.
    fn default() -> Self {
        Self {
            l1d: CacheConfig::default(),
            l1i: Self::default_l1i(),
            l2: Self::default_l2(),
            l3: Self::default_l3(),
            inclusion: InclusionPolicy::default(),
            latency: LatencyConfig::default(),
            tlb: TlbConfig::default(),
        }
    }
}
