//! Single-core cache hierarchy.
//!
//! Composes L1d/L1i/L2 and an optional L3 with data and instruction TLBs,
//! one hardware prefetcher, and a cycle model. Routing honors the
//! configured inclusion policy:
//! - **Inclusive:** outer-level evictions (demand or prefetch-install)
//!   back-invalidate every level above, so L1 ⊆ L2 ⊆ L3 holds after every
//!   access.
//! - **Exclusive:** victims move outward like a victim cache; hits in an
//!   outer level invalidate that level's copy as the line moves inward.
//! - **NINE:** no cross-level invariant; dirty victims go straight to the
//!   writeback list.
//!
//! Prefetches trigger on L1 misses and install into L1d directly (and into
//! the outer levels so inclusion holds), in the style of Intel's DCU
//! prefetcher. Consumption and eviction of prefetched lines feed the
//! useful/useless accounting.

use std::collections::HashSet;

use crate::cache::CacheLevel;
use crate::common::error::ConfigError;
use crate::config::{HierarchyConfig, InclusionPolicy, LatencyConfig, PrefetchPolicy};
use crate::prefetch::Prefetcher;
use crate::stats::{HierarchyStats, PrefetchStats, TimingStats, TlbStats};
use crate::tlb::Tlb;

/// Which level (or memory) serviced an access, for timing attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServicedBy {
    L1,
    L2,
    L3,
    Memory,
}

/// Which L1/TLB pair an access routes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    Data,
    Instruction,
}

/// Result of routing one access through the hierarchy.
#[derive(Debug, Clone, Default)]
pub struct SystemAccessResult {
    /// Serviced by L1.
    pub l1_hit: bool,
    /// Serviced by L2.
    pub l2_hit: bool,
    /// Serviced by L3.
    pub l3_hit: bool,
    /// Serviced by main memory.
    pub memory_access: bool,
    /// Data-TLB lookup hit (valid for data accesses with the TLB enabled).
    pub dtlb_hit: bool,
    /// Instruction-TLB lookup hit (valid for fetches with the TLB enabled).
    pub itlb_hit: bool,
    /// Dirty lines the hierarchy pushed out toward memory.
    pub writebacks: Vec<u64>,
    /// Prefetches triggered by this access.
    pub prefetches_issued: usize,
    /// Cycles charged to this access.
    pub cycles: u64,
}

/// Single-core cache hierarchy: L1d/L1i/L2, optional L3, TLBs, prefetcher,
/// and timing.
#[derive(Debug)]
pub struct SingleCoreHierarchy {
    inclusion: InclusionPolicy,
    l1d: CacheLevel,
    l1i: CacheLevel,
    l2: CacheLevel,
    l3: Option<CacheLevel>,
    dtlb: Tlb,
    itlb: Tlb,
    tlb_enabled: bool,
    prefetcher: Prefetcher,
    prefetch_enabled: bool,
    /// Line bases prefetched but not yet consumed, for accuracy accounting.
    prefetched: HashSet<u64>,
    latency: LatencyConfig,
    timing: TimingStats,
}

impl SingleCoreHierarchy {
    /// Builds the hierarchy described by `config`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] from any level or TLB.
    pub fn new(config: &HierarchyConfig) -> Result<Self, ConfigError> {
        let l1d = CacheLevel::new(config.l1d.clone())?;
        let prefetcher = Prefetcher::new(PrefetchPolicy::None, 2, config.l1d.line_bytes);
        Ok(Self {
            inclusion: config.inclusion,
            l1i: CacheLevel::new(config.l1i.clone())?,
            l2: CacheLevel::new(config.l2.clone())?,
            l3: config.l3.clone().map(CacheLevel::new).transpose()?,
            dtlb: Tlb::new(config.tlb.clone())?,
            itlb: Tlb::new(config.tlb.clone())?,
            tlb_enabled: true,
            prefetcher,
            prefetch_enabled: false,
            prefetched: HashSet::new(),
            latency: config.latency,
            timing: TimingStats::default(),
            l1d,
        })
    }

    /// Routes a data read through DTLB and L1d.
    pub fn read(&mut self, addr: u64, pc: u64) -> SystemAccessResult {
        self.access(addr, false, Port::Data, pc)
    }

    /// Routes a data write through DTLB and L1d.
    pub fn write(&mut self, addr: u64, pc: u64) -> SystemAccessResult {
        self.access(addr, true, Port::Data, pc)
    }

    /// Routes an instruction fetch through ITLB and L1i.
    pub fn fetch(&mut self, addr: u64, pc: u64) -> SystemAccessResult {
        self.access(addr, false, Port::Instruction, pc)
    }

    /// Turns on hardware prefetching with the given policy and degree.
    pub fn enable_prefetching(&mut self, policy: PrefetchPolicy, degree: usize) {
        self.prefetcher.set_policy(policy);
        self.prefetcher.set_degree(degree);
        self.prefetch_enabled = true;
    }

    /// Turns off hardware prefetching.
    pub fn disable_prefetching(&mut self) {
        self.prefetch_enabled = false;
        self.prefetcher.set_policy(PrefetchPolicy::None);
    }

    /// Whether prefetching is active.
    pub const fn is_prefetching_enabled(&self) -> bool {
        self.prefetch_enabled
    }

    /// Current prefetch policy.
    pub const fn prefetch_policy(&self) -> PrefetchPolicy {
        self.prefetcher.policy()
    }

    /// Hardware prefetcher effectiveness counters.
    pub const fn prefetch_stats(&self) -> &PrefetchStats {
        self.prefetcher.stats()
    }

    /// Enables TLB lookups (on by default).
    pub fn enable_tlb(&mut self) {
        self.tlb_enabled = true;
    }

    /// Disables TLB lookups and their penalties.
    pub fn disable_tlb(&mut self) {
        self.tlb_enabled = false;
    }

    /// Data-TLB counters.
    pub const fn dtlb_stats(&self) -> &TlbStats {
        self.dtlb.stats()
    }

    /// Instruction-TLB counters.
    pub const fn itlb_stats(&self) -> &TlbStats {
        self.itlb.stats()
    }

    /// The L1 data cache.
    pub const fn l1d(&self) -> &CacheLevel {
        &self.l1d
    }

    /// The L1 instruction cache.
    pub const fn l1i(&self) -> &CacheLevel {
        &self.l1i
    }

    /// The unified L2.
    pub const fn l2(&self) -> &CacheLevel {
        &self.l2
    }

    /// The unified L3, when configured.
    pub const fn l3(&self) -> Option<&CacheLevel> {
        self.l3.as_ref()
    }

    /// Configured inclusion policy.
    pub const fn inclusion(&self) -> InclusionPolicy {
        self.inclusion
    }

    /// Accumulated timing.
    pub const fn timing_stats(&self) -> &TimingStats {
        &self.timing
    }

    /// The latency table in effect.
    pub const fn latency_config(&self) -> &LatencyConfig {
        &self.latency
    }

    /// Replaces the latency table.
    pub fn set_latency_config(&mut self, latency: LatencyConfig) {
        self.latency = latency;
    }

    /// Disables (or re-enables) 3C miss classification on every level.
    pub fn set_fast_mode(&mut self, fast: bool) {
        self.l1d.set_track_classification(!fast);
        self.l1i.set_track_classification(!fast);
        self.l2.set_track_classification(!fast);
        if let Some(l3) = &mut self.l3 {
            l3.set_track_classification(!fast);
        }
    }

    /// Snapshot of every level's counters plus timing.
    pub fn stats(&self) -> HierarchyStats {
        HierarchyStats {
            l1d: *self.l1d.stats(),
            l1i: *self.l1i.stats(),
            l2: *self.l2.stats(),
            l3: self.l3.as_ref().map(|l3| *l3.stats()).unwrap_or_default(),
            timing: self.timing,
        }
    }

    /// Clears every level's counters, the TLB counters, and timing.
    pub fn reset_stats(&mut self) {
        self.l1d.reset_stats();
        self.l1i.reset_stats();
        self.l2.reset_stats();
        if let Some(l3) = &mut self.l3 {
            l3.reset_stats();
        }
        self.dtlb.reset_stats();
        self.itlb.reset_stats();
        self.timing.reset();
    }

    /// The common access path for reads, writes, and fetches.
    fn access(&mut self, addr: u64, is_write: bool, port: Port, pc: u64) -> SystemAccessResult {
        let mut result = SystemAccessResult::default();

        let tlb_missed = if self.tlb_enabled {
            let hit = match port {
                Port::Data => {
                    let hit = self.dtlb.access(addr);
                    result.dtlb_hit = hit;
                    hit
                }
                Port::Instruction => {
                    let hit = self.itlb.access(addr);
                    result.itlb_hit = hit;
                    hit
                }
            };
            !hit
        } else {
            false
        };

        let l1_info = match port {
            Port::Data => self.l1d.access(addr, is_write),
            Port::Instruction => self.l1i.access(addr, is_write),
        };
        if l1_info.is_hit() {
            result.l1_hit = true;
            self.charge(&mut result, ServicedBy::L1, tlb_missed);
            self.credit_prefetch(addr);
            return result;
        }

        // L1 miss: train and issue the prefetcher before the fill, DCU-style.
        if self.prefetch_enabled {
            let line = self.l1d.config().line_base(addr);
            let targets = self.prefetcher.on_miss(line, pc);
            result.prefetches_issued = targets.len();
            self.issue_prefetches(&targets, &mut result);
        }

        if let Some(evicted) = l1_info.evicted_address {
            if self.inclusion == InclusionPolicy::Exclusive {
                // Victim-cache move: the L1 victim drops into L2.
                let install = self.l2.install(evicted, l1_info.was_dirty);
                self.handle_outer_install_eviction(&mut result, install.evicted_address, install.was_dirty, false);
            } else if l1_info.was_dirty {
                result.writebacks.push(evicted);
            }
            self.retire_prefetch_if_gone(evicted);
        }

        let l2_info = self.l2.access(addr, is_write);
        if l2_info.is_hit() {
            result.l2_hit = true;
            self.charge(&mut result, ServicedBy::L2, tlb_missed);
            self.credit_prefetch(addr);
            if self.inclusion == InclusionPolicy::Exclusive {
                // The line moved into L1; L2 must give up its copy.
                self.l2.invalidate(addr);
            }
            return result;
        }

        if let Some(evicted) = l2_info.evicted_address {
            match self.inclusion {
                InclusionPolicy::Exclusive => {
                    if self.l3.is_some() {
                        let install = self
                            .l3
                            .as_mut()
                            .map(|l3| l3.install(evicted, l2_info.was_dirty));
                        if let Some(install) = install {
                            self.handle_outer_install_eviction(&mut result, install.evicted_address, install.was_dirty, false);
                        }
                    } else if l2_info.was_dirty {
                        result.writebacks.push(evicted);
                    }
                }
                InclusionPolicy::Inclusive => {
                    if l2_info.was_dirty {
                        result.writebacks.push(evicted);
                    }
                    self.l1d.invalidate(evicted);
                    self.l1i.invalidate(evicted);
                }
                InclusionPolicy::Nine => {
                    if l2_info.was_dirty {
                        result.writebacks.push(evicted);
                    }
                }
            }
            self.retire_prefetch_if_gone(evicted);
        }

        let l3_info = self.l3.as_mut().map(|l3| l3.access(addr, is_write));
        match l3_info {
            Some(info) if info.is_hit() => {
                result.l3_hit = true;
                self.charge(&mut result, ServicedBy::L3, tlb_missed);
                if self.inclusion == InclusionPolicy::Exclusive {
                    if let Some(l3) = &mut self.l3 {
                        l3.invalidate(addr);
                    }
                }
            }
            Some(info) => {
                result.memory_access = true;
                self.charge(&mut result, ServicedBy::Memory, tlb_missed);
                if let Some(evicted) = info.evicted_address {
                    if info.was_dirty {
                        result.writebacks.push(evicted);
                    }
                    // Inclusive L3 evictions invalidate the whole path above,
                    // for clean victims too.
                    if self.inclusion == InclusionPolicy::Inclusive {
                        self.l2.invalidate(evicted);
                        self.l1d.invalidate(evicted);
                        self.l1i.invalidate(evicted);
                    }
                    self.retire_prefetch_if_gone(evicted);
                }
            }
            None => {
                result.memory_access = true;
                self.charge(&mut result, ServicedBy::Memory, tlb_missed);
            }
        }

        result
    }

    /// Timing attribution: the access costs the latency of the level that
    /// serviced it, plus the TLB penalty when translation missed.
    fn charge(&mut self, result: &mut SystemAccessResult, by: ServicedBy, tlb_missed: bool) {
        let base = match by {
            ServicedBy::L1 => {
                self.timing.l1_hit_cycles += self.latency.l1_hit;
                self.latency.l1_hit
            }
            ServicedBy::L2 => {
                self.timing.l2_hit_cycles += self.latency.l2_hit;
                self.latency.l2_hit
            }
            ServicedBy::L3 => {
                self.timing.l3_hit_cycles += self.latency.l3_hit;
                self.latency.l3_hit
            }
            ServicedBy::Memory => {
                self.timing.memory_cycles += self.latency.memory;
                self.latency.memory
            }
        };
        let mut cycles = base;
        if tlb_missed {
            cycles += self.latency.tlb_miss_penalty;
            self.timing.tlb_miss_cycles += self.latency.tlb_miss_penalty;
        }
        self.timing.total_cycles += cycles;
        result.cycles = cycles;
    }

    /// Installs prefetch targets into L1d (and outward as inclusion
    /// requires), tracking each line for accuracy accounting.
    fn issue_prefetches(&mut self, targets: &[u64], result: &mut SystemAccessResult) {
        for &target in targets {
            let line = self.l1d.config().line_base(target);
            if self.l1d.is_present(line) {
                continue;
            }

            let install = self.l1d.install(line, false);
            if let Some(evicted) = install.evicted_address {
                if install.was_dirty {
                    result.writebacks.push(evicted);
                }
                self.retire_prefetch_if_gone(evicted);
            }

            if !self.l2.is_present(line) {
                let install = self.l2.install(line, false);
                self.handle_outer_install_eviction(result, install.evicted_address, install.was_dirty, true);
            }
            let l3_install = self.l3.as_mut().and_then(|l3| {
                (!l3.is_present(line)).then(|| l3.install(line, false))
            });
            if let Some(install) = l3_install {
                if let Some(evicted) = install.evicted_address {
                    if install.was_dirty {
                        result.writebacks.push(evicted);
                    }
                    if self.inclusion == InclusionPolicy::Inclusive {
                        self.l2.invalidate(evicted);
                        self.l1d.invalidate(evicted);
                        self.l1i.invalidate(evicted);
                    }
                    self.retire_prefetch_if_gone(evicted);
                }
            }

            let _ = self.prefetched.insert(line);
        }
    }

    /// Routes the eviction produced by an install into L2 (or L3 without a
    /// back-invalidation requirement): writeback the dirty victim and, when
    /// `invalidate_above` is set under Inclusive, purge the L1s.
    fn handle_outer_install_eviction(
        &mut self,
        result: &mut SystemAccessResult,
        evicted: Option<u64>,
        was_dirty: bool,
        invalidate_above: bool,
    ) {
        if let Some(evicted) = evicted {
            if was_dirty {
                result.writebacks.push(evicted);
            }
            if invalidate_above && self.inclusion == InclusionPolicy::Inclusive {
                self.l1d.invalidate(evicted);
                self.l1i.invalidate(evicted);
            }
            self.retire_prefetch_if_gone(evicted);
        }
    }

    /// Credits the prefetcher when a demand access consumes a tracked line.
    fn credit_prefetch(&mut self, addr: u64) {
        if !self.prefetch_enabled {
            return;
        }
        let line = self.l1d.config().line_base(addr);
        if self.prefetched.remove(&line) {
            self.prefetcher.record_useful_prefetch();
        }
    }

    /// Retires a tracked prefetched line as useless once it is gone from
    /// every level.
    fn retire_prefetch_if_gone(&mut self, line: u64) {
        if !self.prefetched.contains(&line) {
            return;
        }
        let still_present = self.l1d.is_present(line)
            || self.l2.is_present(line)
            || self.l3.as_ref().is_some_and(|l3| l3.is_present(line));
        if !still_present {
            let _ = self.prefetched.remove(&line);
            self.prefetcher.record_useless_prefetch();
        }
    }
}
