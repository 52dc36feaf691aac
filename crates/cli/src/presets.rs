//! Hardware hierarchy presets.
//!
//! Ready-made [`HierarchyConfig`]s approximating the cache geometry of a few
//! well-known machines, plus a tiny educational hierarchy whose behavior is
//! easy to reason about by hand. Latencies are the library defaults in every
//! preset; only geometry, policies, and inclusion differ.

use cachetrace_core::config::{
    CacheConfig, HierarchyConfig, InclusionPolicy, ReplacementPolicy, WritePolicy,
};

/// Preset names accepted by `--config`.
pub const PRESET_NAMES: &[&str] = &["intel", "amd", "apple", "educational", "default"];

/// Looks a preset up by name; `None` for unknown names.
pub fn by_name(name: &str) -> Option<HierarchyConfig> {
    match name {
        "intel" => Some(intel_12th_gen()),
        "amd" => Some(amd_zen4()),
        "apple" => Some(apple_m_series()),
        "educational" => Some(educational()),
        "default" | "custom" => Some(HierarchyConfig::default()),
        _ => None,
    }
}

fn level(kb: usize, ways: usize, policy: ReplacementPolicy, write_policy: WritePolicy) -> CacheConfig {
    CacheConfig {
        size_bytes: kb * 1024,
        ways,
        line_bytes: 64,
        policy,
        write_policy,
    }
}

/// Intel 12th-gen desktop: PLRU everywhere, non-inclusive L3.
fn intel_12th_gen() -> HierarchyConfig {
    HierarchyConfig {
        l1d: level(32, 8, ReplacementPolicy::Plru, WritePolicy::WriteBack),
        l1i: level(32, 8, ReplacementPolicy::Plru, WritePolicy::ReadOnly),
        l2: level(1024, 8, ReplacementPolicy::Plru, WritePolicy::WriteBack),
        l3: Some(level(32 * 1024, 16, ReplacementPolicy::Plru, WritePolicy::WriteBack)),
        inclusion: InclusionPolicy::Nine,
        ..HierarchyConfig::default()
    }
}

/// AMD Zen 4: LRU inner levels, exclusive L3 victim cache.
fn amd_zen4() -> HierarchyConfig {
    HierarchyConfig {
        l1d: level(32, 8, ReplacementPolicy::Lru, WritePolicy::WriteBack),
        l1i: level(32, 8, ReplacementPolicy::Lru, WritePolicy::ReadOnly),
        l2: level(1024, 8, ReplacementPolicy::Lru, WritePolicy::WriteBack),
        l3: Some(level(32 * 1024, 16, ReplacementPolicy::Plru, WritePolicy::WriteBack)),
        inclusion: InclusionPolicy::Exclusive,
        ..HierarchyConfig::default()
    }
}

/// Apple M-series performance core: large L1s, big shared L2.
fn apple_m_series() -> HierarchyConfig {
    HierarchyConfig {
        l1d: level(64, 8, ReplacementPolicy::Plru, WritePolicy::WriteBack),
        l1i: level(128, 8, ReplacementPolicy::Plru, WritePolicy::ReadOnly),
        l2: level(4096, 16, ReplacementPolicy::Plru, WritePolicy::WriteBack),
        l3: Some(level(32 * 1024, 16, ReplacementPolicy::Plru, WritePolicy::WriteBack)),
        inclusion: InclusionPolicy::Nine,
        ..HierarchyConfig::default()
    }
}

/// Tiny inclusive hierarchy for teaching: 1 KiB 2-way L1s.
fn educational() -> HierarchyConfig {
    HierarchyConfig {
        l1d: level(1, 2, ReplacementPolicy::Lru, WritePolicy::WriteBack),
        l1i: level(1, 2, ReplacementPolicy::Lru, WritePolicy::ReadOnly),
        l2: level(4, 4, ReplacementPolicy::Lru, WritePolicy::WriteBack),
        l3: Some(level(16, 8, ReplacementPolicy::Lru, WritePolicy::WriteBack)),
        inclusion: InclusionPolicy::Inclusive,
        ..HierarchyConfig::default()
    }
}
