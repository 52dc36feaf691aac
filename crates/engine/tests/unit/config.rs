//! Configuration validation and address decomposition tests.

use cachetrace_core::common::error::ConfigError;
use cachetrace_core::config::{
    CacheConfig, HierarchyConfig, InclusionPolicy, ReplacementPolicy, TlbConfig,
};
use proptest::prelude::*;

// ──────────────────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────────────────

#[test]
fn default_configs_validate() {
    assert!(CacheConfig::default().validate().is_ok());
    assert!(TlbConfig::default().validate().is_ok());
    assert!(HierarchyConfig::default().validate().is_ok());
}

#[test]
fn zero_size_rejected() {
    let config = CacheConfig::new(0, 2, 64);
    assert_eq!(config.validate(), Err(ConfigError::ZeroSize));
}

#[test]
fn zero_associativity_rejected() {
    let config = CacheConfig::new(1024, 0, 64);
    assert_eq!(config.validate(), Err(ConfigError::ZeroAssociativity));
}

#[test]
fn non_power_of_two_line_rejected() {
    let config = CacheConfig::new(1024, 2, 48);
    assert_eq!(config.validate(), Err(ConfigError::LineNotPowerOfTwo(48)));
}

#[test]
fn non_power_of_two_sets_rejected() {
    // 1536 / (64 * 2) = 12 sets.
    let config = CacheConfig::new(1536, 2, 64);
    assert_eq!(config.validate(), Err(ConfigError::SetsNotPowerOfTwo(12)));
}

#[test]
fn zero_sets_rejected() {
    // 64 bytes cannot hold a 2-way set of 64-byte lines.
    let config = CacheConfig::new(64, 2, 64);
    assert_eq!(config.validate(), Err(ConfigError::SetsNotPowerOfTwo(0)));
}

#[test]
fn plru_requires_power_of_two_ways() {
    let config = CacheConfig {
        policy: ReplacementPolicy::Plru,
        ..CacheConfig::new(3 * 64 * 4, 3, 64)
    };
    assert_eq!(config.validate(), Err(ConfigError::PlruAssociativity(3)));
}

// ──────────────────────────────────────────────────────────
// Address decomposition
// ──────────────────────────────────────────────────────────

/// 1 KiB, 2-way, 64-byte lines: 8 sets, offset 6 bits, index 3 bits.
fn decode_config() -> CacheConfig {
    CacheConfig::new(1024, 2, 64)
}

#[test]
fn derived_geometry() {
    let config = decode_config();
    assert_eq!(config.num_sets(), 8);
    assert_eq!(config.num_lines(), 16);
    assert_eq!(config.offset_bits(), 6);
    assert_eq!(config.index_bits(), 3);
    assert_eq!(config.tag_bits(), 55);
}

#[test]
fn field_extraction() {
    let config = decode_config();
    let addr = 0x0001_2345_6789_abcd_u64;
    assert_eq!(config.offset_of(addr), addr & 0x3f);
    assert_eq!(config.index_of(addr), (addr >> 6) & 0x7);
    assert_eq!(config.tag_of(addr), addr >> 9);
    assert_eq!(config.line_base(addr), addr & !0x3f);
}

proptest! {
    /// Property: rebuild(tag, index) | offset reproduces the address bit
    /// for bit, for any address.
    #[test]
    fn rebuild_round_trips(addr in any::<u64>()) {
        let config = decode_config();
        let rebuilt = config.rebuild_address(config.tag_of(addr), config.index_of(addr));
        prop_assert_eq!(rebuilt | config.offset_of(addr), addr);
        prop_assert_eq!(rebuilt, config.line_base(addr));
    }
}

// ──────────────────────────────────────────────────────────
// Serde
// ──────────────────────────────────────────────────────────

#[test]
fn cache_config_deserializes_with_defaults_and_aliases() {
    let config: CacheConfig =
        serde_json::from_str(r#"{ "size_bytes": 65536, "policy": "SRRIP" }"#).unwrap();
    assert_eq!(config.size_bytes, 65536);
    assert_eq!(config.ways, 8);
    assert_eq!(config.line_bytes, 64);
    assert_eq!(config.policy, ReplacementPolicy::Srrip);

    let aliased: CacheConfig = serde_json::from_str(r#"{ "policy": "Plru" }"#).unwrap();
    assert_eq!(aliased.policy, ReplacementPolicy::Plru);
}

#[test]
fn hierarchy_without_l3_deserializes() {
    let config: HierarchyConfig =
        serde_json::from_str(r#"{ "l3": null, "inclusion": "Exclusive" }"#).unwrap();
    assert!(config.l3.is_none());
    assert_eq!(config.inclusion, InclusionPolicy::Exclusive);
    assert!(config.validate().is_ok());
}
