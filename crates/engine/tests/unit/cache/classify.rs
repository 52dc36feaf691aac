//! 3C miss classification tests.
//!
//! Observed through `CacheStats` on deliberately tiny direct-mapped caches
//! where the compulsory/conflict/capacity split is computable by hand.

use cachetrace_core::cache::CacheLevel;
use cachetrace_core::config::CacheConfig;

#[test]
fn first_touches_are_compulsory() {
    // 2 lines, direct-mapped.
    let mut cache = CacheLevel::new(CacheConfig::new(128, 1, 64)).unwrap();
    let _ = cache.access(0, false);
    let _ = cache.access(64, false);
    assert_eq!(cache.stats().compulsory_misses, 2);
    assert_eq!(cache.stats().conflict_misses, 0);
    assert_eq!(cache.stats().capacity_misses, 0);
}

#[test]
fn mapping_collisions_are_conflicts() {
    // 2 sets direct-mapped: lines 0 and 128 collide in set 0 while a
    // fully-associative cache of 2 lines would hold both.
    let mut cache = CacheLevel::new(CacheConfig::new(128, 1, 64)).unwrap();
    let _ = cache.access(0, false);
    let _ = cache.access(128, false); // evicts 0 (same set)
    let _ = cache.access(0, false); // fully-assoc shadow still holds 0

    assert_eq!(cache.stats().compulsory_misses, 2);
    assert_eq!(cache.stats().conflict_misses, 1);
    assert_eq!(cache.stats().capacity_misses, 0);
}

#[test]
fn working_set_overflow_is_capacity() {
    // Single line of capacity: revisiting an old line is a capacity miss
    // because even a fully-associative cache of one line lost it.
    let mut cache = CacheLevel::new(CacheConfig::new(64, 1, 64)).unwrap();
    let _ = cache.access(0, false);
    let _ = cache.access(64, false);
    let _ = cache.access(0, false);

    assert_eq!(cache.stats().compulsory_misses, 2);
    assert_eq!(cache.stats().capacity_misses, 1);
    assert_eq!(cache.stats().conflict_misses, 0);
}

#[test]
fn classification_can_be_disabled() {
    let mut cache = CacheLevel::new(CacheConfig::new(128, 1, 64)).unwrap();
    cache.set_track_classification(false);
    let _ = cache.access(0, false);
    let _ = cache.access(128, false);
    let _ = cache.access(0, false);

    assert_eq!(cache.stats().misses, 3);
    assert_eq!(cache.stats().compulsory_misses, 0);
    assert_eq!(cache.stats().conflict_misses, 0);
    assert_eq!(cache.stats().capacity_misses, 0);
}
