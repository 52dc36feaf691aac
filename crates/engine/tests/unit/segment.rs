//! Segment cache tests.

use cachetrace_core::segment::{CachedSegmentResult, SegmentCache};
use cachetrace_core::trace::TraceEvent;

/// A short synthetic loop body: alternating load/store over two lines.
fn window(base: u64) -> Vec<TraceEvent> {
    (0..8u64)
        .map(|i| {
            if i % 2 == 0 {
                TraceEvent::load(base + i * 64, 4)
            } else {
                TraceEvent::store(base + i * 64, 4)
            }
        })
        .collect()
}

fn sample_result() -> CachedSegmentResult {
    CachedSegmentResult {
        l1d_hits: 6,
        l1d_misses: 2,
        total_cycles: 420,
        segment_length: 4,
        ..CachedSegmentResult::default()
    }
}

#[test]
fn hash_is_deterministic_and_address_sensitive() {
    let a = window(0x1000);
    let b = window(0x1000);
    let c = window(0x2000);
    assert_eq!(
        SegmentCache::hash_pattern(&a, 0, 4),
        SegmentCache::hash_pattern(&b, 0, 4)
    );
    assert_ne!(
        SegmentCache::hash_pattern(&a, 0, 4),
        SegmentCache::hash_pattern(&c, 0, 4)
    );
}

#[test]
fn hash_ignores_source_locations() {
    let plain = window(0x1000);
    let annotated: Vec<TraceEvent> = window(0x1000)
        .into_iter()
        .map(|e| e.at("loop.c", 7))
        .collect();
    assert_eq!(
        SegmentCache::hash_pattern(&plain, 0, 8),
        SegmentCache::hash_pattern(&annotated, 0, 8)
    );
}

#[test]
fn hash_distinguishes_threads_and_types() {
    let loads = window(0x1000);
    let threaded: Vec<TraceEvent> = window(0x1000)
        .into_iter()
        .map(|e| e.on_thread(2))
        .collect();
    assert_ne!(
        SegmentCache::hash_pattern(&loads, 0, 8),
        SegmentCache::hash_pattern(&threaded, 0, 8)
    );
}

#[test]
fn store_then_lookup_replays_the_result() {
    let mut cache = SegmentCache::new(4, 16);
    let events = window(0x1000);

    assert!(cache.lookup(&events, 0, 99).is_none());
    cache.store(&events, 0, 99, sample_result());

    let replayed = cache.lookup(&events, 0, 99).unwrap();
    assert_eq!(replayed.l1d_hits, 6);
    assert_eq!(replayed.total_cycles, 420);
    assert_eq!(replayed.times_used, 1);

    assert_eq!(cache.lookup(&events, 0, 99).unwrap().times_used, 2);
    assert_eq!(cache.hits(), 2);
    assert_eq!(cache.misses(), 1);
}

#[test]
fn differing_state_hashes_are_independent() {
    let mut cache = SegmentCache::new(4, 16);
    let events = window(0x1000);
    cache.store(&events, 0, 1, sample_result());
    assert!(cache.lookup(&events, 0, 2).is_none());
    assert!(cache.lookup(&events, 0, 1).is_some());
}

#[test]
fn truncated_tail_is_never_cached() {
    let mut cache = SegmentCache::new(4, 16);
    let events = window(0x1000);
    assert!(cache.lookup(&events, 6, 0).is_none(), "only 2 events remain");
    cache.store(&events, 6, 0, sample_result());
    assert!(cache.is_empty());
}

#[test]
fn lru_eviction_at_capacity() {
    let mut cache = SegmentCache::new(4, 2);
    let first = window(0x1000);
    let second = window(0x2000);
    let third = window(0x3000);

    cache.store(&first, 0, 0, sample_result());
    cache.store(&second, 0, 0, sample_result());
    // Refresh the first entry so the second is the LRU victim.
    assert!(cache.lookup(&first, 0, 0).is_some());
    cache.store(&third, 0, 0, sample_result());

    assert_eq!(cache.len(), 2);
    assert!(cache.lookup(&first, 0, 0).is_some());
    assert!(cache.lookup(&second, 0, 0).is_none(), "LRU entry evicted");
    assert!(cache.lookup(&third, 0, 0).is_some());
}

#[test]
fn clear_drops_entries_and_counters() {
    let mut cache = SegmentCache::new(4, 16);
    let events = window(0x1000);
    cache.store(&events, 0, 0, sample_result());
    let _ = cache.lookup(&events, 0, 0);
    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.hits(), 0);
    assert!((cache.hit_rate()).abs() < f64::EPSILON);
}
