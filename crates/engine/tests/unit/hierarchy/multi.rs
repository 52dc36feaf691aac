//! Multi-core hierarchy tests: MESI state transitions, invalidation
//! counting, thread placement, and false-sharing detection.

use cachetrace_core::coherence::CoherenceState;
use cachetrace_core::config::CacheConfig;
use cachetrace_core::hierarchy::MultiCoreHierarchy;

fn two_cores() -> MultiCoreHierarchy {
    MultiCoreHierarchy::new(
        2,
        &CacheConfig::new(1024, 2, 64),
        &CacheConfig::new(4096, 4, 64),
        &CacheConfig::new(16 * 1024, 8, 64),
    )
    .unwrap()
}

const LINE: u64 = 0x1000;

// ══════════════════════════════════════════════════════════
// 1. MESI transitions
// ══════════════════════════════════════════════════════════

#[test]
fn lone_reader_installs_exclusive() {
    let mut h = two_cores();
    let result = h.read(LINE, 1, None);
    assert!(result.memory_access);
    assert_eq!(h.l1_coherence_state(0, LINE), CoherenceState::Exclusive);
}

#[test]
fn second_reader_installs_shared() {
    let mut h = two_cores();
    let _ = h.read(LINE, 1, None);
    let _ = h.read(LINE, 2, None);
    assert_eq!(h.l1_coherence_state(1, LINE), CoherenceState::Shared);
    assert!(h.is_line_in_l1(0, LINE));
    assert!(h.is_line_in_l1(1, LINE));
}

#[test]
fn write_hit_upgrades_to_modified() {
    let mut h = two_cores();
    let _ = h.read(LINE, 1, None);
    assert_eq!(h.l1_coherence_state(0, LINE), CoherenceState::Exclusive);

    let result = h.write(LINE, 1, None);
    assert!(result.l1_hit);
    assert_eq!(h.l1_coherence_state(0, LINE), CoherenceState::Modified);
    assert_eq!(h.stats().coherence_invalidations, 0, "no peer was touched");
}

#[test]
fn write_invalidates_peer_copies() {
    let mut h = two_cores();
    let _ = h.read(LINE, 1, None); // core 0: Exclusive
    let _ = h.write(LINE, 2, None); // core 1 takes ownership

    assert_eq!(h.l1_coherence_state(0, LINE), CoherenceState::Invalid);
    assert!(!h.is_line_in_l1(0, LINE));
    assert_eq!(h.l1_coherence_state(1, LINE), CoherenceState::Modified);
    assert_eq!(h.stats().coherence_invalidations, 1);
}

#[test]
fn reading_a_modified_peer_line_downgrades_the_owner() {
    let mut h = two_cores();
    let _ = h.write(LINE, 1, None); // core 0: Modified
    let _ = h.read(LINE, 2, None);

    assert_eq!(h.l1_coherence_state(0, LINE), CoherenceState::Shared);
    assert_eq!(h.l1_coherence_state(1, LINE), CoherenceState::Shared);
    assert_eq!(h.stats().coherence_invalidations, 1);
}

// ══════════════════════════════════════════════════════════
// 2. Thread placement
// ══════════════════════════════════════════════════════════

#[test]
fn threads_map_round_robin_and_stay_pinned() {
    let mut h = two_cores();
    assert_eq!(h.core_of(5), None, "unseen thread has no core yet");

    let _ = h.read(0x1000, 5, None);
    let _ = h.read(0x2000, 9, None);
    let _ = h.read(0x3000, 7, None);
    let _ = h.read(0x4000, 5, None);

    assert_eq!(h.core_of(5), Some(0));
    assert_eq!(h.core_of(9), Some(1));
    assert_eq!(h.core_of(7), Some(0), "third thread wraps around");
    assert_eq!(h.thread_count(), 3);
}

// ══════════════════════════════════════════════════════════
// 3. False sharing
// ══════════════════════════════════════════════════════════

/// Two threads ping-ponging writes to different bytes of one line: one
/// false-sharing event, and every write after the first invalidates the
/// peer's copy.
#[test]
fn interleaved_writes_to_one_line_are_false_sharing() {
    let mut h = two_cores();
    for _ in 0..1000 {
        let _ = h.write(0x1000, 1, None);
        let _ = h.write(0x1004, 2, None);
    }

    let stats = h.stats();
    assert_eq!(stats.false_sharing_events, 1);
    assert_eq!(stats.coherence_invalidations, 1999);

    let reports = h.false_sharing_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].line_address, 0x1000);
    assert_eq!(reports[0].accesses.len(), 2000);
    assert!(reports[0].accesses.iter().any(|a| a.byte_offset == 0));
    assert!(reports[0].accesses.iter().any(|a| a.byte_offset == 4));
}

#[test]
fn same_offset_contention_is_true_sharing_not_false() {
    let mut h = two_cores();
    for _ in 0..100 {
        let _ = h.write(0x2000, 1, None);
        let _ = h.write(0x2000, 2, None);
    }
    let stats = h.stats();
    assert_eq!(stats.false_sharing_events, 0);
    assert!(stats.coherence_invalidations > 0, "invalidations still flow");
}

#[test]
fn read_only_sharing_is_not_false_sharing() {
    let mut h = two_cores();
    for _ in 0..100 {
        let _ = h.read(0x3000, 1, None);
        let _ = h.read(0x3004, 2, None);
    }
    assert_eq!(h.stats().false_sharing_events, 0);
}

#[test]
fn single_thread_never_false_shares() {
    let mut h = two_cores();
    for offset in 0..16u64 {
        let _ = h.write(0x4000 + offset * 4, 1, None);
    }
    assert_eq!(h.stats().false_sharing_events, 0);
}

// ══════════════════════════════════════════════════════════
// 4. Out-of-range accessors
// ══════════════════════════════════════════════════════════

#[test]
fn out_of_range_core_queries_return_zero_values() {
    let mut h = two_cores();
    let _ = h.read(0x1000, 1, None);

    assert_eq!(h.tlb_stats_for_core(99).hits, 0);
    assert_eq!(h.prefetch_stats_for_core(99).issued, 0);
    assert_eq!(h.l1_coherence_state(99, 0x1000), CoherenceState::Invalid);
    assert!(!h.is_line_in_l1(99, 0x1000));
}

// ══════════════════════════════════════════════════════════
// 5. Stats plumbing
// ══════════════════════════════════════════════════════════

#[test]
fn per_core_l1_stats_are_separate() {
    let mut h = two_cores();
    let _ = h.read(0x1000, 1, None);
    let _ = h.read(0x1000, 1, None);
    let _ = h.read(0x8000, 2, None);

    let stats = h.stats();
    assert_eq!(stats.l1_per_core.len(), 2);
    assert_eq!(stats.l1_per_core[0].hits, 1);
    assert_eq!(stats.l1_per_core[0].misses, 1);
    assert_eq!(stats.l1_per_core[1].misses, 1);
    assert_eq!(stats.l1_per_core[1].hits, 0);
}

#[test]
fn dtlb_is_per_core() {
    let mut h = two_cores();
    let _ = h.read(0x1000, 1, None);
    let _ = h.read(0x1000, 2, None);
    assert_eq!(h.tlb_stats_for_core(0).misses, 1);
    assert_eq!(h.tlb_stats_for_core(1).misses, 1);
    assert_eq!(h.tlb_stats_for_core(0).hits, 0);
}

#[test]
fn reset_stats_clears_counters_and_witnesses() {
    let mut h = two_cores();
    let _ = h.write(0x1000, 1, None);
    let _ = h.write(0x1004, 2, None);
    h.reset_stats();

    let stats = h.stats();
    assert_eq!(stats.false_sharing_events, 0);
    assert_eq!(stats.coherence_invalidations, 0);
    assert_eq!(stats.l1_per_core[0].total_accesses(), 0);
    assert!(h.false_sharing_reports().is_empty());
}
