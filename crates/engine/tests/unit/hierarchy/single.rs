//! Single-core hierarchy tests: routing, timing, inclusion policies, and
//! prefetch accounting.

use cachetrace_core::config::{InclusionPolicy, PrefetchPolicy};
use cachetrace_core::hierarchy::SingleCoreHierarchy;

use super::{assert_inclusive, small_config};

fn hierarchy(inclusion: InclusionPolicy) -> SingleCoreHierarchy {
    SingleCoreHierarchy::new(&small_config(inclusion)).unwrap()
}

// ══════════════════════════════════════════════════════════
// 1. Routing and demand counters
// ══════════════════════════════════════════════════════════

#[test]
fn full_miss_fills_every_level() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    let result = h.read(0x1000, 0);
    assert!(result.memory_access);
    assert!(!result.l1_hit && !result.l2_hit && !result.l3_hit);

    assert!(h.l1d().is_present(0x1000));
    assert!(h.l2().is_present(0x1000));
    assert!(h.l3().unwrap().is_present(0x1000));

    let result = h.read(0x1000, 0);
    assert!(result.l1_hit);
}

#[test]
fn fetches_route_through_l1i() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    let _ = h.fetch(0x40_0000, 0);
    assert!(h.l1i().is_present(0x40_0000));
    assert!(!h.l1d().is_present(0x40_0000));
    assert_eq!(h.l1i().stats().misses, 1);
    assert_eq!(h.l1d().stats().total_accesses(), 0);
}

#[test]
fn outer_levels_only_see_l1_misses() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    for _ in 0..50 {
        let _ = h.read(0x2000, 0);
        let _ = h.fetch(0x8000, 0);
    }
    let stats = h.stats();
    assert!(stats.l2.total_accesses() <= stats.l1d.misses + stats.l1i.misses);
    assert!(stats.l3.total_accesses() <= stats.l2.misses);
}

#[test]
fn dirty_l1_victim_lands_on_the_writeback_list() {
    let mut h = hierarchy(InclusionPolicy::Nine);
    // Three L1-set-0 conflicting lines (8 sets, so 512-byte stride).
    let _ = h.write(0x0, 0);
    let _ = h.read(0x200, 0);
    let result = h.read(0x400, 0);
    assert_eq!(result.writebacks, vec![0x0]);
}

// ══════════════════════════════════════════════════════════
// 2. Timing
// ══════════════════════════════════════════════════════════

#[test]
fn timing_charges_the_servicing_level_plus_tlb_penalty() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    let latency = *h.latency_config();

    // Cold access: memory latency plus a TLB miss penalty.
    let result = h.read(0x1000, 0);
    assert_eq!(result.cycles, latency.memory + latency.tlb_miss_penalty);

    // Warm access: pure L1 hit, TLB resident.
    let result = h.read(0x1000, 0);
    assert_eq!(result.cycles, latency.l1_hit);

    let timing = h.timing_stats();
    assert_eq!(timing.memory_cycles, latency.memory);
    assert_eq!(timing.l1_hit_cycles, latency.l1_hit);
    assert_eq!(timing.tlb_miss_cycles, latency.tlb_miss_penalty);
    assert_eq!(
        timing.total_cycles,
        latency.memory + latency.tlb_miss_penalty + latency.l1_hit
    );
}

#[test]
fn disabled_tlb_charges_no_penalty() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    h.disable_tlb();
    let latency = *h.latency_config();
    let result = h.read(0x1000, 0);
    assert_eq!(result.cycles, latency.memory);
    assert_eq!(h.dtlb_stats().misses, 0);
}

// ══════════════════════════════════════════════════════════
// 3. Inclusion policies
// ══════════════════════════════════════════════════════════

#[test]
fn inclusive_back_invalidates_on_outer_evictions() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    // 16 KiB L3 holds 256 lines; a 512-line sweep forces L3 evictions whose
    // victims must vanish from every level above.
    for i in 0..512u64 {
        let _ = h.read(i * 64, 0);
    }
    assert_inclusive(&h);

    // Mixed reads/writes/fetches over a smaller footprint, same invariant.
    let mut state = 1u64;
    for _ in 0..2000 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let addr = (state >> 33) % (64 * 1024);
        match state % 3 {
            0 => {
                let _ = h.read(addr, 0);
            }
            1 => {
                let _ = h.write(addr, 0);
            }
            _ => {
                let _ = h.fetch(addr, 0);
            }
        }
        assert_inclusive(&h);
    }
}

#[test]
fn exclusive_moves_lines_between_levels() {
    let mut h = hierarchy(InclusionPolicy::Exclusive);
    let (a, b, c) = (0x0u64, 0x200u64, 0x400u64);

    // a, b, c conflict in L1 set 0; a's eviction drops it into L2.
    let _ = h.read(a, 0);
    let _ = h.read(b, 0);
    let _ = h.read(c, 0);
    assert!(!h.l1d().is_present(a));
    assert!(h.l2().is_present(a));

    // Re-reading a hits L2, which surrenders its copy as the line moves
    // back into L1.
    let result = h.read(a, 0);
    assert!(result.l2_hit);
    assert!(h.l1d().is_present(a));
    assert!(!h.l2().is_present(a));
}

#[test]
fn exclusive_l3_hit_invalidates_l3_copy() {
    let mut h = hierarchy(InclusionPolicy::Exclusive);
    let _ = h.read(0x1000, 0);
    // Force the line out of L1 and then out of L2 so it settles in L3.
    // L1 set stride is 0x200, L2 set stride is 0x400.
    for k in 1..=2u64 {
        let _ = h.read(0x1000 + k * 0x200, 0);
    }
    for k in 1..=4u64 {
        let _ = h.read(0x1000 + k * 0x400, 0);
    }
    if h.l3().unwrap().is_present(0x1000) {
        let result = h.read(0x1000, 0);
        assert!(result.l3_hit);
        assert!(!h.l3().unwrap().is_present(0x1000));
        assert!(h.l1d().is_present(0x1000));
    }
}

// ══════════════════════════════════════════════════════════
// 4. Prefetching
// ══════════════════════════════════════════════════════════

/// Twenty sequential line reads under a degree-2 stream prefetcher. The
/// stream detector only trains on misses, so hits punch holes in its
/// last-address chain; the resulting rhythm is exactly computable:
/// misses at lines {0,1,4,5,6,7,10,11,...} hits wherever the previous
/// miss issued prefetches.
#[test]
fn stream_prefetching_turns_misses_into_hits() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    h.enable_prefetching(PrefetchPolicy::Stream, 2);

    let base = 0x40_0000u64; // page-aligned
    for i in 0..20u64 {
        let _ = h.read(base + i * 64, 0);
    }

    let stats = h.stats();
    assert_eq!(stats.l1d.hits, 6, "prefetched lines 2,3,8,9,14,15 hit");
    assert_eq!(stats.l1d.misses, 14);

    let pf = h.prefetch_stats();
    assert_eq!(pf.issued, 8);
    assert_eq!(pf.useful, 6);
    assert_eq!(pf.useless, 0, "the trailing pair is still resident");
    assert!(pf.useful + pf.useless <= pf.issued);

    assert_inclusive(&h);
}

#[test]
fn prefetch_installs_do_not_count_demand_traffic() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    h.enable_prefetching(PrefetchPolicy::NextLine, 2);

    let result = h.read(0x1000, 0);
    assert_eq!(result.prefetches_issued, 2);
    assert!(h.l1d().is_present(0x1040));
    assert!(h.l1d().is_present(0x1080));

    let stats = h.stats();
    assert_eq!(stats.l1d.total_accesses(), 1, "installs are stat-neutral");
    assert_eq!(stats.l2.total_accesses(), 1);
}

#[test]
fn disabling_prefetch_stops_issue() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    h.enable_prefetching(PrefetchPolicy::NextLine, 2);
    let _ = h.read(0x1000, 0);
    h.disable_prefetching();
    let result = h.read(0x8000, 0);
    assert_eq!(result.prefetches_issued, 0);
}

// ══════════════════════════════════════════════════════════
// 5. Reset
// ══════════════════════════════════════════════════════════

#[test]
fn reset_clears_counters_but_keeps_contents() {
    let mut h = hierarchy(InclusionPolicy::Inclusive);
    let _ = h.read(0x1000, 0);
    h.reset_stats();

    let stats = h.stats();
    assert_eq!(stats.l1d.total_accesses(), 0);
    assert_eq!(stats.timing.total_cycles, 0);
    assert_eq!(h.dtlb_stats().misses, 0);

    let result = h.read(0x1000, 0);
    assert!(result.l1_hit, "contents survive the reset");
}
