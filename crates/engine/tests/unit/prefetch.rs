//! Prefetcher unit tests.
//!
//! All tests drive `on_miss` directly with 64-byte lines; addresses are
//! chosen inside one 4 KiB page unless the test is about the page boundary.

use cachetrace_core::config::PrefetchPolicy;
use cachetrace_core::prefetch::Prefetcher;

const LINE: u64 = 64;
const PAGE: u64 = 0x10_000; // page-aligned base for stream tests

// ══════════════════════════════════════════════════════════
// Next-line
// ══════════════════════════════════════════════════════════

#[test]
fn next_line_emits_degree_sequential_lines() {
    let mut pf = Prefetcher::new(PrefetchPolicy::NextLine, 3, 64);
    let targets = pf.on_miss(0x1010, 0);
    assert_eq!(targets, vec![0x1040, 0x1080, 0x10c0]);
    assert_eq!(pf.stats().issued, 3);
}

#[test]
fn zero_degree_is_clamped_to_one() {
    let mut pf = Prefetcher::new(PrefetchPolicy::NextLine, 0, 64);
    assert_eq!(pf.on_miss(0, 0).len(), 1);
}

// ══════════════════════════════════════════════════════════
// Stream
// ══════════════════════════════════════════════════════════

#[test]
fn stream_needs_two_confirmations() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    assert!(pf.on_miss(PAGE, 0).is_empty(), "first touch trains only");
    let targets = pf.on_miss(PAGE + LINE, 0);
    assert_eq!(targets, vec![PAGE + 2 * LINE, PAGE + 3 * LINE]);
}

#[test]
fn stream_locks_onto_descending_sequences() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    let top = PAGE + 16 * LINE;
    let _ = pf.on_miss(top, 0);
    let targets = pf.on_miss(top - LINE, 0);
    assert_eq!(targets, vec![top - 2 * LINE, top - 3 * LINE]);
}

/// Twenty sequential line misses: the first call trains, every later call
/// issues exactly `degree` prefetches: 38 in total with degree 2.
#[test]
fn stream_sequential_misses_issue_steadily() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    for i in 0..20u64 {
        let targets = pf.on_miss(PAGE + i * LINE, 0);
        if i >= 1 {
            assert_eq!(targets.len(), 2, "miss {i} should issue 2 prefetches");
        }
    }
    assert_eq!(pf.stats().issued, 38);
    assert!(pf.stats().issued >= 34);
}

#[test]
fn stream_never_crosses_the_page() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    let last = PAGE + 4096 - LINE;
    let _ = pf.on_miss(last - LINE, 0);
    let targets = pf.on_miss(last, 0);
    assert!(
        targets.is_empty(),
        "both candidates fall beyond the page: {targets:x?}"
    );

    // One line earlier, exactly one candidate fits.
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    let _ = pf.on_miss(last - 2 * LINE, 0);
    let targets = pf.on_miss(last - LINE, 0);
    assert_eq!(targets, vec![last]);
}

#[test]
fn stream_confidence_decays_on_near_gaps() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stream, 2, 64);
    let _ = pf.on_miss(PAGE, 0);
    let _ = pf.on_miss(PAGE + LINE, 0); // confidence 2
    // A 3-line jump decays confidence below the threshold.
    assert!(pf.on_miss(PAGE + 4 * LINE, 0).is_empty());
    // A second near gap invalidates the entry entirely; the following
    // sequential pair has to retrain from scratch.
    assert!(pf.on_miss(PAGE + 5 * LINE, 0).is_empty());
    assert!(pf.on_miss(PAGE + 8 * LINE, 0).is_empty(), "fresh entry");
    assert_eq!(pf.on_miss(PAGE + 9 * LINE, 0).len(), 2);
}

// ══════════════════════════════════════════════════════════
// Stride
// ══════════════════════════════════════════════════════════

#[test]
fn stride_detects_constant_strides_per_pc() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stride, 2, 64);
    let pc = 0x4000_1234;

    assert!(pf.on_miss(0, pc).is_empty(), "entry created");
    assert!(pf.on_miss(128, pc).is_empty(), "stride measured");
    let targets = pf.on_miss(256, pc);
    assert_eq!(targets, vec![384, 512], "stride 128 confirmed");
    let targets = pf.on_miss(384, pc);
    assert_eq!(targets, vec![512, 640]);
}

#[test]
fn stride_ignores_unknown_pcs() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stride, 2, 64);
    for i in 0..8u64 {
        assert!(pf.on_miss(i * 128, 0).is_empty(), "pc 0 carries no stream");
    }
    assert_eq!(pf.stats().issued, 0);
}

#[test]
fn stride_retargets_after_confidence_is_exhausted() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Stride, 1, 64);
    let pc = 0x99;
    let _ = pf.on_miss(0, pc);
    let _ = pf.on_miss(128, pc);
    let _ = pf.on_miss(256, pc); // confidence 2 on stride 128

    // Two mismatching strides drain the confidence and retarget.
    assert!(pf.on_miss(1024, pc).is_empty());
    assert!(pf.on_miss(1088, pc).is_empty(), "confidence hit zero; stride reset to 64");
    assert_eq!(pf.on_miss(1152, pc), vec![1216], "new stride confirmed and trusted");
    assert_eq!(pf.on_miss(1216, pc), vec![1280]);
}

// ══════════════════════════════════════════════════════════
// Adaptive / Intel
// ══════════════════════════════════════════════════════════

#[test]
fn adaptive_prefers_stride_and_falls_back_to_stream() {
    let mut pf = Prefetcher::new(PrefetchPolicy::Adaptive, 2, 64);
    let pc = 0x777;

    // Strided accesses with a PC: stride wins.
    let _ = pf.on_miss(PAGE, pc);
    let _ = pf.on_miss(PAGE + 2 * LINE, pc);
    let targets = pf.on_miss(PAGE + 4 * LINE, pc);
    assert_eq!(targets, vec![PAGE + 6 * LINE, PAGE + 8 * LINE]);

    // Sequential accesses without a PC: stream fallback.
    let mut pf = Prefetcher::new(PrefetchPolicy::Adaptive, 2, 64);
    let _ = pf.on_miss(PAGE, 0);
    let targets = pf.on_miss(PAGE + LINE, 0);
    assert_eq!(targets, vec![PAGE + 2 * LINE, PAGE + 3 * LINE]);
}

#[test]
fn intel_behaves_as_adaptive() {
    let mut adaptive = Prefetcher::new(PrefetchPolicy::Adaptive, 2, 64);
    let mut intel = Prefetcher::new(PrefetchPolicy::Intel, 2, 64);
    for i in 0..10u64 {
        assert_eq!(
            adaptive.on_miss(PAGE + i * LINE, 0),
            intel.on_miss(PAGE + i * LINE, 0)
        );
    }
}

// ══════════════════════════════════════════════════════════
// Accounting
// ══════════════════════════════════════════════════════════

#[test]
fn usefulness_counters_accumulate() {
    let mut pf = Prefetcher::new(PrefetchPolicy::None, 2, 64);
    assert!(pf.on_miss(0, 0).is_empty());
    pf.record_useful_prefetch();
    pf.record_useful_prefetch();
    pf.record_useless_prefetch();
    assert_eq!(pf.stats().useful, 2);
    assert_eq!(pf.stats().useless, 1);

    pf.reset_stats();
    assert_eq!(pf.stats().useful, 0);
}
