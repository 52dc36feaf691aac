//! Optimization suggester tests.

use std::collections::BTreeSet;

use cachetrace_core::report::{OptimizationSuggester, Severity, SuggestionKind};
use cachetrace_core::stats::{
    CacheStats, FalseSharingAccess, FalseSharingReport, MultiCoreStats, SourceStats,
};

fn quiet_multicore_stats() -> MultiCoreStats {
    MultiCoreStats {
        l1_per_core: vec![CacheStats {
            hits: 900,
            misses: 100,
            ..CacheStats::default()
        }],
        ..MultiCoreStats::default()
    }
}

fn contended_line_report() -> FalseSharingReport {
    FalseSharingReport {
        line_address: 0x1000,
        accesses: vec![
            FalseSharingAccess {
                thread_id: 1,
                byte_offset: 0,
                is_write: true,
                file: "worker.c".to_owned(),
                line: 12,
            },
            FalseSharingAccess {
                thread_id: 2,
                byte_offset: 4,
                is_write: true,
                file: "worker.c".to_owned(),
                line: 13,
            },
        ],
    }
}

#[test]
fn false_sharing_suggests_padding() {
    let suggestions = OptimizationSuggester::analyze_multi_core(
        &[contended_line_report()],
        &[],
        &quiet_multicore_stats(),
        64,
    );

    let padding = suggestions
        .iter()
        .find(|s| s.kind == SuggestionKind::FalseSharing)
        .expect("false sharing must be flagged");
    assert_eq!(padding.severity, Severity::High);
    assert_eq!(padding.location, "worker.c:12");
    // Offsets 0..4 plus a 4-byte word leave 56 bytes to pad.
    assert!(padding.fix.contains("56 bytes"));
}

#[test]
fn single_thread_report_is_not_flagged() {
    let mut report = contended_line_report();
    report.accesses[1].thread_id = 1;
    let suggestions = OptimizationSuggester::analyze_multi_core(
        &[report],
        &[],
        &quiet_multicore_stats(),
        64,
    );
    assert!(
        suggestions
            .iter()
            .all(|s| s.kind != SuggestionKind::FalseSharing)
    );
}

#[test]
fn hot_miss_lines_are_flagged_by_rate() {
    let hot = vec![
        SourceStats {
            file: "slow.c".to_owned(),
            line: 40,
            hits: 10,
            misses: 990,
            threads: BTreeSet::new(),
        },
        SourceStats {
            file: "fine.c".to_owned(),
            line: 8,
            hits: 990,
            misses: 10,
            threads: BTreeSet::new(),
        },
    ];
    let suggestions = OptimizationSuggester::analyze_single_core(
        &hot,
        &CacheStats {
            hits: 1000,
            misses: 1000,
            ..CacheStats::default()
        },
    );

    let miss_flags: Vec<_> = suggestions
        .iter()
        .filter(|s| s.kind == SuggestionKind::HighMissRate)
        .collect();
    assert_eq!(miss_flags.len(), 1);
    assert_eq!(miss_flags[0].location, "slow.c:40");
    assert_eq!(miss_flags[0].severity, Severity::High);

    assert!(
        suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::PoorLocality),
        "50% overall hit rate is poor locality"
    );
}

#[test]
fn multithreaded_hot_line_flags_contention() {
    let hot = vec![SourceStats {
        file: "shared.c".to_owned(),
        line: 5,
        hits: 500,
        misses: 60,
        threads: BTreeSet::from([1, 2, 3]),
    }];
    let suggestions = OptimizationSuggester::analyze_multi_core(
        &[],
        &hot,
        &quiet_multicore_stats(),
        64,
    );
    assert!(
        suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::Contention)
    );
}

#[test]
fn heavy_invalidation_traffic_is_flagged() {
    let stats = MultiCoreStats {
        coherence_invalidations: 5000,
        ..quiet_multicore_stats()
    };
    let suggestions = OptimizationSuggester::analyze_multi_core(&[], &[], &stats, 64);
    assert!(
        suggestions
            .iter()
            .any(|s| s.kind == SuggestionKind::CoherenceTraffic)
    );
}

#[test]
fn quiet_run_produces_no_advice() {
    let suggestions =
        OptimizationSuggester::analyze_multi_core(&[], &[], &quiet_multicore_stats(), 64);
    assert!(suggestions.is_empty());

    let single = OptimizationSuggester::analyze_single_core(
        &[],
        &CacheStats {
            hits: 99,
            misses: 1,
            ..CacheStats::default()
        },
    );
    assert!(single.is_empty());
}
