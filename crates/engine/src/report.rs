//! Optimization suggestions derived from simulation results.
//!
//! Turns false-sharing reports, hot-line rankings, and aggregate counters
//! into actionable advice: padding calculations for contended lines,
//! locality warnings for miss-heavy source lines, and coherence-traffic
//! alerts. Thresholds are heuristics, not guarantees.

use std::collections::HashMap;

use serde::Serialize;

use crate::stats::{CacheStats, FalseSharingReport, MultiCoreStats, SourceStats};

/// Category of an optimization suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Threads write distinct bytes of one line.
    FalseSharing,
    /// A source line misses far more than it hits.
    HighMissRate,
    /// Several threads hammer one location.
    Contention,
    /// Overall hit rate is poor.
    PoorLocality,
    /// Invalidation traffic dominates.
    CoherenceTraffic,
}

/// How urgent a suggestion is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth a look.
    Low,
    /// Likely measurable.
    Medium,
    /// Almost certainly costing real time.
    High,
}

/// One piece of advice tied to a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptimizationSuggestion {
    /// What class of problem was detected.
    pub kind: SuggestionKind,
    /// Urgency.
    pub severity: Severity,
    /// `file:line`, a hex line address, or `overall`.
    pub location: String,
    /// What was observed.
    pub message: String,
    /// What to do about it.
    pub fix: String,
}

/// Analysis entry points over simulation results.
#[derive(Debug, Clone, Copy)]
pub struct OptimizationSuggester;

impl OptimizationSuggester {
    /// Analyzes multi-core results: false sharing, hot lines, overall
    /// locality, and coherence traffic.
    pub fn analyze_multi_core(
        false_sharing: &[FalseSharingReport],
        hot_lines: &[SourceStats],
        stats: &MultiCoreStats,
        line_bytes: u32,
    ) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        for report in false_sharing {
            if report.accesses.len() < 2 {
                continue;
            }

            // Offset range per thread, to size the padding fix.
            let mut thread_offsets: HashMap<u32, (u32, u32)> = HashMap::new();
            for access in &report.accesses {
                let range = thread_offsets
                    .entry(access.thread_id)
                    .or_insert((access.byte_offset, access.byte_offset));
                range.0 = range.0.min(access.byte_offset);
                range.1 = range.1.max(access.byte_offset);
            }
            if thread_offsets.len() < 2 {
                continue;
            }

            let min_offset = thread_offsets.values().map(|r| r.0).min().unwrap_or(0);
            let max_offset = thread_offsets.values().map(|r| r.1).max().unwrap_or(0);
            let padding = line_bytes.saturating_sub(max_offset - min_offset + 4);

            let location = report
                .accesses
                .iter()
                .find(|a| !a.file.is_empty())
                .map_or_else(
                    || format!("{:#x}", report.line_address),
                    |a| format!("{}:{}", a.file, a.line),
                );

            suggestions.push(OptimizationSuggestion {
                kind: SuggestionKind::FalseSharing,
                severity: Severity::High,
                location,
                message: "Multiple threads writing to the same cache line cause invalidations"
                    .to_owned(),
                fix: format!(
                    "Add {padding} bytes of padding between fields accessed by different threads"
                ),
            });
        }

        for line in hot_lines {
            if line.miss_rate() > 0.5 && line.misses > 100 {
                suggestions.push(OptimizationSuggestion {
                    kind: SuggestionKind::HighMissRate,
                    severity: if line.miss_rate() > 0.8 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    location: format!("{}:{}", line.file, line.line),
                    message: format!(
                        "High cache miss rate ({}%) indicates poor cache utilization",
                        (line.miss_rate() * 100.0) as u32
                    ),
                    fix: "Consider restructuring the data access pattern or improving spatial locality"
                        .to_owned(),
                });
            }

            if line.threads.len() > 1 && line.misses > 50 {
                suggestions.push(OptimizationSuggestion {
                    kind: SuggestionKind::Contention,
                    severity: Severity::Medium,
                    location: format!("{}:{}", line.file, line.line),
                    message: format!(
                        "Multiple threads ({}) accessing this location",
                        line.threads.len()
                    ),
                    fix: "Consider thread-local copies or reducing shared data access".to_owned(),
                });
            }
        }

        let l1_miss_rate = 1.0
            - stats
                .l1_per_core
                .first()
                .map_or(0.0, CacheStats::hit_rate);
        if l1_miss_rate > 0.3 {
            suggestions.push(OptimizationSuggestion {
                kind: SuggestionKind::PoorLocality,
                severity: Severity::Medium,
                location: "overall".to_owned(),
                message: format!("L1 cache miss rate is high ({}%)", (l1_miss_rate * 100.0) as u32),
                fix: "Review data structures for cache-friendly layout (arrays vs linked lists, \
                      struct of arrays vs array of structs)"
                    .to_owned(),
            });
        }

        if stats.coherence_invalidations > 1000 {
            suggestions.push(OptimizationSuggestion {
                kind: SuggestionKind::CoherenceTraffic,
                severity: Severity::High,
                location: "overall".to_owned(),
                message: format!(
                    "High coherence traffic ({} invalidations)",
                    stats.coherence_invalidations
                ),
                fix: "Reduce sharing between threads or use read-only data where possible"
                    .to_owned(),
            });
        }

        suggestions
    }

    /// Analyzes single-core results: hot lines and overall locality.
    pub fn analyze_single_core(
        hot_lines: &[SourceStats],
        l1_stats: &CacheStats,
    ) -> Vec<OptimizationSuggestion> {
        let mut suggestions = Vec::new();

        for line in hot_lines {
            if line.miss_rate() > 0.5 && line.misses > 100 {
                suggestions.push(OptimizationSuggestion {
                    kind: SuggestionKind::HighMissRate,
                    severity: if line.miss_rate() > 0.8 {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    location: format!("{}:{}", line.file, line.line),
                    message: format!(
                        "High cache miss rate ({}%) at this location",
                        (line.miss_rate() * 100.0) as u32
                    ),
                    fix: "Consider improving data locality or prefetching".to_owned(),
                });
            }
        }

        if l1_stats.hit_rate() < 0.7 && l1_stats.total_accesses() > 0 {
            suggestions.push(OptimizationSuggestion {
                kind: SuggestionKind::PoorLocality,
                severity: Severity::Medium,
                location: "overall".to_owned(),
                message: format!(
                    "L1 cache hit rate is low ({}%)",
                    (l1_stats.hit_rate() * 100.0) as u32
                ),
                fix: "Review loop structure and data access patterns".to_owned(),
            });
        }

        suggestions
    }
}
