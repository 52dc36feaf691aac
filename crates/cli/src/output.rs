//! Report formatting.
//!
//! Two renderings of a finished simulation: human-readable text tables and a
//! JSON document (serde-derived, suitable for dashboards). Both cover the
//! per-level counters, coherence and false-sharing findings, hot source
//! lines, and optimization suggestions.

use cachetrace_core::TraceProcessor;
use cachetrace_core::report::{OptimizationSuggester, OptimizationSuggestion};
use cachetrace_core::stats::CacheStats;
use serde_json::{Value, json};

/// Run metadata threaded into both report formats.
pub struct RunInfo<'a> {
    /// Preset name the run used.
    pub config_name: &'a str,
    /// Cores simulated (1 for single-core).
    pub cores: usize,
    /// Distinct thread ids seen in the trace.
    pub threads: usize,
    /// Events successfully parsed and processed.
    pub events: usize,
    /// Whether hardware prefetching was enabled.
    pub prefetching: bool,
}

/// Collects the suggestions for this run.
fn suggestions(processor: &TraceProcessor) -> Vec<OptimizationSuggestion> {
    let hot = processor.get_hot_lines(10);
    match processor.get_multicore_stats() {
        Some(stats) => {
            let line_bytes = processor
                .as_multi_core()
                .map_or(64, |h| h.line_bytes() as u32);
            OptimizationSuggester::analyze_multi_core(
                &processor.get_false_sharing_reports(),
                &hot,
                &stats,
                line_bytes,
            )
        }
        None => OptimizationSuggester::analyze_single_core(&hot, &processor.get_stats().l1d),
    }
}

fn level_json(stats: &CacheStats) -> Value {
    json!({
        "hits": stats.hits,
        "misses": stats.misses,
        "hitRate": stats.hit_rate(),
        "writebacks": stats.writebacks,
        "invalidations": stats.invalidations,
        "compulsoryMisses": stats.compulsory_misses,
        "capacityMisses": stats.capacity_misses,
        "conflictMisses": stats.conflict_misses,
    })
}

/// Prints the full JSON report to stdout.
pub fn print_json(processor: &TraceProcessor, info: &RunInfo<'_>) {
    let stats = processor.get_stats();
    let hot = processor.get_hot_lines(10);
    let false_sharing = processor.get_false_sharing_reports();

    let mut report = json!({
        "config": info.config_name,
        "multicore": info.cores > 1,
        "cores": info.cores,
        "threads": info.threads,
        "events": info.events,
        "levels": {
            "l1d": level_json(&stats.l1d),
            "l1i": level_json(&stats.l1i),
            "l2": level_json(&stats.l2),
            "l3": level_json(&stats.l3),
        },
        "hotLines": hot,
        "suggestions": suggestions(processor),
    });

    if let Some(mc) = processor.get_multicore_stats() {
        report["coherence"] = json!({
            "invalidations": mc.coherence_invalidations,
            "falseSharingEvents": mc.false_sharing_events,
        });
        report["falseSharing"] = Value::Array(
            false_sharing
                .iter()
                .map(|fs| {
                    json!({
                        "cacheLineAddr": format!("{:#x}", fs.line_address),
                        "accessCount": fs.accesses.len(),
                    })
                })
                .collect(),
        );
    } else {
        report["timing"] = json!(stats.timing);
        report["tlb"] = processor.as_single_core().map_or_else(
            || json!(null),
            |h| json!({ "dtlb": h.dtlb_stats(), "itlb": h.itlb_stats() }),
        );
    }
    if info.prefetching {
        report["prefetch"] = json!(processor.get_prefetch_stats());
    }

    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("Error serializing report: {err}"),
    }
}

fn print_level(name: &str, stats: &CacheStats) {
    println!(
        "{:<8}{:>12}{:>12}{:>10.1}%{:>12}",
        name,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0,
        stats.writebacks
    );
}

/// Prints the human-readable report to stdout.
pub fn print_text(processor: &TraceProcessor, info: &RunInfo<'_>) {
    let stats = processor.get_stats();

    println!();
    println!("=== Cache Simulation ===");
    println!("Config: {}", info.config_name);
    println!("Cores: {}, Threads: {}", info.cores, info.threads);
    println!("Events: {}", info.events);
    println!();
    println!("{:<8}{:>12}{:>12}{:>11}{:>12}", "Level", "Hits", "Misses", "Hit Rate", "Writebacks");
    println!("{}", "-".repeat(55));
    print_level(if info.cores > 1 { "L1" } else { "L1-D" }, &stats.l1d);
    if info.cores == 1 {
        print_level("L1-I", &stats.l1i);
    }
    print_level("L2", &stats.l2);
    print_level("L3", &stats.l3);

    if let Some(mc) = processor.get_multicore_stats() {
        println!();
        println!("=== Coherence ===");
        println!("Invalidations: {}", mc.coherence_invalidations);
        println!("False-sharing events: {}", mc.false_sharing_events);

        let false_sharing = processor.get_false_sharing_reports();
        if !false_sharing.is_empty() {
            println!();
            println!("=== FALSE SHARING DETECTED ===");
            for report in &false_sharing {
                let mut threads: Vec<u32> =
                    report.accesses.iter().map(|a| a.thread_id).collect();
                threads.sort_unstable();
                threads.dedup();
                println!(
                    "Cache line {:#x}: {} accesses, threads {:?}",
                    report.line_address,
                    report.accesses.len(),
                    threads
                );
            }
        }
    } else {
        let total = stats.l1d.total_accesses() + stats.l1i.total_accesses();
        println!();
        println!("=== Timing ===");
        println!("Total cycles: {}", stats.timing.total_cycles);
        println!("Average latency: {:.2} cycles/access", stats.timing.average_latency(total));
        if let Some(h) = processor.as_single_core() {
            println!(
                "DTLB hit rate: {:.2}%  ITLB hit rate: {:.2}%",
                h.dtlb_stats().hit_rate() * 100.0,
                h.itlb_stats().hit_rate() * 100.0
            );
        }
    }

    if info.prefetching {
        let pf = processor.get_prefetch_stats();
        println!();
        println!("=== Prefetch ===");
        println!(
            "Issued: {}  Useful: {}  Useless: {}  Accuracy: {:.2}%",
            pf.issued,
            pf.useful,
            pf.useless,
            pf.accuracy() * 100.0
        );
    }

    let sw = processor.get_software_prefetch_stats();
    if sw.issued > 0 {
        println!(
            "Software prefetches: {} issued, {} useful, {} redundant",
            sw.issued, sw.useful, sw.redundant
        );
    }

    let hot = processor.get_hot_lines(10);
    if !hot.is_empty() {
        println!();
        println!("=== Hottest Source Lines (by misses) ===");
        for line in &hot {
            println!(
                "{:<40} {:>8} misses {:>8} hits  ({:.1}% miss)",
                format!("{}:{}", line.file, line.line),
                line.misses,
                line.hits,
                line.miss_rate() * 100.0
            );
        }
    }

    let advice = suggestions(processor);
    if !advice.is_empty() {
        println!();
        println!("=== Suggestions ===");
        for s in &advice {
            println!("[{:?}] {}: {}", s.severity, s.location, s.message);
            println!("    fix: {}", s.fix);
        }
    }
}
