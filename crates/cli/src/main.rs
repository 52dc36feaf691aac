//! Memory-trace cache simulator CLI.
//!
//! This binary reads a line-oriented trace (file argument or stdin), builds
//! the requested cache hierarchy, and replays the trace through it. It
//! performs:
//! 1. **Configuration:** hardware preset selection plus per-level geometry
//!    overrides.
//! 2. **Mode selection:** single-core by default; multi-core with coherence
//!    and false-sharing detection when the trace carries several thread ids
//!    (or `--cores` forces it).
//! 3. **Reporting:** text tables or JSON (`--json`), optional per-event
//!    streaming (`--stream`) and verbose event echo (`--verbose`).

mod output;
mod presets;

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cachetrace_core::TraceProcessor;
use cachetrace_core::config::{HierarchyConfig, PrefetchPolicy};
use cachetrace_core::trace::{TraceEvent, parse_trace_line};

use crate::output::RunInfo;

#[derive(Parser, Debug)]
#[command(
    name = "cachetrace",
    author,
    version,
    about = "Offline memory-trace cache hierarchy simulator",
    long_about = "Replay a memory-access trace through a simulated cache hierarchy.\n\nTraces are line-oriented text (one access per line); see the crate docs for\nthe wire format. Multi-core simulation with MESI coherence and false-sharing\ndetection engages automatically when the trace carries several thread ids.\n\nExamples:\n  cachetrace trace.txt\n  cachetrace --config amd --prefetch stream --prefetch-degree 2 trace.txt\n  my_instrumented_prog | cachetrace --json"
)]
struct Cli {
    /// Trace file; reads stdin when omitted.
    trace: Option<PathBuf>,

    /// Hardware preset: intel, amd, apple, educational, or default/custom.
    #[arg(long, default_value = "intel")]
    config: String,

    /// Cores to simulate; 0 auto-detects from trace thread ids.
    #[arg(long, default_value_t = 0)]
    cores: usize,

    /// Hardware prefetch policy.
    #[arg(long, value_enum, default_value = "none")]
    prefetch: PrefetchArg,

    /// Lines issued per triggering miss.
    #[arg(long, default_value_t = 2)]
    prefetch_degree: usize,

    /// Echo each cache event while simulating.
    #[arg(long)]
    verbose: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,

    /// Stream one JSON object per line access while simulating.
    #[arg(long)]
    stream: bool,

    /// Disable 3C miss classification for speed.
    #[arg(long)]
    fast: bool,

    /// Override L1 size in bytes (applied to L1d and L1i).
    #[arg(long)]
    l1_size: Option<usize>,

    /// Override L1 associativity.
    #[arg(long)]
    l1_assoc: Option<usize>,

    /// Override the cache line size in bytes (applied to every level).
    #[arg(long)]
    l1_line: Option<usize>,

    /// Override L2 size in bytes.
    #[arg(long)]
    l2_size: Option<usize>,

    /// Override L2 associativity.
    #[arg(long)]
    l2_assoc: Option<usize>,

    /// Override L3 size in bytes.
    #[arg(long)]
    l3_size: Option<usize>,

    /// Override L3 associativity.
    #[arg(long)]
    l3_assoc: Option<usize>,
}

/// `--prefetch` values, mirroring the library's policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PrefetchArg {
    None,
    NextLine,
    Stream,
    Stride,
    Adaptive,
    Intel,
}

impl From<PrefetchArg> for PrefetchPolicy {
    fn from(arg: PrefetchArg) -> Self {
        match arg {
            PrefetchArg::None => Self::None,
            PrefetchArg::NextLine => Self::NextLine,
            PrefetchArg::Stream => Self::Stream,
            PrefetchArg::Stride => Self::Stride,
            PrefetchArg::Adaptive => Self::Adaptive,
            PrefetchArg::Intel => Self::Intel,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let text = read_trace(cli.trace.as_ref());
    let (events, threads) = parse_events(&text);
    if events.is_empty() {
        eprintln!("Error: no valid trace events in input");
        process::exit(1);
    }

    let config = build_config(&cli);
    let multicore = cli.cores > 1 || (cli.cores == 0 && threads.len() > 1);
    let cores = if cli.cores > 0 {
        cli.cores
    } else if multicore {
        threads.len().min(8)
    } else {
        1
    };

    let mut processor = match build_processor(&config, multicore, cores) {
        Ok(processor) => processor,
        Err(err) => {
            eprintln!("Error: invalid cache configuration: {err}");
            process::exit(1);
        }
    };

    if cli.fast {
        processor.set_fast_mode(true);
    }
    let prefetching = cli.prefetch != PrefetchArg::None;
    if prefetching {
        processor.enable_prefetching(cli.prefetch.into(), cli.prefetch_degree);
    }

    if cli.stream {
        processor.set_event_callback(Box::new(|event| {
            let record = serde_json::json!({
                "l1Hit": event.l1_hit,
                "l2Hit": event.l2_hit,
                "l3Hit": event.l3_hit,
                "address": format!("{:#x}", event.address),
                "size": event.size,
                "file": event.file,
                "line": event.line,
            });
            println!("{record}");
        }));
    } else if cli.verbose && !cli.json {
        processor.set_event_callback(Box::new(|event| {
            let outcome = if event.l1_hit {
                "L1_HIT"
            } else if event.l2_hit {
                "L2_HIT"
            } else if event.l3_hit {
                "L3_HIT"
            } else {
                "MISS"
            };
            if event.file.is_empty() {
                println!("{outcome} {:#x}", event.address);
            } else {
                println!("{outcome} {:#x} {}:{}", event.address, event.file, event.line);
            }
        }));
    }

    for event in &events {
        processor.process(event);
    }

    let info = RunInfo {
        config_name: &cli.config,
        cores,
        threads: threads.len(),
        events: events.len(),
        prefetching,
    };
    if cli.json {
        output::print_json(&processor, &info);
    } else {
        output::print_text(&processor, &info);
    }
}

/// Reads the whole trace from the file argument or stdin.
fn read_trace(path: Option<&PathBuf>) -> String {
    match path {
        Some(path) => fs::read_to_string(path).unwrap_or_else(|err| {
            eprintln!("Error reading trace {}: {err}", path.display());
            process::exit(1);
        }),
        None => {
            let mut text = String::new();
            if let Err(err) = std::io::stdin().read_to_string(&mut text) {
                eprintln!("Error reading stdin: {err}");
                process::exit(1);
            }
            text
        }
    }
}

/// Parses every line, logging and skipping malformed ones.
fn parse_events(text: &str) -> (Vec<TraceEvent>, BTreeSet<u32>) {
    let mut events = Vec::new();
    let mut threads = BTreeSet::new();
    for (number, line) in text.lines().enumerate() {
        match parse_trace_line(line) {
            Ok(Some(event)) => {
                let _ = threads.insert(event.thread_id);
                events.push(event);
            }
            Ok(None) => {}
            Err(err) => warn!(line = number + 1, %err, "skipping malformed trace line"),
        }
    }
    (events, threads)
}

/// Resolves the preset and applies the per-level geometry overrides.
fn build_config(cli: &Cli) -> HierarchyConfig {
    let Some(mut config) = presets::by_name(&cli.config) else {
        eprintln!(
            "Error: unknown preset `{}` (expected one of {})",
            cli.config,
            presets::PRESET_NAMES.join(", ")
        );
        process::exit(1);
    };

    if let Some(size) = cli.l1_size {
        config.l1d.size_bytes = size;
        config.l1i.size_bytes = size;
    }
    if let Some(ways) = cli.l1_assoc {
        config.l1d.ways = ways;
        config.l1i.ways = ways;
    }
    if let Some(line) = cli.l1_line {
        config.l1d.line_bytes = line;
        config.l1i.line_bytes = line;
        config.l2.line_bytes = line;
        if let Some(l3) = &mut config.l3 {
            l3.line_bytes = line;
        }
    }
    if let Some(size) = cli.l2_size {
        config.l2.size_bytes = size;
    }
    if let Some(ways) = cli.l2_assoc {
        config.l2.ways = ways;
    }
    if let Some(l3) = &mut config.l3 {
        if let Some(size) = cli.l3_size {
            l3.size_bytes = size;
        }
        if let Some(ways) = cli.l3_assoc {
            l3.ways = ways;
        }
    }

    if let Err(err) = config.validate() {
        eprintln!("Error: invalid cache configuration: {err}");
        process::exit(1);
    }
    config
}

/// Builds the processor for the selected mode.
fn build_processor(
    config: &HierarchyConfig,
    multicore: bool,
    cores: usize,
) -> Result<TraceProcessor, cachetrace_core::ConfigError> {
    if multicore {
        let l3 = config.l3.clone().unwrap_or_else(|| {
            HierarchyConfig::default()
                .l3
                .unwrap_or_else(|| config.l2.clone())
        });
        TraceProcessor::new_multi_core(cores, &config.l1d, &config.l2, &l3)
    } else {
        TraceProcessor::new(config)
    }
}
