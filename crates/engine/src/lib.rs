//! Offline memory-trace cache hierarchy simulator.
//!
//! This crate consumes a linear stream of memory-access events emitted by an
//! instrumented program and reproduces the behavior of a multi-level CPU
//! cache hierarchy. It implements the following:
//! 1. **Cache levels:** set-associative caches with LRU/PLRU/RANDOM/SRRIP/
//!    BRRIP replacement, write policies, and 3C miss classification.
//! 2. **Hierarchies:** a single-core L1d/L1i/L2/optional-L3 composition with
//!    inclusion policies, TLBs, prefetching, and timing; and a multi-core
//!    composition with directory-based MESI coherence and false-sharing
//!    detection.
//! 3. **Prefetching:** stream, stride, next-line, and adaptive hardware
//!    prefetchers with usefulness accounting.
//! 4. **Trace handling:** the line-oriented wire format, event splitting
//!    across cache lines, per-source-line attribution, and specialty
//!    counters for vector/atomic/intrinsic events.
//! 5. **Acceleration and reporting:** segment memoization for repetitive
//!    traces and an optimization suggester over the results.
//!
//! The simulator is single-threaded and deterministic: the multi-threading
//! it models is a property of the input trace, and the only randomness
//! (RANDOM/BRRIP replacement) comes from a seeded per-level generator.

/// One set-associative cache level with replacement policies and 3C
/// classification.
pub mod cache;
/// MESI-like coherence states and the directory controller.
pub mod coherence;
/// Common types (addresses, errors).
pub mod common;
/// Configuration structures and policy enums.
pub mod config;
/// Single-core and multi-core cache hierarchies.
pub mod hierarchy;
/// Hardware prefetcher (stream/stride/next-line/adaptive).
pub mod prefetch;
/// Optimization suggestions over simulation results.
pub mod report;
/// Segment memoization cache for repetitive traces.
pub mod segment;
/// Statistics structures.
pub mod stats;
/// Translation lookaside buffer.
pub mod tlb;
/// Trace events, wire-format parsing, and the trace processor.
pub mod trace;

/// Per-level cache simulator; construct from a [`config::CacheConfig`].
pub use crate::cache::CacheLevel;
/// Configuration error surfaced by constructors.
pub use crate::common::error::{ConfigError, TraceParseError};
/// Hierarchy description; use `HierarchyConfig::default()` or deserialize
/// from JSON.
pub use crate::config::HierarchyConfig;
/// Main entry point: owns a hierarchy and consumes trace events.
pub use crate::trace::processor::TraceProcessor;
/// Wire-format line parser.
pub use crate::trace::parse_trace_line;
/// One memory-access event.
pub use crate::trace::TraceEvent;
