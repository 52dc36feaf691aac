//! Error types for the cache simulator.
//!
//! Two failure domains exist, with very different propagation rules:
//! 1. **Configuration errors** are fatal to the simulation being constructed
//!    and surface as `Result` from constructors.
//! 2. **Trace-parse errors** are absorbed: a malformed line is skipped with a
//!    diagnostic and processing continues.

use thiserror::Error;

/// Rejection reasons for an invalid cache, TLB, or hierarchy configuration.
///
/// Raised at construction time of a [`crate::cache::CacheLevel`],
/// [`crate::tlb::Tlb`], or hierarchy. Fatal to that simulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Cache or TLB size is zero.
    #[error("cache size must be non-zero")]
    ZeroSize,

    /// Associativity is zero.
    #[error("associativity must be at least 1")]
    ZeroAssociativity,

    /// Line size is not a power of two.
    #[error("line size {0} is not a power of two")]
    LineNotPowerOfTwo(usize),

    /// The derived set count is zero or not a power of two.
    ///
    /// `num_sets = size / (line_size * ways)` must be a positive power of two
    /// so that set indices can be extracted with a mask.
    #[error("derived set count {0} is not a positive power of two")]
    SetsNotPowerOfTwo(usize),

    /// Tree-PLRU requires a power-of-two associativity.
    #[error("PLRU replacement requires power-of-two associativity, got {0}")]
    PlruAssociativity(usize),

    /// A multi-core hierarchy was requested with zero cores.
    #[error("core count must be at least 1")]
    ZeroCores,
}

/// Rejection reasons for a malformed trace line.
///
/// Never fatal: callers log the diagnostic and skip the line. Statistics only
/// reflect events that parsed successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceParseError {
    /// The event type letter is not part of the wire format.
    #[error("unknown event type `{0}`")]
    UnknownType(char),

    /// The line ended before the address field.
    #[error("missing address field")]
    MissingAddress,

    /// The address field is not valid hexadecimal.
    #[error("malformed hex address `{0}`")]
    BadAddress(String),

    /// A copy/move event is missing its source address.
    #[error("missing source address for copy/move event")]
    MissingSourceAddress,

    /// The line ended before the size field.
    #[error("missing size field")]
    MissingSize,

    /// The size field is not a positive decimal byte count.
    #[error("malformed size `{0}` (expected positive decimal byte count)")]
    BadSize(String),

    /// The thread field (`T<n>`) is not a valid thread id.
    #[error("malformed thread id `{0}`")]
    BadThread(String),
}
