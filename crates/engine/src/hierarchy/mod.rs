//! Cache hierarchies.
//!
//! Two compositions of [`crate::cache::CacheLevel`] exist:
//! 1. **Single-core:** L1d/L1i/L2/optional L3 with TLBs, one prefetcher, an
//!    inclusion policy, and cycle accounting.
//! 2. **Multi-core:** per-core L1/prefetcher/DTLB over a shared L2/L3, with
//!    directory coherence and false-sharing witness tracking.

/// Multi-core hierarchy with MESI coherence and false-sharing detection.
pub mod multi;
/// Single-core hierarchy with inclusion policies and timing.
pub mod single;

pub use multi::{CoreAccessOutcome, MultiCoreHierarchy};
pub use single::{SingleCoreHierarchy, SystemAccessResult};
