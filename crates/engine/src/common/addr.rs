//! Address arithmetic helpers.
//!
//! Every structure in the simulator keys on one of two granularities: the
//! cache line (for caches, the coherence directory, and false-sharing
//! witnesses) or the 4 KiB page (for the TLB and the stream prefetcher).
//! These helpers centralize the masking so the bit twiddling lives in one
//! place.

/// Log2 of the page size used for TLB and prefetcher page tracking.
pub const PAGE_SHIFT: u32 = 12;

/// Page size in bytes (4 KiB).
pub const PAGE_BYTES: u64 = 1 << PAGE_SHIFT;

/// Returns the line-base address: `addr` with its offset bits cleared.
///
/// `line_bytes` must be a power of two.
#[inline]
pub fn line_base(addr: u64, line_bytes: u64) -> u64 {
    addr & !(line_bytes - 1)
}

/// Returns the byte offset of `addr` within its cache line.
#[inline]
pub fn line_offset(addr: u64, line_bytes: u64) -> u64 {
    addr & (line_bytes - 1)
}

/// Returns the 4 KiB page number containing `addr`.
#[inline]
pub fn page_number(addr: u64) -> u64 {
    addr >> PAGE_SHIFT
}
