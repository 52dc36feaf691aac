//! Trace events and the line-oriented wire format.
//!
//! A trace is UTF-8 text, one event per line:
//!
//! ```text
//! <type>[hint] <address_hex> [<src_address_hex>] <size_dec> [<file>:<line>] [T<thread>]
//! ```
//!
//! Type letters: `L`/`l`/`R`/`r` load, `S`/`s` store, `I`/`i` instruction
//! fetch, `P<n>` software prefetch with hint `n` in 0..=3, `V` vector load,
//! `U` vector store, `A` atomic load, `X` atomic RMW, `C` compare-exchange,
//! `Z` memset, `M` memcpy and `O` memmove (both carry a source address).
//! Addresses are hex with an optional `0x` prefix; the size is a positive
//! decimal byte count. `#` starts a comment and blank lines are ignored. A
//! missing thread field defaults to thread 1.
//!
//! Parsing never aborts a run: a bad line yields a [`TraceParseError`] the
//! caller logs and skips.

/// Trace event dispatch into the hierarchy.
pub mod processor;

use crate::common::addr::line_base;
use crate::common::error::TraceParseError;

/// A source location `(file, line)` attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Source file path as written in the trace.
    pub file: String,
    /// 1-based line number (0 when the trace only named a file).
    pub line: u32,
}

/// One memory-access event from the trace. Pure value; no hidden state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Byte address of the access (destination for copy/move/set).
    pub address: u64,
    /// Access size in bytes; always positive for parsed events.
    pub size: u32,
    /// Simulated thread that performed the access.
    pub thread_id: u32,
    /// Store (or the write half of an intrinsic).
    pub is_write: bool,
    /// Instruction fetch, routed through L1i/ITLB.
    pub is_icache: bool,
    /// Vector/SIMD access.
    pub is_vector: bool,
    /// Atomic access.
    pub is_atomic: bool,
    /// Atomic read-modify-write.
    pub is_rmw: bool,
    /// Atomic compare-exchange.
    pub is_cmpxchg: bool,
    /// Software prefetch hint.
    pub is_prefetch: bool,
    /// Locality hint carried by a prefetch (0..=3).
    pub prefetch_hint: u8,
    /// memcpy intrinsic.
    pub is_memcpy: bool,
    /// memmove intrinsic.
    pub is_memmove: bool,
    /// memset intrinsic.
    pub is_memset: bool,
    /// Source address for copy/move intrinsics.
    pub src_address: Option<u64>,
    /// Source location, when the trace was built with debug info.
    pub source: Option<SourceLocation>,
}

impl Default for TraceEvent {
    /// A one-byte load at address 0 on thread 1.
    fn default() -> Self {
        Self {
            address: 0,
            size: 1,
            thread_id: 1,
            is_write: false,
            is_icache: false,
            is_vector: false,
            is_atomic: false,
            is_rmw: false,
            is_cmpxchg: false,
            is_prefetch: false,
            prefetch_hint: 0,
            is_memcpy: false,
            is_memmove: false,
            is_memset: false,
            src_address: None,
            source: None,
        }
    }
}

impl TraceEvent {
    /// A plain load.
    pub fn load(address: u64, size: u32) -> Self {
        Self {
            address,
            size,
            ..Self::default()
        }
    }

    /// A plain store.
    pub fn store(address: u64, size: u32) -> Self {
        Self {
            address,
            size,
            is_write: true,
            ..Self::default()
        }
    }

    /// An instruction fetch.
    pub fn fetch(address: u64, size: u32) -> Self {
        Self {
            address,
            size,
            is_icache: true,
            ..Self::default()
        }
    }

    /// Pins the event to a thread.
    pub fn on_thread(mut self, thread_id: u32) -> Self {
        self.thread_id = thread_id;
        self
    }

    /// Attaches a source location.
    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.source = Some(SourceLocation {
            file: file.to_owned(),
            line,
        });
        self
    }
}

/// Splits the byte extent `[addr, addr + size)` into the line-base
/// addresses it touches, in ascending order.
pub fn split_into_line_accesses(addr: u64, size: u32, line_bytes: u64) -> Vec<u64> {
    if size == 0 {
        return Vec::new();
    }
    let start = line_base(addr, line_bytes);
    let end = line_base(addr + u64::from(size) - 1, line_bytes);
    let mut lines = Vec::with_capacity(((end - start) / line_bytes + 1) as usize);
    let mut line = start;
    loop {
        lines.push(line);
        if line == end {
            break;
        }
        line += line_bytes;
    }
    lines
}

/// Parses one trace line.
///
/// Returns `Ok(None)` for comments and blank lines, `Ok(Some(event))` for a
/// well-formed event.
///
/// # Errors
///
/// Returns a [`TraceParseError`] naming the first malformed field. Callers
/// are expected to log and skip; a parse error never aborts the trace.
pub fn parse_trace_line(line: &str) -> Result<Option<TraceEvent>, TraceParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let mut tokens = trimmed.split_whitespace();
    let type_token = tokens.next().ok_or(TraceParseError::MissingAddress)?;
    let mut chars = type_token.chars();
    let letter = chars.next().ok_or(TraceParseError::MissingAddress)?;
    let rest = chars.as_str();

    let mut event = TraceEvent::default();
    match letter {
        'L' | 'l' | 'R' | 'r' => {}
        'S' | 's' => event.is_write = true,
        'I' | 'i' => event.is_icache = true,
        'P' => {
            event.is_prefetch = true;
            event.prefetch_hint = match rest {
                "" => 0,
                "0" => 0,
                "1" => 1,
                "2" => 2,
                "3" => 3,
                _ => return Err(TraceParseError::UnknownType(letter)),
            };
        }
        'V' => event.is_vector = true,
        'U' => {
            event.is_vector = true;
            event.is_write = true;
        }
        'A' => event.is_atomic = true,
        'X' => {
            event.is_atomic = true;
            event.is_write = true;
            event.is_rmw = true;
        }
        'C' => {
            event.is_atomic = true;
            event.is_cmpxchg = true;
        }
        'Z' => {
            event.is_memset = true;
            event.is_write = true;
        }
        'M' => {
            event.is_memcpy = true;
            event.is_write = true;
        }
        'O' => {
            event.is_memmove = true;
            event.is_write = true;
        }
        other => return Err(TraceParseError::UnknownType(other)),
    }
    if letter != 'P' && !rest.is_empty() {
        return Err(TraceParseError::UnknownType(letter));
    }

    let addr_token = tokens.next().ok_or(TraceParseError::MissingAddress)?;
    event.address = parse_hex(addr_token)
        .ok_or_else(|| TraceParseError::BadAddress(addr_token.to_owned()))?;

    if event.is_memcpy || event.is_memmove {
        let src_token = tokens
            .next()
            .ok_or(TraceParseError::MissingSourceAddress)?;
        event.src_address = Some(
            parse_hex(src_token)
                .ok_or_else(|| TraceParseError::BadAddress(src_token.to_owned()))?,
        );
    }

    let size_token = tokens.next().ok_or(TraceParseError::MissingSize)?;
    event.size = match size_token.parse::<u32>() {
        Ok(size) if size > 0 => size,
        _ => return Err(TraceParseError::BadSize(size_token.to_owned())),
    };

    for token in tokens {
        if let Some(thread) = token.strip_prefix('T') {
            // A leading `T` marks the thread field, never a file name.
            event.thread_id = thread
                .parse::<u32>()
                .map_err(|_| TraceParseError::BadThread(token.to_owned()))?;
        } else {
            event.source = Some(parse_location(token));
        }
    }

    Ok(Some(event))
}

/// Parses a hex literal with an optional `0x`/`0X` prefix.
fn parse_hex(token: &str) -> Option<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).ok()
}

/// Splits a `file:line` token at its last colon; a token without a parsable
/// line number is taken as a bare file name.
fn parse_location(token: &str) -> SourceLocation {
    if let Some((file, line)) = token.rsplit_once(':') {
        if let Ok(line) = line.parse::<u32>() {
            return SourceLocation {
                file: file.to_owned(),
                line,
            };
        }
    }
    SourceLocation {
        file: token.to_owned(),
        line: 0,
    }
}
