//! Translation Lookaside Buffer.
//!
//! A set-associative, LRU-replaced cache of page numbers. The simulator does
//! not model actual translation, only whether a translation would have been
//! resident, so entries carry just the page number, a validity flag, and an
//! access stamp.

use crate::common::error::ConfigError;
use crate::config::TlbConfig;
use crate::stats::TlbStats;

/// A single TLB entry.
#[derive(Debug, Clone, Copy, Default)]
struct TlbEntry {
    /// Page number (tag).
    page: u64,
    /// Entry validity flag.
    valid: bool,
    /// Stamp of the most recent access, for LRU victim selection.
    last_access: u64,
}

/// Set-associative TLB with LRU replacement.
#[derive(Debug)]
pub struct Tlb {
    config: TlbConfig,
    /// `num_sets * ways` entries, set-major.
    entries: Vec<TlbEntry>,
    access_counter: u64,
    stats: TlbStats,
}

impl Tlb {
    /// Builds a TLB from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero-entry or zero-way shape, or a
    /// non-power-of-two page size.
    pub fn new(config: TlbConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            entries: vec![TlbEntry::default(); config.num_sets() * config.ways],
            access_counter: 0,
            stats: TlbStats::default(),
            config,
        })
    }

    /// Looks up the page containing `addr`, installing it on a miss.
    ///
    /// Returns `true` on a hit. Hits refresh the entry's LRU stamp; misses
    /// replace the least recently used way of the set.
    pub fn access(&mut self, addr: u64) -> bool {
        let page = self.page_of(addr);
        let base = self.set_base(page);
        self.access_counter += 1;

        for way in 0..self.config.ways {
            let entry = &mut self.entries[base + way];
            if entry.valid && entry.page == page {
                entry.last_access = self.access_counter;
                self.stats.hits += 1;
                return true;
            }
        }

        self.stats.misses += 1;

        let mut victim = 0;
        let mut oldest = u64::MAX;
        for way in 0..self.config.ways {
            let entry = &self.entries[base + way];
            if !entry.valid {
                victim = way;
                break;
            }
            if entry.last_access < oldest {
                oldest = entry.last_access;
                victim = way;
            }
        }

        self.entries[base + victim] = TlbEntry {
            page,
            valid: true,
            last_access: self.access_counter,
        };
        false
    }

    /// Drops the mapping for the page containing `addr`, if resident.
    pub fn invalidate(&mut self, addr: u64) {
        let page = self.page_of(addr);
        let base = self.set_base(page);
        for way in 0..self.config.ways {
            let entry = &mut self.entries[base + way];
            if entry.valid && entry.page == page {
                entry.valid = false;
                break;
            }
        }
    }

    /// Drops every mapping.
    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
    }

    /// Accumulated hit/miss counters.
    pub const fn stats(&self) -> &TlbStats {
        &self.stats
    }

    /// Clears the counters.
    pub fn reset_stats(&mut self) {
        self.stats = TlbStats::default();
    }

    /// Page number of `addr` under the configured page size.
    #[inline]
    fn page_of(&self, addr: u64) -> u64 {
        addr >> self.config.page_bytes.trailing_zeros()
    }

    /// First entry index of the set holding `page`.
    #[inline]
    fn set_base(&self, page: u64) -> usize {
        (page as usize % self.config.num_sets()) * self.config.ways
    }
}
