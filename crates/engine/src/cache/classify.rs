//! 3C miss classification.
//!
//! Splits demand misses into the classic three buckets:
//! - **Compulsory:** first touch of the line, ever.
//! - **Capacity:** a fully-associative LRU cache of the same line capacity
//!   would also have missed.
//! - **Conflict:** the fully-associative shadow still held the line, so the
//!   miss is a set-mapping collision.
//!
//! The shadow cache must observe hits as well as misses to keep its recency
//! order honest; [`MissClassifier::touch`] is the hit-path hook. The shadow
//! scan on eviction is linear, which is the cost the `--fast` mode trades
//! away.

use std::collections::{HashMap, HashSet};

/// Which of the 3C buckets a demand miss falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissKind {
    /// First touch of the line.
    Compulsory,
    /// Working set exceeds the level's capacity.
    Capacity,
    /// Set-mapping collision given finite associativity.
    Conflict,
}

/// Per-level classifier state: first-touch set plus a shadow
/// fully-associative LRU of the level's line capacity.
#[derive(Debug)]
pub struct MissClassifier {
    seen: HashSet<u64>,
    /// Shadow fully-associative cache: line base → last-use stamp.
    shadow: HashMap<u64, u64>,
    capacity: usize,
    tick: u64,
}

impl MissClassifier {
    /// Creates a classifier for a level holding `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            shadow: HashMap::new(),
            capacity,
            tick: 0,
        }
    }

    /// Classifies a demand miss on `line` and refreshes the shadow cache.
    pub fn classify(&mut self, line: u64) -> MissKind {
        let kind = if self.seen.insert(line) {
            MissKind::Compulsory
        } else if self.shadow.contains_key(&line) {
            MissKind::Conflict
        } else {
            MissKind::Capacity
        };
        self.touch(line);
        kind
    }

    /// Refreshes `line` in the shadow cache (hit path).
    pub fn touch(&mut self, line: u64) {
        self.tick += 1;
        let _ = self.shadow.insert(line, self.tick);
        if self.shadow.len() > self.capacity {
            self.evict_oldest();
        }
    }

    /// Drops the least recently used shadow entry.
    fn evict_oldest(&mut self) {
        if let Some(victim) = self
            .shadow
            .iter()
            .min_by_key(|&(_, stamp)| *stamp)
            .map(|(&line, _)| line)
        {
            let _ = self.shadow.remove(&victim);
        }
    }
}
