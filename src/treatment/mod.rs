//! Term treatments: the policy mapping a term to its row recipe.
//!
//! A treatment is a pure function from a term's statistics to a
//! [`RowConfiguration`] describing how many rows of which rank the term
//! should occupy. The policy in use determines the Bloom-filter-style
//! tradeoff between table size and query false positives.

pub mod private_shared_rank0;

pub use self::private_shared_rank0::PrivateSharedRank0;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::row::Rank;
use crate::term::Term;

/// Largest number of rows a single configuration entry may request.
pub const MAX_ROW_COUNT: usize = 16;

/// Largest number of entries in a row configuration (one per rank at most).
pub const MAX_ENTRY_COUNT: usize = 8;

/// One line of a row recipe: `row_count` rows at `rank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Rank of the requested rows.
    pub rank: Rank,

    /// Number of rows requested at that rank, in `[1, MAX_ROW_COUNT]`.
    pub row_count: usize,
}

impl Entry {
    /// Create a configuration entry.
    pub fn new(rank: Rank, row_count: usize) -> Self {
        Entry { rank, row_count }
    }
}

/// A small fixed-capacity row recipe, with at most one entry per rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowConfiguration {
    entries: SmallVec<[Entry; MAX_ENTRY_COUNT]>,
}

impl RowConfiguration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        RowConfiguration {
            entries: SmallVec::new(),
        }
    }

    /// Append an entry. Capacity overruns, zero or oversized row counts, and
    /// duplicate ranks are contract violations.
    pub fn push(&mut self, entry: Entry) {
        assert!(
            self.entries.len() < MAX_ENTRY_COUNT,
            "row configuration is full"
        );
        assert!(
            entry.row_count >= 1 && entry.row_count <= MAX_ROW_COUNT,
            "row count {} outside [1, {MAX_ROW_COUNT}]",
            entry.row_count
        );
        assert!(
            self.entries.iter().all(|e| e.rank != entry.rank),
            "duplicate entry for rank {}",
            entry.rank
        );
        self.entries.push(entry);
    }

    /// The entries in insertion order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the configuration has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of rows requested at `rank`, zero if absent.
    pub fn row_count_at(&self, rank: Rank) -> usize {
        self.entries
            .iter()
            .find(|e| e.rank == rank)
            .map_or(0, |e| e.row_count)
    }

    /// Total number of rows requested across all ranks.
    pub fn total_row_count(&self) -> usize {
        self.entries.iter().map(|e| e.row_count).sum()
    }
}

/// A term treatment policy. Implementations are immutable after
/// construction and shareable across concurrent readers.
pub trait Treatment: Send + Sync {
    /// The row recipe for `term`.
    fn get_treatment(&self, term: &Term) -> RowConfiguration;
}

/// Parameters shared by density-based treatment policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreatmentConfig {
    /// Target fraction of set bits in a shared row.
    pub density: f64,

    /// Target ratio of true matches to false positives per term.
    pub snr: f64,
}

impl Default for TreatmentConfig {
    fn default() -> Self {
        TreatmentConfig {
            density: 0.1,
            snr: 10.0,
        }
    }
}
