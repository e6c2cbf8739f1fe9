//! The term table: a persistent map from terms to signature rows.
//!
//! A [`TermTable`] is built once by an ordered protocol (open a term, add
//! its row ids, close it), sealed, and then served read-only. Explicit terms
//! own an entry in the hash map; all other terms fall back to a recipe
//! table indexed by IDF bucket and gram size, from which concrete rows are
//! derived by hashing at query time.
//!
//! Row index space per rank is laid out in fixed bands, settled at seal
//! time: rank 0 is `[facts | explicit | shared | adhoc]`, higher ranks
//! `[explicit | shared | adhoc]`.

mod serial;

use ahash::AHashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SigilError};
use crate::row::{Rank, RowId, RowIndex, MAX_RANK, RANK_COUNT};
use crate::term::{GramSize, IdfX10, Term, TermHash, MAX_GRAM_SIZE, MAX_IDF_X10};

/// Number of cells in the adhoc recipe rectangle.
pub const ADHOC_RECIPE_CELLS: usize =
    (MAX_IDF_X10 as usize + 1) * (MAX_GRAM_SIZE as usize + 1);

/// How the rows of a [`PackedRowIdSequence`] are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowIdSequenceKind {
    /// Rows stored directly in the table's row-id buffer.
    Explicit,
    /// Rows derived from the term hash against an adhoc recipe.
    Adhoc,
    /// Rows reserved for ingestion-time facts.
    Fact,
}

impl RowIdSequenceKind {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            RowIdSequenceKind::Explicit => 0,
            RowIdSequenceKind::Adhoc => 1,
            RowIdSequenceKind::Fact => 2,
        }
    }

    pub(crate) fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RowIdSequenceKind::Explicit),
            1 => Ok(RowIdSequenceKind::Adhoc),
            2 => Ok(RowIdSequenceKind::Fact),
            other => Err(SigilError::corrupt(format!(
                "unknown row id sequence kind {other}"
            ))),
        }
    }
}

/// A contiguous slice of the table's row-id buffer: `[start, end)` plus the
/// kind that tells the caller how to resolve each position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedRowIdSequence {
    start: u32,
    end: u32,
    kind: RowIdSequenceKind,
}

impl PackedRowIdSequence {
    /// Create a slice descriptor.
    pub fn new(start: u32, end: u32, kind: RowIdSequenceKind) -> Self {
        debug_assert!(start <= end);
        PackedRowIdSequence { start, end, kind }
    }

    /// First buffer index of the slice.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// One past the last buffer index of the slice.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Resolution kind.
    pub fn kind(&self) -> RowIdSequenceKind {
        self.kind
    }

    /// Number of row positions in the slice.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    /// Whether the slice is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Persistent map from term hashes to row-id sequences, with an adhoc
/// recipe fallback and per-rank row accounting.
///
/// Mutators error with [`SigilError::Sealed`] after [`TermTable::seal`];
/// queries error with [`SigilError::NotSealed`] before it. A sealed table
/// is immutable and safe to share across unlimited concurrent readers.
#[derive(Debug, PartialEq)]
pub struct TermTable {
    set_row_counts_called: bool,
    sealed: bool,

    // Staging cursor for the term under construction.
    start: u32,

    term_hash_to_rows: AHashMap<TermHash, PackedRowIdSequence>,

    // Rectangular (idf, gram size) recipe lookup; row-major by idf.
    adhoc_recipes: Vec<PackedRowIdSequence>,

    row_ids: Vec<RowId>,

    explicit_row_counts: [u64; RANK_COUNT],
    adhoc_row_counts: [u64; RANK_COUNT],
    shared_row_counts: [u64; RANK_COUNT],
    fact_row_count: u64,
}

impl Default for TermTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TermTable {
    /// Create an empty, unsealed table.
    pub fn new() -> Self {
        TermTable {
            set_row_counts_called: false,
            sealed: false,
            start: 0,
            term_hash_to_rows: AHashMap::new(),
            adhoc_recipes: vec![
                PackedRowIdSequence::new(0, 0, RowIdSequenceKind::Adhoc);
                ADHOC_RECIPE_CELLS
            ],
            row_ids: Vec::new(),
            explicit_row_counts: [0; RANK_COUNT],
            adhoc_row_counts: [0; RANK_COUNT],
            shared_row_counts: [0; RANK_COUNT],
            fact_row_count: 0,
        }
    }

    /// Whether the table has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ---- construction protocol ----

    /// Begin recording a term's rows.
    pub fn open_term(&mut self) -> Result<()> {
        self.ensure_not_sealed("open_term")?;
        self.start = self.row_ids.len() as u32;
        Ok(())
    }

    /// Append a row id to the term opened by [`TermTable::open_term`].
    pub fn add_row_id(&mut self, id: RowId) -> Result<()> {
        self.ensure_not_sealed("add_row_id")?;
        self.row_ids.push(id);
        Ok(())
    }

    /// Close the current term as an explicit entry for `hash`.
    ///
    /// A second close for the same hash errors with
    /// [`SigilError::DuplicateTerm`] and discards the rows staged since
    /// [`TermTable::open_term`], leaving the table as it was before the
    /// open.
    pub fn close_term(&mut self, hash: TermHash) -> Result<()> {
        self.ensure_not_sealed("close_term")?;
        if self.term_hash_to_rows.contains_key(&hash) {
            self.row_ids.truncate(self.start as usize);
            return Err(SigilError::DuplicateTerm(hash));
        }
        let sequence = PackedRowIdSequence::new(
            self.start,
            self.row_ids.len() as u32,
            RowIdSequenceKind::Explicit,
        );
        self.term_hash_to_rows.insert(hash, sequence);
        Ok(())
    }

    /// Close the current term as the adhoc recipe for `(idf_x10, gram_size)`.
    ///
    /// The last write to a cell wins; the loader is expected to fill each
    /// cell exactly once.
    pub fn close_adhoc_term(&mut self, idf_x10: IdfX10, gram_size: GramSize) -> Result<()> {
        self.ensure_not_sealed("close_adhoc_term")?;
        let sequence = PackedRowIdSequence::new(
            self.start,
            self.row_ids.len() as u32,
            RowIdSequenceKind::Adhoc,
        );
        self.adhoc_recipes[recipe_cell(idf_x10, gram_size)] = sequence;
        Ok(())
    }

    /// Record the declared explicit and adhoc row totals for a rank.
    pub fn set_row_counts(&mut self, rank: Rank, explicit: u64, adhoc: u64) -> Result<()> {
        self.ensure_not_sealed("set_row_counts")?;
        assert!(rank <= MAX_RANK, "rank {rank} exceeds maximum {MAX_RANK}");
        self.set_row_counts_called = true;
        self.explicit_row_counts[rank as usize] = explicit;
        self.adhoc_row_counts[rank as usize] = adhoc;
        Ok(())
    }

    /// Reserve rank-0 rows for ingestion-time facts.
    pub fn set_fact_row_count(&mut self, count: u64) -> Result<()> {
        self.ensure_not_sealed("set_fact_row_count")?;
        self.fact_row_count = count;
        Ok(())
    }

    /// Freeze the table. Derives the shared row counts (rank-r row indexes
    /// referenced by more than one explicit term) and fixes the per-rank
    /// band offsets. After sealing, every mutator errors and every query
    /// becomes available.
    pub fn seal(&mut self) -> Result<()> {
        self.ensure_not_sealed("seal")?;

        let mut refcounts: AHashMap<RowId, u32> = AHashMap::new();
        for sequence in self.term_hash_to_rows.values() {
            for index in sequence.start()..sequence.end() {
                *refcounts.entry(self.row_ids[index as usize]).or_insert(0) += 1;
            }
        }
        let mut shared = [0u64; RANK_COUNT];
        for (row, count) in &refcounts {
            if *count > 1 {
                shared[row.rank() as usize] += 1;
            }
        }
        self.shared_row_counts = shared;
        self.sealed = true;

        debug!(
            "sealed term table: {} explicit terms, {} row ids, {} fact rows",
            self.term_hash_to_rows.len(),
            self.row_ids.len(),
            self.fact_row_count
        );
        Ok(())
    }

    // ---- query protocol ----

    /// The row sequence for a term: its explicit entry if one exists,
    /// otherwise the adhoc recipe for its clamped IDF bucket and gram size.
    pub fn get_rows(&self, term: &Term) -> Result<PackedRowIdSequence> {
        self.ensure_sealed("get_rows")?;
        if let Some(sequence) = self.term_hash_to_rows.get(&term.hash()) {
            return Ok(*sequence);
        }
        Ok(self.adhoc_recipes[recipe_cell(term.idf_x10(), term.gram_size())])
    }

    /// The row id at a buffer position of an explicit sequence. Callers are
    /// expected to respect the slice bounds returned by
    /// [`TermTable::get_rows`]; an out-of-range index panics.
    pub fn get_row_id_explicit(&self, index: usize) -> Result<RowId> {
        self.ensure_sealed("get_row_id_explicit")?;
        Ok(self.row_ids[index])
    }

    /// Derive the adhoc row for a term hash.
    ///
    /// `index` addresses the recipe entry (which fixes the rank); `variant`
    /// advances a probe sequence through the rank's adhoc band, so variants
    /// `0..adhoc_row_count(rank)` yield pairwise distinct rows. The
    /// derivation is pure arithmetic on the sealed counts and is part of
    /// the on-disk contract.
    pub fn get_row_id_adhoc(&self, hash: TermHash, index: usize, variant: u64) -> Result<RowId> {
        self.ensure_sealed("get_row_id_adhoc")?;
        let template = self.row_ids[index];
        let rank = template.rank();
        let adhoc_count = self.adhoc_row_counts[rank as usize];
        if adhoc_count == 0 {
            return Err(SigilError::invalid_operation(format!(
                "no adhoc rows at rank {rank}"
            )));
        }
        let offset = mix64(hash).wrapping_add(variant) % adhoc_count;
        let row_index = self.adhoc_base(rank) + offset;
        Ok(RowId::new(rank, row_index as RowIndex))
    }

    /// The rank-0 row reserved for fact number `fact`.
    pub fn get_fact_row(&self, fact: u64) -> Result<RowId> {
        self.ensure_sealed("get_fact_row")?;
        if fact >= self.fact_row_count {
            return Err(SigilError::invalid_operation(format!(
                "fact {fact} outside reserved band of {}",
                self.fact_row_count
            )));
        }
        Ok(RowId::new(0, fact as RowIndex))
    }

    /// Total rows at a rank: explicit + adhoc + shared, plus the fact band
    /// at rank 0.
    pub fn get_total_row_count(&self, rank: Rank) -> Result<u64> {
        self.ensure_sealed("get_total_row_count")?;
        assert!(rank <= MAX_RANK, "rank {rank} exceeds maximum {MAX_RANK}");
        let r = rank as usize;
        Ok(self.explicit_row_counts[r]
            + self.adhoc_row_counts[r]
            + self.shared_row_counts[r]
            + if rank == 0 { self.fact_row_count } else { 0 })
    }

    /// Signature bytes one document contributes at a rank.
    pub fn get_bytes_per_document(&self, rank: Rank) -> Result<f64> {
        let total = self.get_total_row_count(rank)?;
        Ok(total as f64 / (8.0 * (1u64 << rank) as f64))
    }

    /// Declared explicit row count at a rank.
    pub fn explicit_row_count(&self, rank: Rank) -> Result<u64> {
        self.ensure_sealed("explicit_row_count")?;
        Ok(self.explicit_row_counts[rank as usize])
    }

    /// Declared adhoc row count at a rank.
    pub fn adhoc_row_count(&self, rank: Rank) -> Result<u64> {
        self.ensure_sealed("adhoc_row_count")?;
        Ok(self.adhoc_row_counts[rank as usize])
    }

    /// Derived shared row count at a rank.
    pub fn shared_row_count(&self, rank: Rank) -> Result<u64> {
        self.ensure_sealed("shared_row_count")?;
        Ok(self.shared_row_counts[rank as usize])
    }

    /// Rank-0 rows reserved for facts.
    pub fn fact_row_count(&self) -> Result<u64> {
        self.ensure_sealed("fact_row_count")?;
        Ok(self.fact_row_count)
    }

    // ---- internals ----

    fn adhoc_base(&self, rank: Rank) -> u64 {
        let r = rank as usize;
        let facts = if rank == 0 { self.fact_row_count } else { 0 };
        facts + self.explicit_row_counts[r] + self.shared_row_counts[r]
    }

    fn ensure_sealed(&self, operation: &str) -> Result<()> {
        if !self.sealed {
            return Err(SigilError::not_sealed(operation.to_string()));
        }
        Ok(())
    }

    fn ensure_not_sealed(&self, operation: &str) -> Result<()> {
        if self.sealed {
            return Err(SigilError::sealed(operation.to_string()));
        }
        Ok(())
    }
}

fn recipe_cell(idf_x10: IdfX10, gram_size: GramSize) -> usize {
    let idf = usize::from(idf_x10.min(MAX_IDF_X10));
    let gram = usize::from(gram_size.min(MAX_GRAM_SIZE));
    idf * (MAX_GRAM_SIZE as usize + 1) + gram
}

/// Murmur3 64-bit finalizer over the hash, offset by the probe variant.
/// Changing this function invalidates serialized indexes.
fn mix64(hash: u64) -> u64 {
    let mut h = hash;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}
