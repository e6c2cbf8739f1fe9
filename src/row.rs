//! Row addressing: ranks, row identifiers, and plan-tree row leaves.
//!
//! A rank-r row devotes one bit to every `2^r` documents, so rank 0 rows
//! address single documents and higher ranks are coarser unions. A [`RowId`]
//! names one signature row as a (rank, index) pair.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SigilError};

/// Row resolution level. Each bit of a rank-r row covers `2^r` documents.
pub type Rank = u8;

/// Index of a row within its rank.
pub type RowIndex = u32;

/// Largest supported rank.
pub const MAX_RANK: Rank = 6;

/// Number of distinct ranks.
pub const RANK_COUNT: usize = MAX_RANK as usize + 1;

/// Address of one signature row: a rank and an index within that rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId {
    rank: Rank,
    index: RowIndex,
}

impl RowId {
    /// Create a row id. The rank must not exceed [`MAX_RANK`].
    pub fn new(rank: Rank, index: RowIndex) -> Self {
        assert!(rank <= MAX_RANK, "rank {rank} exceeds maximum {MAX_RANK}");
        RowId { rank, index }
    }

    /// The row's rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The row's index within its rank.
    pub fn index(&self) -> RowIndex {
        self.index
    }

    /// Pack into a u64 for serialization: rank in bits 32..40, index in
    /// bits 0..32.
    pub fn pack(&self) -> u64 {
        (u64::from(self.rank) << 32) | u64::from(self.index)
    }

    /// Unpack a serialized row id, validating the rank and padding bits.
    pub fn unpack(packed: u64) -> Result<Self> {
        if packed >> 40 != 0 {
            return Err(SigilError::corrupt(format!(
                "row id has non-zero padding bits: {packed:#x}"
            )));
        }
        let rank = (packed >> 32) as Rank;
        if rank > MAX_RANK {
            return Err(SigilError::corrupt(format!(
                "row id rank {rank} exceeds maximum {MAX_RANK}"
            )));
        }
        Ok(RowId {
            rank,
            index: packed as RowIndex,
        })
    }
}

/// A plan-tree row leaf: a row id plus an inversion flag that flips the
/// semantic bit at scan time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbstractRow {
    row: RowId,
    inverted: bool,
}

impl AbstractRow {
    /// Create a row leaf.
    pub fn new(row: RowId, inverted: bool) -> Self {
        AbstractRow { row, inverted }
    }

    /// The underlying row id.
    pub fn row_id(&self) -> RowId {
        self.row
    }

    /// Whether the row's bits are inverted at scan time.
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// The same row with the inversion flag flipped.
    pub fn inverted(&self) -> AbstractRow {
        AbstractRow {
            row: self.row,
            inverted: !self.inverted,
        }
    }
}
