//! Term value type and frequency arithmetic.
//!
//! A [`Term`] is an opaque token carrying a stable 64-bit hash, an
//! inverse-document-frequency bucket (IDF times 10, stored as an integer),
//! and a gram size. Terms are small `Copy` values; the hash is computed with
//! XXH3-64 so it is identical across runs and part of the on-disk contract.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::treatment::MAX_ROW_COUNT;

/// Stable 64-bit term hash.
pub type TermHash = u64;

/// Inverse document frequency times 10, as an integer bucket.
pub type IdfX10 = u8;

/// Number of words combined into an n-gram term.
pub type GramSize = u8;

/// Largest representable IDF bucket. A bucket of 60 corresponds to a term
/// frequency of 10^-6.
pub const MAX_IDF_X10: IdfX10 = 60;

/// Largest supported n-gram size.
pub const MAX_GRAM_SIZE: GramSize = 8;

/// An immutable term: a word or n-gram reduced to its hash, IDF bucket, and
/// gram size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    hash: TermHash,
    idf_x10: IdfX10,
    gram_size: GramSize,
}

impl Term {
    /// Create a term from raw components. The IDF bucket is clamped to
    /// [`MAX_IDF_X10`] and the gram size to `[1, MAX_GRAM_SIZE]`.
    pub fn new(hash: TermHash, idf_x10: IdfX10, gram_size: GramSize) -> Self {
        Term {
            hash,
            idf_x10: idf_x10.min(MAX_IDF_X10),
            gram_size: gram_size.clamp(1, MAX_GRAM_SIZE),
        }
    }

    /// Create a unigram term by hashing the UTF-8 bytes of `text`.
    pub fn from_text(text: &str, idf_x10: IdfX10) -> Self {
        Term::new(xxh3_64(text.as_bytes()), idf_x10, 1)
    }

    /// Fold another term into this one, forming an n-gram.
    ///
    /// The combined hash is order-sensitive. The rarest constituent bounds
    /// the gram's frequency from above, so the gram keeps the larger IDF.
    pub fn extend(&mut self, other: &Term) {
        self.hash = self.hash.rotate_left(1) ^ other.hash;
        self.idf_x10 = self.idf_x10.max(other.idf_x10);
        self.gram_size = (self.gram_size.saturating_add(other.gram_size)).min(MAX_GRAM_SIZE);
    }

    /// The term's stable hash.
    pub fn hash(&self) -> TermHash {
        self.hash
    }

    /// The term's IDF bucket.
    pub fn idf_x10(&self) -> IdfX10 {
        self.idf_x10
    }

    /// The term's gram size.
    pub fn gram_size(&self) -> GramSize {
        self.gram_size
    }

    /// The term's corpus frequency, derived from its IDF bucket.
    pub fn frequency(&self) -> f64 {
        idf_x10_to_frequency(self.idf_x10)
    }

    /// Number of shared rows needed so that intersecting them drives the
    /// expected false-positive rate below `frequency / snr`, given rows of
    /// the target bit `density`. Clamped to `[1, MAX_ROW_COUNT]`.
    pub fn compute_row_count(frequency: f64, density: f64, snr: f64) -> usize {
        let ratio = (frequency / snr).log10() / density.log10();
        // Guard against FP noise pushing an integral ratio over the next
        // ceiling.
        let count = if (ratio - ratio.round()).abs() < 1e-9 {
            ratio.round()
        } else {
            ratio.ceil()
        };
        (count.max(1.0) as usize).min(MAX_ROW_COUNT)
    }
}

/// Convert an IDF bucket to a term frequency: `10^(-idf/10)`.
pub fn idf_x10_to_frequency(idf_x10: IdfX10) -> f64 {
    10f64.powf(-f64::from(idf_x10) / 10.0)
}

/// Convert a term frequency to the nearest IDF bucket, clamped to
/// `[0, MAX_IDF_X10]`.
pub fn frequency_to_idf_x10(frequency: f64) -> IdfX10 {
    if frequency <= 0.0 {
        return MAX_IDF_X10;
    }
    let idf = (-10.0 * frequency.log10()).round();
    idf.clamp(0.0, f64::from(MAX_IDF_X10)) as IdfX10
}
