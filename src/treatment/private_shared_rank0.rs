//! The private/shared rank-0 treatment policy.

use log::debug;

use crate::error::{Result, SigilError};
use crate::term::{self, IdfX10, Term, MAX_IDF_X10};
use crate::treatment::{Entry, RowConfiguration, Treatment, TreatmentConfig};

/// Terms get one or more rank-0 rows, private or shared depending on term
/// frequency.
///
/// A term whose frequency reaches the target row density would saturate any
/// row it shared, so it gets a single private row. Rarer terms get the
/// smallest number of shared rows whose intersection keeps the expected
/// false-positive rate below `frequency / snr`.
///
/// One configuration is precomputed per IDF bucket; [`Treatment::get_treatment`]
/// is a clamp and a table lookup and cannot fail.
#[derive(Debug, Clone)]
pub struct PrivateSharedRank0 {
    configurations: Vec<RowConfiguration>,
}

impl PrivateSharedRank0 {
    /// Build the policy for the given row `density` and signal-to-noise
    /// ratio `snr`. Errors unless `0 < density < 1` and `snr > 1`.
    pub fn new(density: f64, snr: f64) -> Result<Self> {
        if !(density > 0.0 && density < 1.0) {
            return Err(SigilError::invalid_config(format!(
                "density {density} outside (0, 1)"
            )));
        }
        if !(snr > 1.0) {
            return Err(SigilError::invalid_config(format!(
                "snr {snr} must exceed 1"
            )));
        }

        let mut configurations = Vec::with_capacity(usize::from(MAX_IDF_X10) + 1);
        for idf in 0..=MAX_IDF_X10 {
            let frequency = term::idf_x10_to_frequency(idf);
            let mut configuration = RowConfiguration::new();

            if frequency >= density {
                // Too common to share a row without saturating it.
                configuration.push(Entry::new(0, 1));
            } else {
                let k = Term::compute_row_count(frequency, density, snr);
                configuration.push(Entry::new(0, k));
            }

            configurations.push(configuration);
        }

        debug!(
            "PrivateSharedRank0: density {density}, snr {snr}, {} idf buckets",
            configurations.len()
        );

        Ok(PrivateSharedRank0 { configurations })
    }

    /// Build the policy from a [`TreatmentConfig`].
    pub fn from_config(config: &TreatmentConfig) -> Result<Self> {
        PrivateSharedRank0::new(config.density, config.snr)
    }

    /// The precomputed configuration for an IDF bucket.
    pub fn configuration_for(&self, idf_x10: IdfX10) -> &RowConfiguration {
        &self.configurations[usize::from(idf_x10.min(MAX_IDF_X10))]
    }
}

impl Treatment for PrivateSharedRank0 {
    fn get_treatment(&self, term: &Term) -> RowConfiguration {
        self.configuration_for(term.idf_x10()).clone()
    }
}
