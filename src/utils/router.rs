// src/utils/router.rs
use std::sync::Arc;
use crate::config::defs::DemuxError;
use crate::utils::barcode::{BarcodeIndex, Bucket, MatchResult, ObservedBarcode};
use crate::utils::extract::BarcodeExtractor;
use crate::utils::fastq::RecordTuple;

/// Routing decision for one record tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub bucket: Bucket,
    pub barcode: ObservedBarcode,
    /// Largest per-position mismatch count for matched tuples; 0 for Unknown.
    pub distance: usize,
}

/// Combines extraction and lookup. Holds no per-record state, so the same router can
/// be shared by any number of producers.
#[derive(Debug, Clone)]
pub struct Router {
    index: Arc<BarcodeIndex>,
    extractor: BarcodeExtractor,
}

impl Router {
    pub fn new(index: Arc<BarcodeIndex>, extractor: BarcodeExtractor) -> Self {
        Router { index, extractor }
    }

    pub fn index(&self) -> &BarcodeIndex {
        &self.index
    }

    /// # Arguments
    ///
    /// * `tuple` - Record tuple read from the inputs.
    ///
    /// # Returns
    /// Routed, or an error for a malformed barcode field or an ambiguous barcode.
    pub fn route(&self, tuple: &RecordTuple) -> Result<Routed, DemuxError> {
        let barcode = self.extractor.extract(tuple)?;
        match self.index.lookup(&barcode) {
            MatchResult::Matched { sample, distance } => Ok(Routed {
                bucket: Bucket::Sample(sample),
                barcode,
                distance,
            }),
            MatchResult::Unknown => Ok(Routed {
                bucket: Bucket::Unknown,
                barcode,
                distance: 0,
            }),
            MatchResult::Ambiguous(candidates) => {
                let names: Vec<&str> = candidates
                    .iter()
                    .map(|&i| self.index.sample(i).sample_id.as_str())
                    .collect();
                Err(DemuxError::AmbiguousBarcode {
                    barcode: barcode.to_string(),
                    record: tuple.ordinal,
                    candidates: names.join(", "),
                    mismatches: self.index.mismatches(),
                })
            }
        }
    }
}
