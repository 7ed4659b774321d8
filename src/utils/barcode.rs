// src/utils/barcode.rs: sample barcodes and mismatch-tolerant lookup
use std::fmt;
use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
use crate::config::defs::{DemuxError, INDEX_DELIMITER, MAX_INDEX_POSITIONS};
use crate::utils::file::is_file_name_safe;


/// One sample sheet row: a sample id and its one or two index barcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub sample_id: String,
    pub barcodes: Vec<Vec<u8>>,
}

impl SampleEntry {
    pub fn new<S: Into<String>>(sample_id: S, barcodes: Vec<Vec<u8>>) -> Self {
        SampleEntry {
            sample_id: sample_id.into(),
            barcodes,
        }
    }

    /// Barcodes joined with '+', the form used in headers and in Stats.json.
    pub fn barcode_label(&self) -> String {
        join_barcodes(self.barcodes.iter().map(|b| b.as_slice()))
    }
}


/// Barcode(s) read off one record tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObservedBarcode {
    Single(Vec<u8>),
    Dual(Vec<u8>, Vec<u8>),
}

impl ObservedBarcode {
    pub fn positions(&self) -> usize {
        match self {
            ObservedBarcode::Single(_) => 1,
            ObservedBarcode::Dual(_, _) => 2,
        }
    }

    pub fn position(&self, i: usize) -> Option<&[u8]> {
        match (self, i) {
            (ObservedBarcode::Single(a), 0) => Some(a),
            (ObservedBarcode::Dual(a, _), 0) => Some(a),
            (ObservedBarcode::Dual(_, b), 1) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for ObservedBarcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObservedBarcode::Single(a) => join_barcodes([a.as_slice()].into_iter()),
            ObservedBarcode::Dual(a, b) => join_barcodes([a.as_slice(), b.as_slice()].into_iter()),
        };
        write!(f, "{}", label)
    }
}

fn join_barcodes<'a, I: Iterator<Item = &'a [u8]>>(parts: I) -> String {
    let parts: Vec<String> = parts.map(|p| String::from_utf8_lossy(p).into_owned()).collect();
    parts.join(&(INDEX_DELIMITER as char).to_string())
}


/// Destination of a record tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    /// Position of the sample in the index.
    Sample(usize),
    Unknown,
}


/// Outcome of a barcode lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// `distance` is the largest per-position Hamming distance.
    Matched { sample: usize, distance: usize },
    Unknown,
    /// Sample positions of every acceptable candidate.
    Ambiguous(Vec<usize>),
}


/// Number of differing positions. Only the common prefix is compared.
pub fn hamming(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count()
}


/// Immutable barcode lookup built once from the sample sheet.
#[derive(Debug)]
pub struct BarcodeIndex {
    entries: Vec<SampleEntry>,
    mismatches: usize,
    lengths: Vec<usize>,
    exact: HashMap<Vec<u8>, usize>,
}

impl BarcodeIndex {
    /// Validates the samples and builds the lookup.
    ///
    /// Fails with InvalidConfig when the list is empty, a sample id repeats, index counts
    /// or lengths disagree, or two samples are within `2 * mismatches` at every index
    /// position (a read could then match both).
    ///
    /// # Arguments
    ///
    /// * `entries` - Samples in sample sheet order.
    /// * `mismatches` - Budget applied to each index position separately.
    ///
    /// # Returns
    /// BarcodeIndex ready for lookups.
    pub fn build(entries: Vec<SampleEntry>, mismatches: usize) -> Result<Self, DemuxError> {
        let first = entries
            .first()
            .ok_or_else(|| DemuxError::InvalidConfig("sample sheet contains no samples".to_string()))?;

        let positions = first.barcodes.len();
        if positions == 0 || positions > MAX_INDEX_POSITIONS {
            return Err(DemuxError::InvalidConfig(format!(
                "sample {} has {} index barcodes; expected 1 or 2",
                first.sample_id, positions
            )));
        }
        let lengths: Vec<usize> = first.barcodes.iter().map(|b| b.len()).collect();

        let mut seen_ids = HashSet::default();
        for entry in &entries {
            if !is_file_name_safe(&entry.sample_id) {
                return Err(DemuxError::InvalidConfig(format!(
                    "sample id '{}' cannot be used in an output file name",
                    entry.sample_id
                )));
            }
            if !seen_ids.insert(entry.sample_id.as_str()) {
                return Err(DemuxError::InvalidConfig(format!(
                    "sample id {} appears more than once in the sample sheet",
                    entry.sample_id
                )));
            }
            if entry.barcodes.len() != positions {
                return Err(DemuxError::InvalidConfig(format!(
                    "sample {} has {} index barcodes but sample {} has {}; all samples must use the same number of indexes",
                    entry.sample_id,
                    entry.barcodes.len(),
                    first.sample_id,
                    positions
                )));
            }
            for (pos, (barcode, &len)) in entry.barcodes.iter().zip(lengths.iter()).enumerate() {
                if barcode.is_empty() || barcode.len() != len {
                    return Err(DemuxError::InvalidConfig(format!(
                        "sample {} has index {} of length {} but expected length {}",
                        entry.sample_id,
                        pos + 1,
                        barcode.len(),
                        len
                    )));
                }
            }
        }

        let limit = 2 * mismatches;
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                let collides = a
                    .barcodes
                    .iter()
                    .zip(b.barcodes.iter())
                    .all(|(x, y)| hamming(x, y) <= limit);
                if collides {
                    return Err(DemuxError::InvalidConfig(format!(
                        "samples {} ({}) and {} ({}) are within {} mismatches of each other at every index position, so reads cannot be assigned unambiguously when allowing {} mismatches",
                        a.sample_id,
                        a.barcode_label(),
                        b.sample_id,
                        b.barcode_label(),
                        limit,
                        mismatches
                    )));
                }
            }
        }

        let exact = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (exact_key(e.barcodes.iter().map(|b| b.as_slice())), i))
            .collect();

        Ok(BarcodeIndex {
            entries,
            mismatches,
            lengths,
            exact,
        })
    }

    /// Skips every check in build(). Lets tests reach lookup states build() forbids.
    #[cfg(test)]
    pub(crate) fn unchecked(entries: Vec<SampleEntry>, mismatches: usize) -> Self {
        let lengths: Vec<usize> = entries.first().map(|e| e.barcodes.iter().map(|b| b.len()).collect()).unwrap_or_default();
        BarcodeIndex {
            entries,
            mismatches,
            lengths,
            exact: HashMap::default(),
        }
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn sample(&self, i: usize) -> &SampleEntry {
        &self.entries[i]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mismatches(&self) -> usize {
        self.mismatches
    }

    /// Number of index positions: 1 for single-index, 2 for dual-index.
    pub fn index_count(&self) -> usize {
        self.lengths.len()
    }

    pub fn index_lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Resolves an observed barcode.
    ///
    /// Observed barcodes longer than the index length are cut to that length; shorter ones
    /// cannot match and resolve to Unknown, as does a barcode with the wrong number of
    /// positions.
    pub fn lookup(&self, observed: &ObservedBarcode) -> MatchResult {
        if observed.positions() != self.index_count() {
            return MatchResult::Unknown;
        }
        let empty: &[u8] = &[];
        let mut trimmed = [empty; MAX_INDEX_POSITIONS];
        for (pos, &len) in self.lengths.iter().enumerate() {
            match observed.position(pos) {
                Some(seq) if seq.len() >= len => trimmed[pos] = &seq[..len],
                _ => return MatchResult::Unknown,
            }
        }
        let trimmed = &trimmed[..self.index_count()];

        if let Some(&sample) = self.exact.get(&exact_key(trimmed.iter().copied())) {
            return MatchResult::Matched { sample, distance: 0 };
        }
        if self.mismatches == 0 {
            return MatchResult::Unknown;
        }

        let mut candidates: Vec<(usize, usize)> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            let mut worst = 0;
            let mut acceptable = true;
            for (seq, barcode) in trimmed.iter().zip(entry.barcodes.iter()) {
                let d = hamming(seq, barcode);
                if d > self.mismatches {
                    acceptable = false;
                    break;
                }
                worst = worst.max(d);
            }
            if acceptable {
                candidates.push((i, worst));
            }
        }

        match candidates.len() {
            0 => MatchResult::Unknown,
            1 => {
                let (sample, distance) = candidates[0];
                MatchResult::Matched { sample, distance }
            }
            _ => MatchResult::Ambiguous(candidates.into_iter().map(|(i, _)| i).collect()),
        }
    }
}

fn exact_key<'a, I: Iterator<Item = &'a [u8]>>(parts: I) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    for (i, part) in parts.enumerate() {
        if i > 0 {
            key.push(INDEX_DELIMITER);
        }
        key.extend_from_slice(part);
    }
    key
}
