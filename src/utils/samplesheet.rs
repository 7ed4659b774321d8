// src/utils/samplesheet.rs
use std::fs::File;
use std::io::Read;
use std::path::Path;
use csv::{ReaderBuilder, Trim};
use log::debug;
use crate::config::defs::{DemuxError, MAX_INDEX_POSITIONS};
use crate::utils::barcode::SampleEntry;

/// Loads a tab-separated sample sheet: `sample_id<TAB>index1[<TAB>index2]`, no header row.
///
/// # Arguments
///
/// * `path` - Sample sheet file.
///
/// # Returns
/// Samples in file order, barcodes uppercased.
pub fn read_samplesheet(path: &Path) -> Result<Vec<SampleEntry>, DemuxError> {
    let file = File::open(path).map_err(|e| DemuxError::io(path, e))?;
    parse_samplesheet(file, &path.display().to_string())
}

/// Parses sample sheet content. Blank lines, '#' comments, and rows with fewer than
/// two fields or an empty field are skipped.
pub fn parse_samplesheet<R: Read>(reader: R, name: &str) -> Result<Vec<SampleEntry>, DemuxError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            DemuxError::InvalidConfig(format!("cannot read sample sheet {} at row {}: {}", name, row + 1, e))
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(row as u64 + 1);

        if record.len() < 2 || record.iter().any(|f| f.is_empty()) {
            debug!("Skipping sample sheet line {}: {:?}", line, record);
            continue;
        }
        if record.len() > MAX_INDEX_POSITIONS + 1 {
            return Err(DemuxError::InvalidConfig(format!(
                "sample sheet {} line {} has {} fields; expected sample_id, index1 and optionally index2",
                name,
                line,
                record.len()
            )));
        }

        let barcodes = record
            .iter()
            .skip(1)
            .map(|b| b.to_ascii_uppercase().into_bytes())
            .collect();
        entries.push(SampleEntry::new(&record[0], barcodes));
    }
    debug!("Read {} samples from {}", entries.len(), name);
    Ok(entries)
}
