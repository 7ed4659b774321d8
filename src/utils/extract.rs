use crate::config::defs::{DemuxError, IndexSource, HEADER_FIELD_DELIMITER, INDEX_DELIMITER};
use crate::utils::barcode::ObservedBarcode;
use crate::utils::fastq::RecordTuple;

/// Pulls the observed barcode(s) out of a record tuple. The mode is fixed for the run
/// and no state is kept between calls.
///
/// Barcodes are uppercased, the same as sample sheet barcodes, so soft-masked or
/// lowercase index sequences still match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarcodeExtractor {
    source: IndexSource,
    dual: bool,
}

impl BarcodeExtractor {
    /// # Arguments
    ///
    /// * `source` - Header field or dedicated index reads.
    /// * `index_count` - 1 for single-index, 2 for dual-index runs.
    pub fn new(source: IndexSource, index_count: usize) -> Self {
        BarcodeExtractor {
            source,
            dual: index_count > 1,
        }
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    pub fn extract(&self, tuple: &RecordTuple) -> Result<ObservedBarcode, DemuxError> {
        match self.source {
            IndexSource::Header => self.from_header(tuple),
            IndexSource::Dedicated => self.from_index_reads(tuple),
        }
    }

    /// bcl2fastq headers end with a ':'-delimited field holding the barcode,
    /// e.g. `@M01:1:FC:1:1101:100:200 1:N:0:ACGTACGT+TTGGCCAA`.
    fn from_header(&self, tuple: &RecordTuple) -> Result<ObservedBarcode, DemuxError> {
        let head = &tuple.r1.head;
        let malformed = |msg: &str| DemuxError::InvalidFastqFormat {
            stream: "R1".to_string(),
            record: tuple.ordinal,
            msg: format!("{} in header '{}'", msg, String::from_utf8_lossy(head)),
        };

        let start = head
            .iter()
            .rposition(|&b| b == HEADER_FIELD_DELIMITER)
            .ok_or_else(|| malformed("no ':'-delimited barcode field"))?;
        let field = head[start + 1..].trim_ascii();
        if field.is_empty() {
            return Err(malformed("empty barcode field"));
        }

        let mut parts = field.split(|&b| b == INDEX_DELIMITER);
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(malformed("more than two barcodes"));
        }
        match (self.dual, second) {
            (false, None) => Ok(ObservedBarcode::Single(first.to_ascii_uppercase())),
            (true, Some(second)) if !first.is_empty() && !second.is_empty() => Ok(ObservedBarcode::Dual(
                first.to_ascii_uppercase(),
                second.to_ascii_uppercase(),
            )),
            (true, _) => Err(malformed("expected a '+'-delimited dual-index barcode")),
            (false, Some(_)) => Err(malformed("expected a single-index barcode but found two")),
        }
    }

    fn from_index_reads(&self, tuple: &RecordTuple) -> Result<ObservedBarcode, DemuxError> {
        let i1 = tuple.i1.as_ref().ok_or_else(|| {
            DemuxError::InvalidConfig("barcodes taken from index reads but no I1 file was given".to_string())
        })?;
        if !self.dual {
            return Ok(ObservedBarcode::Single(i1.seq.to_ascii_uppercase()));
        }
        let i2 = tuple.i2.as_ref().ok_or_else(|| {
            DemuxError::InvalidConfig("dual-index sample sheet but no I2 file was given".to_string())
        })?;
        Ok(ObservedBarcode::Dual(i1.seq.to_ascii_uppercase(), i2.seq.to_ascii_uppercase()))
    }
}
