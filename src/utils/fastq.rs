use std::fmt;
use std::path::{Path, PathBuf};
use seq_io::fastq::{Error as FastqError, Reader};
pub use seq_io::fastq::{OwnedRecord, Record};
use crate::config::defs::DemuxError;
use crate::utils::file::{open_input, FileReader};

/// The four kinds of input stream a run can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    R1,
    R2,
    I1,
    I2,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamKind::R1 => "R1",
            StreamKind::R2 => "R2",
            StreamKind::I1 => "I1",
            StreamKind::I2 => "I2",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct StreamSpec {
    pub kind: StreamKind,
    pub path: PathBuf,
}

impl StreamSpec {
    pub fn new<P: Into<PathBuf>>(kind: StreamKind, path: P) -> Self {
        StreamSpec { kind, path: path.into() }
    }
}


/// One read or read-pair, with its index reads, sharing one ordinal across all streams.
#[derive(Debug, Clone)]
pub struct RecordTuple {
    /// 1-based position in the input.
    pub ordinal: u64,
    pub r1: OwnedRecord,
    pub r2: Option<OwnedRecord>,
    pub i1: Option<OwnedRecord>,
    pub i2: Option<OwnedRecord>,
}


/// Opens a FASTQ file, gzipped or not.
pub fn fastq_reader(path: &Path) -> Result<Reader<FileReader>, DemuxError> {
    Ok(Reader::new(open_input(path)?))
}


struct InputStream {
    kind: StreamKind,
    path: PathBuf,
    reader: Reader<FileReader>,
}

/// Reads the configured streams in lock step and yields one RecordTuple per step.
///
/// The iterator is finite and fused: after the end of input, or after the first
/// error, it only returns None.
pub struct RecordSource {
    streams: Vec<InputStream>,
    ordinal: u64,
    finished: bool,
}

impl RecordSource {
    /// Opens every stream. R1 is mandatory; the others are taken in the order given.
    ///
    /// # Arguments
    ///
    /// * `specs` - One StreamSpec per input file, each kind at most once.
    ///
    /// # Returns
    /// RecordSource positioned before the first record.
    pub fn open(specs: &[StreamSpec]) -> Result<Self, DemuxError> {
        if !specs.iter().any(|s| s.kind == StreamKind::R1) {
            return Err(DemuxError::InvalidConfig("an R1 FASTQ file is required".to_string()));
        }
        let mut streams: Vec<InputStream> = Vec::with_capacity(specs.len());
        for input in specs {
            if streams.iter().any(|s| s.kind == input.kind) {
                return Err(DemuxError::InvalidConfig(format!(
                    "{} FASTQ file given more than once",
                    input.kind
                )));
            }
            streams.push(InputStream {
                kind: input.kind,
                path: input.path.clone(),
                reader: fastq_reader(&input.path)?,
            });
        }
        Ok(RecordSource {
            streams,
            ordinal: 0,
            finished: false,
        })
    }

    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.streams.iter().any(|s| s.kind == kind)
    }

    /// Number of tuples produced so far.
    pub fn records_read(&self) -> u64 {
        self.ordinal
    }

    fn read_step(&mut self) -> Option<Result<RecordTuple, DemuxError>> {
        let record_no = self.ordinal + 1;
        let mut tuple_parts: Vec<(StreamKind, OwnedRecord)> = Vec::with_capacity(self.streams.len());
        let mut exhausted: Vec<StreamKind> = Vec::new();

        for stream in self.streams.iter_mut() {
            match stream.reader.next() {
                Some(Ok(record)) => tuple_parts.push((stream.kind, record.to_owned_record())),
                Some(Err(e)) => return Some(Err(fastq_error(stream.kind, &stream.path, record_no, e))),
                None => exhausted.push(stream.kind),
            }
        }

        if exhausted.len() == self.streams.len() {
            return None;
        }
        if !exhausted.is_empty() {
            return Some(Err(DemuxError::StreamLengthMismatch {
                record: record_no,
                exhausted: join_kinds(exhausted.iter().copied()),
                remaining: join_kinds(tuple_parts.iter().map(|(k, _)| *k)),
            }));
        }

        let (mut r1, mut r2, mut i1, mut i2) = (None, None, None, None);
        for (kind, record) in tuple_parts {
            match kind {
                StreamKind::R1 => r1 = Some(record),
                StreamKind::R2 => r2 = Some(record),
                StreamKind::I1 => i1 = Some(record),
                StreamKind::I2 => i2 = Some(record),
            }
        }
        self.ordinal = record_no;
        // open() guarantees an R1 stream
        Some(Ok(RecordTuple {
            ordinal: record_no,
            r1: r1?,
            r2,
            i1,
            i2,
        }))
    }
}

impl Iterator for RecordSource {
    type Item = Result<RecordTuple, DemuxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let step = self.read_step();
        if !matches!(step, Some(Ok(_))) {
            self.finished = true;
        }
        step
    }
}

fn join_kinds<I: Iterator<Item = StreamKind>>(kinds: I) -> String {
    kinds.map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

fn fastq_error(kind: StreamKind, path: &Path, record: u64, error: FastqError) -> DemuxError {
    match error {
        FastqError::Io(e) => DemuxError::io(path, e),
        other => DemuxError::InvalidFastqFormat {
            stream: format!("{} ({})", kind, path.display()),
            record,
            msg: other.to_string(),
        },
    }
}
