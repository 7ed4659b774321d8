use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use crate::cli::Arguments;
use crate::utils::file::is_file_name_safe;

// File handling
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
pub const GZIP_EXT: &str = "gz";
pub const FASTQ_EXT: &str = "fastq";
pub const STATS_FILE_NAME: &str = "demux_Stats.json";

// Barcode handling
pub const INDEX_DELIMITER: u8 = b'+';
pub const HEADER_FIELD_DELIMITER: u8 = b':';
pub const FILE_BARCODE_DELIMITER: &str = "-";
pub const MAX_INDEX_POSITIONS: usize = 2;

// Defaults
pub const DEFAULT_UNKNOWN_LABEL: &str = "Unknown";
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;
pub const DEFAULT_UNKNOWN_TOP: usize = 10;
pub const PROGRESS_INTERVAL: u64 = 1_000_000;


/// Every failure the demultiplexer can report. The message prefix tells the operator
/// whether the configuration, the input data or the environment is at fault.
#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input data: malformed FASTQ in {stream} at record {record}: {msg}")]
    InvalidFastqFormat {
        stream: String,
        record: u64,
        msg: String,
    },

    #[error(
        "Invalid input data: input FASTQ files are not of the same length; at record {record} {exhausted} ended while {remaining} still had reads"
    )]
    StreamLengthMismatch {
        record: u64,
        exhausted: String,
        remaining: String,
    },

    #[error(
        "Invalid input data: barcode {barcode} at record {record} is ambiguous between samples {candidates} when allowing {mismatches} mismatches"
    )]
    AmbiguousBarcode {
        barcode: String,
        record: u64,
        candidates: String,
        mismatches: usize,
    },

    #[error("I/O failure: {}: {source}", path.display())]
    IOError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O failure: writer for {} stopped: {msg}", path.display())]
    SinkFailed { path: PathBuf, msg: String },
}

impl DemuxError {
    #[cold]
    pub fn io<P: AsRef<Path>>(path: P, source: std::io::Error) -> Self {
        DemuxError::IOError {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    #[cold]
    pub fn sink_failed<P: AsRef<Path>, M: Into<String>>(path: P, msg: M) -> Self {
        DemuxError::SinkFailed {
            path: path.as_ref().to_path_buf(),
            msg: msg.into(),
        }
    }
}


/// Where the observed barcodes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// Last ':'-delimited field of the R1 header.
    Header,
    /// Sequence of the I1 (and I2) reads.
    Dedicated,
}


/// Validated run settings handed to the demultiplexing pipeline.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cwd: PathBuf,
    pub out_dir: PathBuf,
    pub r1: PathBuf,
    pub r2: Option<PathBuf>,
    pub i1: Option<PathBuf>,
    pub i2: Option<PathBuf>,
    pub samplesheet: PathBuf,
    pub mismatches: usize,
    pub prefix: String,
    pub unknown_label: String,
    pub compress: bool,
    pub compression_level: u32,
    pub queue_depth: usize,
    pub unknown_top: usize,
    pub run_start: Instant,
}

impl RunConfig {
    /// Resolves and validates the parsed command line.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed CLI arguments.
    /// * `cwd` - Directory relative paths are resolved against.
    ///
    /// # Returns
    /// RunConfig, or DemuxError::InvalidConfig naming the offending option.
    pub fn from_args(args: Arguments, cwd: &Path) -> Result<Self, DemuxError> {
        if args.i2.is_some() && args.i1.is_none() {
            return Err(DemuxError::InvalidConfig(
                "--I2 requires --I1; a lone index-2 file cannot be used".to_string(),
            ));
        }
        if args.compression_level > 9 {
            return Err(DemuxError::InvalidConfig(format!(
                "--compression-level must be between 0 and 9, got {}",
                args.compression_level
            )));
        }
        if args.queue_depth == 0 {
            return Err(DemuxError::InvalidConfig(
                "--queue-depth must be at least 1".to_string(),
            ));
        }
        if !is_file_name_safe(args.unknown_barcode.trim()) {
            return Err(DemuxError::InvalidConfig(format!(
                "--unknown-barcode '{}' cannot be used in an output file name",
                args.unknown_barcode
            )));
        }

        let r1 = existing_input(cwd, &args.r1, "--R1")?;
        let r2 = args.r2.as_ref().map(|p| existing_input(cwd, p, "--R2")).transpose()?;
        let i1 = args.i1.as_ref().map(|p| existing_input(cwd, p, "--I1")).transpose()?;
        let i2 = args.i2.as_ref().map(|p| existing_input(cwd, p, "--I2")).transpose()?;
        let samplesheet = existing_input(cwd, &args.samplesheet, "--samplesheet")?;

        let out_dir = match &args.outdir {
            Some(dir) => resolve(cwd, dir),
            None => cwd.to_path_buf(),
        };

        Ok(RunConfig {
            cwd: cwd.to_path_buf(),
            out_dir,
            r1,
            r2,
            i1,
            i2,
            samplesheet,
            mismatches: args.mismatches,
            prefix: args.prefix,
            unknown_label: args.unknown_barcode,
            compress: !args.no_gzip_compression,
            compression_level: args.compression_level,
            queue_depth: args.queue_depth,
            unknown_top: args.unknown_top,
            run_start: Instant::now(),
        })
    }

    pub fn index_source(&self) -> IndexSource {
        if self.i1.is_some() {
            IndexSource::Dedicated
        } else {
            IndexSource::Header
        }
    }

    pub fn is_paired(&self) -> bool {
        self.r2.is_some()
    }

    /// Number of index positions delivered by dedicated index files, if any.
    pub fn dedicated_index_count(&self) -> Option<usize> {
        match (&self.i1, &self.i2) {
            (Some(_), Some(_)) => Some(2),
            (Some(_), None) => Some(1),
            _ => None,
        }
    }

    pub fn stats_path(&self) -> PathBuf {
        self.out_dir.join(format!("{}{}", self.prefix, STATS_FILE_NAME))
    }
}

fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn existing_input(cwd: &Path, path: &Path, flag: &str) -> Result<PathBuf, DemuxError> {
    let full = resolve(cwd, path);
    if !full.is_file() {
        return Err(DemuxError::InvalidConfig(format!(
            "Cannot find {} file {}",
            flag,
            full.display()
        )));
    }
    Ok(full)
}
