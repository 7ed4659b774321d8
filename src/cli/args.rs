use std::path::PathBuf;
use clap::Parser;
use crate::config::defs::{DEFAULT_COMPRESSION_LEVEL, DEFAULT_QUEUE_DEPTH, DEFAULT_UNKNOWN_LABEL, DEFAULT_UNKNOWN_TOP};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fastq-demux",
    version,
    about = "Demultiplex Illumina FASTQ files based on barcodes in the FASTQ headers or in index reads"
)]
pub struct Arguments {

    #[arg(long = "R1", help = "FASTQ file with R1 sequences")]
    pub r1: PathBuf,

    #[arg(long = "R2", help = "FASTQ file with R2 sequences")]
    pub r2: Option<PathBuf>,

    #[arg(long = "I1", help = "FASTQ file with index-1 (i7) reads. Overrides any barcode in the FASTQ headers")]
    pub i1: Option<PathBuf>,

    #[arg(long = "I2", help = "FASTQ file with index-2 (i5) reads. Requires --I1")]
    pub i2: Option<PathBuf>,

    #[arg(long, help = "Tab-separated sample sheet: sample_id, index1[, index2]; no header row")]
    pub samplesheet: PathBuf,

    #[arg(short = 'm', long, default_value_t = 0, help = "Mismatches allowed per index position when matching barcodes")]
    pub mismatches: usize,

    #[arg(long, default_value = "", help = "Prefix to use for naming demultiplexed FASTQ files")]
    pub prefix: String,

    #[arg(long = "unknown-barcode", default_value = DEFAULT_UNKNOWN_LABEL, help = "Label used for reads with non-matching barcodes")]
    pub unknown_barcode: String,

    #[arg(short = 'o', long, help = "Output directory for demultiplexed FASTQ files. Defaults to the current working directory")]
    pub outdir: Option<PathBuf>,

    #[arg(long = "no-gzip-compression", action, help = "Write uncompressed FASTQ output")]
    pub no_gzip_compression: bool,

    #[arg(short = 'z', long = "compression-level", default_value_t = DEFAULT_COMPRESSION_LEVEL)]
    pub compression_level: u32,

    #[arg(long = "queue-depth", default_value_t = DEFAULT_QUEUE_DEPTH, help = "Records buffered per output file before reading pauses")]
    pub queue_depth: usize,

    #[arg(long = "unknown-top", default_value_t = DEFAULT_UNKNOWN_TOP, help = "Number of unknown barcodes listed in the printed summary")]
    pub unknown_top: usize,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}
