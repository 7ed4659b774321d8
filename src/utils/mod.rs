pub mod barcode;
pub mod extract;
pub mod fastq;
pub mod file;
pub mod router;
pub mod samplesheet;
pub mod stats;
pub mod streams;
