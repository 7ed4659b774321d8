use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use seq_io::fastq::OwnedRecord;
use crate::config::defs::{DemuxError, FASTQ_EXT, FILE_BARCODE_DELIMITER, GZIP_EXT, GZIP_MAGIC};

const IO_BUFFER_SIZE: usize = 1 << 16;

/// Checks the first two bytes for the gzip magic number.
/// Files shorter than two bytes are treated as uncompressed.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(buffer == GZIP_MAGIC)
}


/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<BufReader<File>>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

/// Opens an input file, picking the decoder from the file content rather than the extension.
/// Multi-member gzip (bgzip) is read to the end.
pub fn open_input(path: &Path) -> Result<FileReader, DemuxError> {
    let gzipped = is_gzipped(path).map_err(|e| DemuxError::io(path, e))?;
    let file = File::open(path).map_err(|e| DemuxError::io(path, e))?;
    let reader = BufReader::with_capacity(IO_BUFFER_SIZE, file);
    Ok(if gzipped {
        FileReader::Gzipped(MultiGzDecoder::new(reader))
    } else {
        FileReader::Uncompressed(reader)
    })
}


/// Enum to hold either an uncompressed or gzipped file writer
pub enum FileWriter {
    Uncompressed(BufWriter<File>),
    Gzipped(GzEncoder<BufWriter<File>>),
}

impl FileWriter {
    /// Creates (truncating) the output file.
    ///
    /// # Arguments
    ///
    /// * `path` - Destination file.
    /// * `compress` - Wrap the file in a gzip encoder.
    /// * `level` - gzip level, 0-9.
    ///
    /// # Returns
    /// FileWriter, or DemuxError::IOError carrying the path.
    pub fn create(path: &Path, compress: bool, level: u32) -> Result<Self, DemuxError> {
        let file = File::create(path).map_err(|e| DemuxError::io(path, e))?;
        let writer = BufWriter::with_capacity(IO_BUFFER_SIZE, file);
        Ok(if compress {
            FileWriter::Gzipped(GzEncoder::new(writer, Compression::new(level)))
        } else {
            FileWriter::Uncompressed(writer)
        })
    }

    /// Writes the gzip trailer, if any, and flushes everything to disk.
    pub fn finish(self) -> io::Result<()> {
        let mut inner = match self {
            FileWriter::Uncompressed(w) => w,
            FileWriter::Gzipped(w) => w.finish()?,
        };
        inner.flush()?;
        inner.get_ref().sync_all()
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::Uncompressed(w) => w.write(buf),
            FileWriter::Gzipped(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Uncompressed(w) => w.flush(),
            FileWriter::Gzipped(w) => w.flush(),
        }
    }
}


/// Writes a record as four '\n'-terminated lines. Header, sequence and quality bytes
/// are copied verbatim; the separator line is always a bare '+'.
pub fn write_fastq_record<W: Write>(writer: &mut W, record: &OwnedRecord) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(&record.head)?;
    writer.write_all(b"\n")?;
    writer.write_all(&record.seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(&record.qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}


/// True when `label` can be used as part of an output file name without leaving the
/// output directory.
pub fn is_file_name_safe(label: &str) -> bool {
    !label.is_empty()
        && label != "."
        && label != ".."
        && !label.contains(['/', '\\', '\0'])
}


/// Builds the output path for one bucket and read number:
/// `{out_dir}/{prefix}{label}[_{barcode}]_R{read_number}.fastq[.gz]`.
/// '+' between dual-index barcodes becomes '-' so the name stays shell friendly.
///
/// # Arguments
///
/// * `out_dir` - Output directory.
/// * `prefix` - Run prefix, may be empty.
/// * `label` - Sample id, or the unknown label.
/// * `barcode` - Sample barcode label; None for the unknown bucket.
/// * `read_number` - 1 for forward, 2 for reverse.
/// * `compress` - Append the gzip extension.
pub fn output_file_path(
    out_dir: &Path,
    prefix: &str,
    label: &str,
    barcode: Option<&str>,
    read_number: u8,
    compress: bool,
) -> PathBuf {
    let mut name = format!("{}{}", prefix, label);
    if let Some(barcode) = barcode {
        name.push('_');
        name.push_str(&barcode.replace('+', FILE_BARCODE_DELIMITER));
    }
    name.push_str(&format!("_R{}.{}", read_number, FASTQ_EXT));
    if compress {
        name.push('.');
        name.push_str(GZIP_EXT);
    }
    out_dir.join(name)
}
