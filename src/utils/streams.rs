// src/utils/streams.rs
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use fxhash::FxHashMap as HashMap;
use futures::future::{join_all, try_join_all};
use log::{debug, warn};
use seq_io::fastq::OwnedRecord;
use tokio::sync::{mpsc, oneshot};
use crate::config::defs::{DemuxError, RunConfig};
use crate::utils::barcode::{BarcodeIndex, Bucket};
use crate::utils::file::{output_file_path, write_fastq_record, FileWriter};


/// Read direction of an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn read_number(&self) -> u8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => 2,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.read_number())
    }
}


/// One output file: a bounded queue in front of a writer thread that owns the
/// encoder and the file handle.
///
/// Each writer lives for the whole run on a dedicated OS thread, outside tokio's
/// blocking pool, so the number of sinks is not capped by the pool size.
pub struct OutputSink {
    path: PathBuf,
    tx: mpsc::Sender<OwnedRecord>,
    done: oneshot::Receiver<Result<u64, DemuxError>>,
}

impl OutputSink {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues a record, waiting while the queue is full. Must not be called from
    /// async code.
    pub fn write(&self, record: OwnedRecord) -> Result<(), DemuxError> {
        self.tx
            .blocking_send(record)
            .map_err(|_| DemuxError::sink_failed(&self.path, "writer task ended early"))
    }

    /// Closes the queue and waits for the worker to drain it and finish the file.
    ///
    /// # Returns
    /// Number of records written.
    async fn close(self) -> Result<u64, DemuxError> {
        let OutputSink { path, tx, done } = self;
        drop(tx);
        done.await
            .map_err(|_| DemuxError::sink_failed(&path, "writer thread panicked"))?
    }
}


/// Per-sink outcome reported by `SinkManager::close_all`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReport {
    pub bucket: Bucket,
    pub direction: Direction,
    pub path: PathBuf,
    pub records: u64,
}


/// Naming and encoding settings shared by every sink of a run.
#[derive(Debug, Clone)]
struct SinkLayout {
    out_dir: PathBuf,
    prefix: String,
    unknown_label: String,
    compress: bool,
    compression_level: u32,
    queue_depth: usize,
    /// (sample id, barcode label) per sample position.
    samples: Vec<(String, String)>,
}

impl SinkLayout {
    fn path_for(&self, bucket: Bucket, direction: Direction) -> Result<PathBuf, DemuxError> {
        let (label, barcode) = match bucket {
            Bucket::Sample(i) => {
                let (id, barcode) = self.samples.get(i).ok_or_else(|| {
                    DemuxError::InvalidConfig(format!("no sample at position {}", i))
                })?;
                (id.as_str(), Some(barcode.as_str()))
            }
            Bucket::Unknown => (self.unknown_label.as_str(), None),
        };
        Ok(output_file_path(
            &self.out_dir,
            &self.prefix,
            label,
            barcode,
            direction.read_number(),
            self.compress,
        ))
    }

    fn spawn(
        &self,
        bucket: Bucket,
        direction: Direction,
        abort: &Arc<AtomicBool>,
    ) -> Result<OutputSink, DemuxError> {
        let path = self.path_for(bucket, direction)?;
        let writer = FileWriter::create(&path, self.compress, self.compression_level)?;
        debug!("Opened {} for {:?} {}", path.display(), bucket, direction);

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let (done_tx, done) = oneshot::channel();
        let worker_path = path.clone();
        let worker_abort = Arc::clone(abort);
        thread::Builder::new()
            .name(format!("sink-{}", direction))
            .spawn(move || {
                let result = sink_worker(writer, rx, worker_abort, worker_path);
                // receiver is gone only when the manager was dropped
                let _ = done_tx.send(result);
            })
            .map_err(|e| DemuxError::io(&path, e))?;
        Ok(OutputSink { path, tx, done })
    }
}

fn sink_worker(
    mut writer: FileWriter,
    mut rx: mpsc::Receiver<OwnedRecord>,
    abort: Arc<AtomicBool>,
    path: PathBuf,
) -> Result<u64, DemuxError> {
    let mut written = 0u64;
    while let Some(record) = rx.blocking_recv() {
        if abort.load(Ordering::Relaxed) {
            break;
        }
        write_fastq_record(&mut writer, &record).map_err(|e| DemuxError::io(&path, e))?;
        written += 1;
    }
    writer.finish().map_err(|e| DemuxError::io(&path, e))?;
    Ok(written)
}


/// Owns every output sink of a run, keyed by (bucket, direction).
pub struct SinkManager {
    layout: SinkLayout,
    paired: bool,
    abort: Arc<AtomicBool>,
    sinks: HashMap<(Bucket, Direction), OutputSink>,
    created: Vec<PathBuf>,
}

impl SinkManager {
    /// # Arguments
    ///
    /// * `config` - Run settings: output directory, naming, compression and queue depth.
    /// * `index` - Sample barcodes, used for file names.
    /// * `paired` - Also open reverse (R2) sinks.
    pub fn new(config: &RunConfig, index: &BarcodeIndex, paired: bool) -> Self {
        let samples = index
            .entries()
            .iter()
            .map(|e| (e.sample_id.clone(), e.barcode_label()))
            .collect();
        SinkManager {
            layout: SinkLayout {
                out_dir: config.out_dir.clone(),
                prefix: config.prefix.clone(),
                unknown_label: config.unknown_label.clone(),
                compress: config.compress,
                compression_level: config.compression_level,
                queue_depth: config.queue_depth,
                samples,
            },
            paired,
            abort: Arc::new(AtomicBool::new(false)),
            sinks: HashMap::default(),
            created: Vec::new(),
        }
    }

    fn directions(&self) -> &'static [Direction] {
        if self.paired {
            &[Direction::Forward, Direction::Reverse]
        } else {
            &[Direction::Forward]
        }
    }

    /// Opens the sinks of every sample and of the unknown bucket, so samples that get
    /// no reads still produce (empty) files.
    pub fn open_all(&mut self) -> Result<(), DemuxError> {
        let buckets: Vec<Bucket> = (0..self.layout.samples.len())
            .map(Bucket::Sample)
            .chain(std::iter::once(Bucket::Unknown))
            .collect();
        for bucket in buckets {
            for &direction in self.directions() {
                self.get_sink(bucket, direction)?;
            }
        }
        Ok(())
    }

    /// Returns the sink for (bucket, direction), creating it on first use.
    pub fn get_sink(&mut self, bucket: Bucket, direction: Direction) -> Result<&OutputSink, DemuxError> {
        match self.sinks.entry((bucket, direction)) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let sink = self.layout.spawn(bucket, direction, &self.abort)?;
                self.created.push(sink.path.clone());
                Ok(e.insert(sink))
            }
        }
    }

    pub fn write(&mut self, bucket: Bucket, direction: Direction, record: OwnedRecord) -> Result<(), DemuxError> {
        self.get_sink(bucket, direction)?.write(record)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn created_files(&self) -> &[PathBuf] {
        &self.created
    }

    /// Closes every sink after its queue has drained.
    ///
    /// # Returns
    /// One report per sink, ordered by bucket then direction. If any sink fails, every
    /// file this manager created is removed and the first failure is returned.
    pub async fn close_all(mut self) -> Result<Vec<SinkReport>, DemuxError> {
        let created = std::mem::take(&mut self.created);
        let tasks = self.sinks.drain().map(|((bucket, direction), sink)| async move {
            let path = sink.path.clone();
            let records = sink.close().await?;
            Ok::<SinkReport, DemuxError>(SinkReport {
                bucket,
                direction,
                path,
                records,
            })
        });

        match try_join_all(tasks).await {
            Ok(mut reports) => {
                reports.sort_by_key(|r| (r.bucket, r.direction));
                Ok(reports)
            }
            Err(e) => {
                remove_outputs(&created);
                Err(e)
            }
        }
    }

    /// Stops every sink without writing the records still queued, then removes every
    /// file this manager created.
    ///
    /// # Returns
    /// The first error a sink worker hit on its own, if any.
    pub async fn abort(mut self) -> Option<DemuxError> {
        self.abort.store(true, Ordering::Relaxed);
        let created = std::mem::take(&mut self.created);
        let closes = self.sinks.drain().map(|(_, sink)| sink.close());
        let first_error = join_all(closes).await.into_iter().find_map(|r| r.err());
        remove_outputs(&created);
        first_error
    }
}

pub(crate) fn remove_outputs(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}
