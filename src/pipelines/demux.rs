// src/pipelines/demux.rs
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{debug, info};
use tokio::task;
use crate::config::defs::{DemuxError, RunConfig, PROGRESS_INTERVAL};
use crate::utils::barcode::BarcodeIndex;
use crate::utils::extract::BarcodeExtractor;
use crate::utils::fastq::{RecordSource, RecordTuple, StreamKind, StreamSpec};
use crate::utils::router::Router;
use crate::utils::samplesheet::read_samplesheet;
use crate::utils::stats::{RunStats, StatsCollector};
use crate::utils::streams::{remove_outputs, Direction, SinkManager, SinkReport};


/// Result of a completed run.
#[derive(Debug)]
pub struct DemuxOutcome {
    pub stats: RunStats,
    pub sinks: Vec<SinkReport>,
    pub stats_path: PathBuf,
}


/// Demultiplexes the configured inputs into per-sample FASTQ files.
///
/// Reading, routing and counting run on one blocking task; every output file is
/// written by its own worker behind a bounded queue. Any fatal error stops the
/// run and removes every output file created so far.
///
/// # Arguments
///
/// * `config` - Validated run settings.
///
/// # Returns
/// DemuxOutcome with the final counts, one report per output file and the Stats.json path.
pub async fn run(config: Arc<RunConfig>) -> Result<DemuxOutcome, DemuxError> {
    fs::create_dir_all(&config.out_dir).map_err(|e| DemuxError::io(&config.out_dir, e))?;

    let entries = read_samplesheet(&config.samplesheet)?;
    let index = Arc::new(BarcodeIndex::build(entries, config.mismatches)?);
    info!(
        "Loaded {} samples ({}-index, barcode lengths {:?}) allowing {} mismatches",
        index.len(),
        if index.index_count() == 2 { "dual" } else { "single" },
        index.index_lengths(),
        index.mismatches()
    );

    if let Some(streams) = config.dedicated_index_count() {
        if streams != index.index_count() {
            return Err(DemuxError::InvalidConfig(format!(
                "sample sheet has {} index barcode(s) per sample but {} index FASTQ file(s) were given",
                index.index_count(),
                streams
            )));
        }
    }

    let extractor = BarcodeExtractor::new(config.index_source(), index.index_count());
    debug!("Reading barcodes from {:?}", extractor.source());
    let router = Router::new(Arc::clone(&index), extractor);
    let source = RecordSource::open(&stream_specs(&config))?;

    let mut sinks = SinkManager::new(&config, &index, config.is_paired());
    if let Err(e) = sinks.open_all() {
        sinks.abort().await;
        return Err(e);
    }
    info!("Writing {} output files to {}", sinks.sink_count(), config.out_dir.display());

    let mut stats = StatsCollector::new(&index);
    let out_dir = config.out_dir.clone();
    let producer = task::spawn_blocking(move || {
        // the sinks must come back even on a panic so their files can be removed
        let result = contain_panic(&out_dir, || demultiplex(source, &router, &mut sinks, &mut stats));
        (sinks, stats, result)
    });
    let (sinks, stats, result) = producer
        .await
        .map_err(|e| DemuxError::sink_failed(&config.out_dir, format!("demultiplexing task failed: {}", e)))?;

    let tuples = match result {
        Ok(n) => n,
        Err(e) => {
            let worker_error = sinks.abort().await;
            // a closed queue only means a writer stopped; report why it stopped
            return Err(match (e, worker_error) {
                (DemuxError::SinkFailed { .. }, Some(cause)) => cause,
                (e, _) => e,
            });
        }
    };

    let reports = sinks.close_all().await?;
    let stats = stats.snapshot();
    let stats_path = config.stats_path();
    if let Err(e) = stats.write_stats_json(&stats_path) {
        let written: Vec<PathBuf> = reports.iter().map(|r| r.path.clone()).collect();
        remove_outputs(&written);
        return Err(e);
    }

    info!(
        "Demultiplexed {} reads: {} assigned to samples, {} unknown in {} milliseconds",
        tuples,
        stats.total() - stats.unknown,
        stats.unknown,
        config.run_start.elapsed().as_millis()
    );
    info!("Wrote {}", stats_path.display());

    Ok(DemuxOutcome {
        stats,
        sinks: reports,
        stats_path,
    })
}


fn stream_specs(config: &RunConfig) -> Vec<StreamSpec> {
    let mut specs = vec![StreamSpec::new(StreamKind::R1, &config.r1)];
    let optional = [
        (StreamKind::R2, &config.r2),
        (StreamKind::I1, &config.i1),
        (StreamKind::I2, &config.i2),
    ];
    for (kind, path) in optional {
        if let Some(path) = path {
            specs.push(StreamSpec::new(kind, path));
        }
    }
    specs
}


/// Producer loop: reads tuples in input order, routes them, counts them and hands the
/// reads to their sinks. Stops at the first error.
///
/// # Returns
/// Number of tuples processed.
fn demultiplex(
    source: RecordSource,
    router: &Router,
    sinks: &mut SinkManager,
    stats: &mut StatsCollector,
) -> Result<u64, DemuxError> {
    let mut processed = 0u64;
    for tuple in source {
        let tuple = tuple?;
        let routed = router.route(&tuple)?;
        stats.record(&routed);

        let RecordTuple { ordinal, r1, r2, .. } = tuple;
        sinks.write(routed.bucket, Direction::Forward, r1)?;
        if let Some(r2) = r2 {
            sinks.write(routed.bucket, Direction::Reverse, r2)?;
        }

        processed = ordinal;
        if processed % PROGRESS_INTERVAL == 0 {
            info!("Processed {} reads", processed);
        }
    }
    Ok(processed)
}


/// Runs the producer loop, turning a panic into an error so the caller can still
/// abort the sinks.
fn contain_panic<F>(out_dir: &Path, producer: F) -> Result<u64, DemuxError>
where
    F: FnOnce() -> Result<u64, DemuxError>,
{
    match panic::catch_unwind(AssertUnwindSafe(producer)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(DemuxError::sink_failed(
                out_dir,
                format!("demultiplexing stopped unexpectedly: {}", msg),
            ))
        }
    }
}


/// Prints the known and unknown barcode tables to stdout as `barcode\tcount\tpercent`.
pub fn print_summary(stats: &RunStats, unknown_top: usize) {
    println!("known_barcode\tcount\tpercent");
    for row in stats.known_summary() {
        println!("{}\t{}\t{:.1}%", row.barcode, row.count, row.percent);
    }
    println!("unknown_barcode\tcount\tpercent");
    for row in stats.unknown_summary(unknown_top) {
        println!("{}\t{}\t{:.1}%", row.barcode, row.count, row.percent);
    }
}
