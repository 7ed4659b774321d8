/// Per-run demultiplexing counts and the bcl2fastq-style Stats.json summary
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use fxhash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};
use crate::config::defs::DemuxError;
use crate::utils::barcode::{BarcodeIndex, Bucket};
use crate::utils::router::Routed;


/// Accumulates counts as tuples are routed. Counting is additive only.
#[derive(Debug)]
pub struct StatsCollector {
    samples: Vec<SampleCounts>,
    unknown: u64,
    unknown_barcodes: HashMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SampleCounts {
    sample_id: String,
    barcode: String,
    reads: u64,
    /// Index is the match distance, 0..=mismatches.
    mismatch_counts: Vec<u64>,
}

impl StatsCollector {
    /// Seeds a zero count for every sample in the index so that empty samples
    /// still show up in the summary.
    pub fn new(index: &BarcodeIndex) -> Self {
        let samples = index
            .entries()
            .iter()
            .map(|e| SampleCounts {
                sample_id: e.sample_id.clone(),
                barcode: e.barcode_label(),
                reads: 0,
                mismatch_counts: vec![0; index.mismatches() + 1],
            })
            .collect();
        StatsCollector {
            samples,
            unknown: 0,
            unknown_barcodes: HashMap::default(),
        }
    }

    /// Counts one routed tuple.
    pub fn record(&mut self, routed: &Routed) {
        match routed.bucket {
            Bucket::Sample(i) => {
                let sample = &mut self.samples[i];
                sample.reads += 1;
                if let Some(slot) = sample.mismatch_counts.get_mut(routed.distance) {
                    *slot += 1;
                }
            }
            Bucket::Unknown => {
                self.unknown += 1;
                *self.unknown_barcodes.entry(routed.barcode.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn snapshot(&self) -> RunStats {
        RunStats {
            samples: self
                .samples
                .iter()
                .map(|s| SampleStats {
                    sample_id: s.sample_id.clone(),
                    barcode: s.barcode.clone(),
                    reads: s.reads,
                    mismatch_counts: s.mismatch_counts.clone(),
                })
                .collect(),
            unknown: self.unknown,
            unknown_barcodes: self.unknown_barcodes.iter().map(|(k, v)| (k.clone(), *v)).collect(),
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleStats {
    pub sample_id: String,
    pub barcode: String,
    pub reads: u64,
    pub mismatch_counts: Vec<u64>,
}

/// Point-in-time copy of the counts. Samples keep sample sheet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub samples: Vec<SampleStats>,
    pub unknown: u64,
    pub unknown_barcodes: BTreeMap<String, u64>,
}

/// One `barcode count percent` line of the printed summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub barcode: String,
    pub count: u64,
    /// Share of the table's total, rounded to one decimal.
    pub percent: f64,
}

impl RunStats {
    /// Every tuple lands in exactly one bucket, so this is the number of tuples read.
    pub fn total(&self) -> u64 {
        self.samples.iter().map(|s| s.reads).sum::<u64>() + self.unknown
    }

    pub fn sample_reads(&self, sample_id: &str) -> Option<u64> {
        self.samples.iter().find(|s| s.sample_id == sample_id).map(|s| s.reads)
    }

    /// Sample barcodes by descending count, ties in sample sheet order. Percentages
    /// are shares of the reads assigned to samples.
    pub fn known_summary(&self) -> Vec<SummaryRow> {
        let known = self.total() - self.unknown;
        let mut rows: Vec<SummaryRow> = self
            .samples
            .iter()
            .map(|s| summary_row(&s.barcode, s.reads, known))
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        rows
    }

    /// The `top_n` most frequent unknown barcodes, ties broken alphabetically.
    /// Percentages are shares of the unknown reads.
    pub fn unknown_summary(&self, top_n: usize) -> Vec<SummaryRow> {
        let mut counts: Vec<(&String, &u64)> = self.unknown_barcodes.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));
        counts
            .into_iter()
            .take(top_n)
            .map(|(barcode, &count)| summary_row(barcode, count, self.unknown))
            .collect()
    }

    pub fn to_stats_json(&self) -> StatsJson {
        let demux_results = self
            .samples
            .iter()
            .map(|s| DemuxResult {
                sample_id: s.sample_id.clone(),
                number_reads: s.reads,
                index_metrics: vec![IndexMetric {
                    index_sequence: s.barcode.clone(),
                    mismatch_counts: s
                        .mismatch_counts
                        .iter()
                        .enumerate()
                        .map(|(d, &n)| (d, n))
                        .collect(),
                }],
            })
            .collect();
        StatsJson {
            conversion_results: ConversionResults {
                demux_results,
                undetermined: Undetermined {
                    number_reads: self.unknown,
                },
            },
            unknown_barcodes: UnknownBarcodes {
                barcodes: self.unknown_barcodes.clone(),
            },
        }
    }

    /// Writes the summary as pretty-printed JSON.
    ///
    /// # Arguments
    ///
    /// * `path` - Destination, usually `{outdir}/{prefix}demux_Stats.json`.
    pub fn write_stats_json(&self, path: &Path) -> Result<(), DemuxError> {
        let file = File::create(path).map_err(|e| DemuxError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.to_stats_json())
            .map_err(|e| DemuxError::io(path, e.into()))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|e| DemuxError::io(path, e))
    }
}

fn summary_row(barcode: &str, count: u64, total: u64) -> SummaryRow {
    SummaryRow {
        barcode: barcode.to_string(),
        count,
        percent: percent_of(count, total),
    }
}

fn percent_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (1000.0 * count as f64 / total as f64).round() / 10.0
}


// Stats.json layout, after bcl2fastq
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsJson {
    pub conversion_results: ConversionResults,
    pub unknown_barcodes: UnknownBarcodes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConversionResults {
    pub demux_results: Vec<DemuxResult>,
    pub undetermined: Undetermined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DemuxResult {
    pub sample_id: String,
    pub number_reads: u64,
    pub index_metrics: Vec<IndexMetric>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexMetric {
    pub index_sequence: String,
    /// Keyed by distance; serde_json writes the keys as strings, in numeric order.
    pub mismatch_counts: BTreeMap<usize, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Undetermined {
    pub number_reads: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnknownBarcodes {
    pub barcodes: BTreeMap<String, u64>,
}
