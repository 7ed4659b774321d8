mod common;

use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use clap::Parser;
use tempfile::TempDir;
use fastq_demux::Arguments;
use fastq_demux::config::defs::{DemuxError, RunConfig};
use fastq_demux::pipelines::demux::{run, DemuxOutcome};
use fastq_demux::utils::stats::StatsJson;
use common::*;


async fn demux(dir: &Path, argv: &[&str]) -> Result<DemuxOutcome, DemuxError> {
    let mut full = vec!["fastq-demux"];
    full.extend_from_slice(argv);
    let args = Arguments::try_parse_from(full).unwrap();
    let config = RunConfig::from_args(args, dir)?;
    run(Arc::new(config)).await
}

fn stats_json(path: &Path) -> StatsJson {
    serde_json::from_reader(std::fs::File::open(path).unwrap()).unwrap()
}


#[tokio::test]
async fn test_single_index_header_paired() -> Result<()> {
    let dir = TempDir::new()?;
    let barcodes = ["ACGTACGT", "TTGGCCAA", "ACGTACGT", "NNNNNNNN", "ACGTACGT", "GGGGAAAA"];
    let r1: Vec<Read> = barcodes
        .iter()
        .enumerate()
        .map(|(i, bc)| read(&format!("M1:1:FC:1:1101:{}:1 1:N:0:{}", i, bc), "ACGTTGCAAC"))
        .collect();
    let r2: Vec<Read> = barcodes
        .iter()
        .enumerate()
        .map(|(i, bc)| read(&format!("M1:1:FC:1:1101:{}:1 2:N:0:{}", i, bc), "GTTGCAACGT"))
        .collect();
    write_fastq(&dir.path().join("r1.fastq"), &r1, false);
    write_fastq(&dir.path().join("r2.fastq"), &r2, false);
    write_samplesheet(
        &dir.path().join("ss.tsv"),
        &[&["Sample1", "ACGTACGT"], &["Sample2", "TTGGCCAA"], &["Sample3", "CCCCCCCC"]],
    );

    let outcome = demux(
        dir.path(),
        &["--R1", "r1.fastq", "--R2", "r2.fastq", "--samplesheet", "ss.tsv", "--outdir", "out", "--prefix", "run_", "--no-gzip-compression"],
    )
    .await?;

    let out = dir.path().join("out");
    let s1_r1 = heads(&out.join("run_Sample1_ACGTACGT_R1.fastq"));
    let s1_r2 = heads(&out.join("run_Sample1_ACGTACGT_R2.fastq"));
    assert_eq!(s1_r1.len(), 3);
    for (f, r) in s1_r1.iter().zip(s1_r2.iter()) {
        assert_eq!(f.split(' ').next(), r.split(' ').next());
    }
    assert!(s1_r1[0].contains(":0:1 "));
    assert!(s1_r1[2].contains(":4:1 "));

    assert_eq!(heads(&out.join("run_Sample2_TTGGCCAA_R2.fastq")).len(), 1);
    assert!(heads(&out.join("run_Sample3_CCCCCCCC_R1.fastq")).is_empty());
    assert_eq!(heads(&out.join("run_Unknown_R1.fastq")).len(), 2);

    assert_eq!(outcome.stats.total(), 6);
    assert_eq!(outcome.stats.sample_reads("Sample3"), Some(0));
    assert_eq!(outcome.sinks.len(), 8);

    let json = stats_json(&out.join("run_demux_Stats.json"));
    assert_eq!(outcome.stats_path, out.join("run_demux_Stats.json"));
    let results = &json.conversion_results.demux_results;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].sample_id, "Sample1");
    assert_eq!(results[0].number_reads, 3);
    assert_eq!(results[2].number_reads, 0);
    assert_eq!(json.conversion_results.undetermined.number_reads, 2);
    assert_eq!(json.unknown_barcodes.barcodes.get("NNNNNNNN"), Some(&1));
    assert_eq!(json.unknown_barcodes.barcodes.get("GGGGAAAA"), Some(&1));

    let known = outcome.stats.known_summary();
    assert_eq!(known[0].barcode, "ACGTACGT");
    assert_eq!(known[0].percent, 75.0);
    Ok(())
}


#[tokio::test]
async fn test_dual_index_dedicated_streams_with_mismatches() -> Result<()> {
    let dir = TempDir::new()?;
    let pairs = [
        ("GGGGGGGG", "AGATCTCG"), // S1 exact
        ("GGGGGGGT", "AGATCTCG"), // S1, one mismatch on index 1
        ("GAAGATTA", "TTTACTCA"), // S2, one mismatch on each index
        ("AAAAAAAA", "AAAAAAAA"), // unknown
        ("GGGGGGTT", "AGATCTCG"), // two mismatches on index 1: unknown
        ("GAAGATTTCA", "TTTACTCTGG"), // S2, index reads longer than the barcodes
    ];
    let r1: Vec<Read> = (0..pairs.len()).map(|i| read(&format!("read{} 1:N:0:1", i), "ACGTACGTAA")).collect();
    let i1: Vec<Read> = pairs.iter().enumerate().map(|(i, (a, _))| read(&format!("read{}", i), a)).collect();
    let i2: Vec<Read> = pairs.iter().enumerate().map(|(i, (_, b))| read(&format!("read{}", i), b)).collect();
    write_fastq(&dir.path().join("r1.fastq.gz"), &r1, true);
    write_fastq(&dir.path().join("i1.fastq.gz"), &i1, true);
    write_fastq(&dir.path().join("i2.fastq"), &i2, false);
    write_samplesheet(
        &dir.path().join("ss.tsv"),
        &[&["S1", "GGGGGGGG", "AGATCTCG"], &["S2", "GAAGATTT", "TTTACTCT"]],
    );

    let outcome = demux(
        dir.path(),
        &["--R1", "r1.fastq.gz", "--I1", "i1.fastq.gz", "--I2", "i2.fastq", "--samplesheet", "ss.tsv", "-m", "1", "-o", "out"],
    )
    .await?;

    let out = dir.path().join("out");
    assert_eq!(heads(&out.join("S1_GGGGGGGG-AGATCTCG_R1.fastq.gz")), vec!["read0 1:N:0:1", "read1 1:N:0:1"]);
    assert_eq!(heads(&out.join("S2_GAAGATTT-TTTACTCT_R1.fastq.gz")), vec!["read2 1:N:0:1", "read5 1:N:0:1"]);
    assert_eq!(heads(&out.join("Unknown_R1.fastq.gz")), vec!["read3 1:N:0:1", "read4 1:N:0:1"]);
    assert!(!out.join("Unknown_R2.fastq.gz").exists());

    let json = stats_json(&outcome.stats_path);
    let s1 = &json.conversion_results.demux_results[0].index_metrics[0];
    assert_eq!(s1.index_sequence, "GGGGGGGG+AGATCTCG");
    assert_eq!(s1.mismatch_counts.get(&0), Some(&1));
    assert_eq!(s1.mismatch_counts.get(&1), Some(&1));
    assert_eq!(json.unknown_barcodes.barcodes.get("GGGGGGTT+AGATCTCG"), Some(&1));
    Ok(())
}


#[tokio::test]
async fn test_stream_length_mismatch_removes_outputs() -> Result<()> {
    let dir = TempDir::new()?;
    write_fastq(
        &dir.path().join("r1.fastq"),
        &[read("a:ACGT", "ACGT"), read("b:ACGT", "ACGT"), read("c:ACGT", "ACGT")],
        false,
    );
    write_fastq(&dir.path().join("r2.fastq"), &[read("a:ACGT", "ACGT"), read("b:ACGT", "ACGT")], false);
    write_samplesheet(&dir.path().join("ss.tsv"), &[&["S1", "ACGT"], &["S2", "TTTT"]]);

    let result = demux(dir.path(), &["--R1", "r1.fastq", "--R2", "r2.fastq", "--samplesheet", "ss.tsv", "-o", "out"]).await;
    match result {
        Err(DemuxError::StreamLengthMismatch { record, exhausted, remaining }) => {
            assert_eq!(record, 3);
            assert_eq!(exhausted, "R2");
            assert_eq!(remaining, "R1");
        }
        other => panic!("expected StreamLengthMismatch, got {:?}", other.map(|o| o.stats)),
    }

    let out = dir.path().join("out");
    assert!(fastq_files_in(&out).is_empty());
    assert!(!out.join("demux_Stats.json").exists());
    Ok(())
}


#[tokio::test]
async fn test_malformed_header_is_input_error() -> Result<()> {
    let dir = TempDir::new()?;
    write_fastq(
        &dir.path().join("r1.fastq"),
        &[read("M1:1:N:0:ACGT", "ACGT"), read("M1 no barcode field", "ACGT")],
        false,
    );
    write_samplesheet(&dir.path().join("ss.tsv"), &[&["S1", "ACGT"]]);

    let err = demux(dir.path(), &["--R1", "r1.fastq", "--samplesheet", "ss.tsv"]).await.unwrap_err();
    assert!(matches!(err, DemuxError::InvalidFastqFormat { record: 2, .. }));
    assert!(err.to_string().starts_with("Invalid input data"));
    assert!(fastq_files_in(dir.path()).iter().all(|p| p.file_name().unwrap().to_string_lossy().starts_with("r1")));
    Ok(())
}


#[tokio::test]
async fn test_configuration_errors() -> Result<()> {
    let dir = TempDir::new()?;
    write_fastq(&dir.path().join("r1.fastq"), &[read("a:ACGTACGT", "ACGT")], false);
    write_fastq(&dir.path().join("i1.fastq"), &[read("a", "ACGTACGT")], false);
    write_samplesheet(&dir.path().join("close.tsv"), &[&["S1", "ACGTACGT"], &["S2", "ACGTACGA"]]);
    write_samplesheet(&dir.path().join("dual.tsv"), &[&["S1", "ACGTACGT", "TTTTTTTT"], &["S2", "GGGGGGGG", "CCCCCCCC"]]);

    // barcodes one apart cannot be separated with a one-mismatch budget
    let err = demux(dir.path(), &["--R1", "r1.fastq", "--samplesheet", "close.tsv", "-m", "1", "-o", "a"]).await.unwrap_err();
    assert!(matches!(err, DemuxError::InvalidConfig(_)));
    assert!(fastq_files_in(&dir.path().join("a")).is_empty());

    let err = demux(dir.path(), &["--R1", "r1.fastq", "--I1", "i1.fastq", "--samplesheet", "dual.tsv", "-o", "b"]).await.unwrap_err();
    assert!(matches!(err, DemuxError::InvalidConfig(_)));
    assert!(err.to_string().starts_with("Invalid configuration"));

    let err = demux(dir.path(), &["--R1", "missing.fastq", "--samplesheet", "dual.tsv"]).await.unwrap_err();
    assert!(matches!(err, DemuxError::InvalidConfig(_)));
    Ok(())
}


#[tokio::test]
async fn test_empty_input_still_writes_outputs() -> Result<()> {
    let dir = TempDir::new()?;
    write_fastq(&dir.path().join("r1.fastq"), &[], false);
    write_samplesheet(&dir.path().join("ss.tsv"), &[&["S1", "ACGT"], &["S2", "TTTT"]]);

    let outcome = demux(dir.path(), &["--R1", "r1.fastq", "--samplesheet", "ss.tsv", "--unknown-barcode", "Undetermined", "-o", "out"]).await?;
    assert_eq!(outcome.stats.total(), 0);

    let out = dir.path().join("out");
    let names: Vec<String> = fastq_files_in(&out)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["S1_ACGT_R1.fastq.gz", "S2_TTTT_R1.fastq.gz", "Undetermined_R1.fastq.gz"]);
    for path in fastq_files_in(&out) {
        assert!(read_fastq(&path).is_empty());
    }
    Ok(())
}


#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plate_sized_paired_run_completes() -> Result<()> {
    let dir = TempDir::new()?;
    let barcodes: Vec<String> = (0..384usize)
        .map(|i| (0..8).map(|k| ['A', 'C', 'G', 'T'][(i >> (2 * k)) & 3]).collect())
        .collect();
    let names: Vec<String> = (0..384).map(|i| format!("S{}", i)).collect();
    let rows: Vec<[&str; 2]> = names.iter().zip(barcodes.iter()).map(|(n, b)| [n.as_str(), b.as_str()]).collect();
    let row_slices: Vec<&[&str]> = rows.iter().map(|r| r.as_slice()).collect();
    write_samplesheet(&dir.path().join("ss.tsv"), &row_slices);

    let r1: Vec<Read> = (0..10).map(|i| read(&format!("read{} 1:N:0:{}", i, barcodes[i * 37]), "ACGTACGT")).collect();
    let r2: Vec<Read> = (0..10).map(|i| read(&format!("read{} 2:N:0:{}", i, barcodes[i * 37]), "TGCATGCA")).collect();
    write_fastq(&dir.path().join("r1.fastq"), &r1, false);
    write_fastq(&dir.path().join("r2.fastq"), &r2, false);

    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(120),
        demux(dir.path(), &["--R1", "r1.fastq", "--R2", "r2.fastq", "--samplesheet", "ss.tsv", "--queue-depth", "1", "-o", "out"]),
    )
    .await??;

    assert_eq!(outcome.sinks.len(), 2 * 385);
    assert_eq!(outcome.stats.total(), 10);
    assert_eq!(outcome.stats.unknown, 0);
    let s37 = dir.path().join("out").join(format!("S37_{}_R2.fastq.gz", barcodes[37]));
    assert_eq!(heads(&s37), vec![format!("read1 2:N:0:{}", barcodes[37])]);
    Ok(())
}


#[tokio::test]
async fn test_lowercase_barcodes_match_their_sample() -> Result<()> {
    let dir = TempDir::new()?;
    write_fastq(
        &dir.path().join("r1.fastq"),
        &[read("a 1:N:0:acgtacgt", "ACGT"), read("b 1:N:0:TtGgCcAa", "ACGT"), read("c 1:N:0:ACGTACGT", "ACGT")],
        false,
    );
    write_samplesheet(&dir.path().join("ss.tsv"), &[&["S1", "acgtACGT"], &["S2", "TTGGCCAA"]]);

    let outcome = demux(dir.path(), &["--R1", "r1.fastq", "--samplesheet", "ss.tsv", "-o", "out"]).await?;
    assert_eq!(outcome.stats.sample_reads("S1"), Some(2));
    assert_eq!(outcome.stats.sample_reads("S2"), Some(1));
    assert_eq!(outcome.stats.unknown, 0);
    // records are written untouched
    assert_eq!(heads(&dir.path().join("out").join("S1_ACGTACGT_R1.fastq.gz")), vec!["a 1:N:0:acgtacgt", "c 1:N:0:ACGTACGT"]);
    Ok(())
}


#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_failing_output_reports_its_path_and_removes_outputs() -> Result<()> {
    let dir = TempDir::new()?;
    let out = dir.path().join("out");
    std::fs::create_dir(&out)?;
    let failing = out.join("S1_ACGT_R1.fastq");
    std::os::unix::fs::symlink("/dev/full", &failing)?;

    // enough data to overflow the writer's buffer well before the input ends
    let seq = "ACGT".repeat(50);
    let r1: Vec<Read> = (0..5_000).map(|i| read(&format!("r{} 1:N:0:ACGT", i), &seq)).collect();
    write_fastq(&dir.path().join("r1.fastq"), &r1, false);
    write_samplesheet(&dir.path().join("ss.tsv"), &[&["S1", "ACGT"], &["S2", "TTTT"]]);

    let result = demux(
        dir.path(),
        &["--R1", "r1.fastq", "--samplesheet", "ss.tsv", "--queue-depth", "4", "--no-gzip-compression", "-o", "out"],
    )
    .await;
    match result {
        Err(DemuxError::IOError { path, .. }) => assert_eq!(path, failing),
        other => panic!("expected IOError, got {:?}", other.map(|o| o.stats)),
    }
    assert!(std::fs::read_dir(&out)?.next().is_none(), "outputs left behind");
    assert!(!out.join("demux_Stats.json").exists());
    Ok(())
}
