#![allow(dead_code)]
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use rand::Rng;
use rand::seq::IndexedRandom;
use rand_distr::{Distribution, Normal};
use fastq_demux::utils::fastq::{fastq_reader, OwnedRecord};

pub const BASES: &[u8] = b"ACGT";

/// (header without '@', sequence, quality)
pub type Read = (String, String, String);

pub fn read(head: &str, seq: &str) -> Read {
    (head.to_string(), seq.to_string(), "I".repeat(seq.len()))
}

pub fn write_fastq(path: &Path, reads: &[Read], gzip: bool) -> PathBuf {
    let mut text = String::new();
    for (head, seq, qual) in reads {
        text.push_str(&format!("@{}\n{}\n+\n{}\n", head, seq, qual));
    }
    let file = File::create(path).unwrap();
    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    } else {
        let mut file = file;
        file.write_all(text.as_bytes()).unwrap();
    }
    path.to_path_buf()
}

pub fn write_samplesheet(path: &Path, rows: &[&[&str]]) -> PathBuf {
    let text: String = rows.iter().map(|r| format!("{}\n", r.join("\t"))).collect();
    std::fs::write(path, text).unwrap();
    path.to_path_buf()
}

/// Reads a FASTQ file back, gzipped or not.
pub fn read_fastq(path: &Path) -> Vec<OwnedRecord> {
    let mut reader = fastq_reader(path).unwrap();
    reader.records().map(|r| r.unwrap()).collect()
}

pub fn heads(path: &Path) -> Vec<String> {
    read_fastq(path)
        .iter()
        .map(|r| String::from_utf8_lossy(&r.head).into_owned())
        .collect()
}

pub fn fastq_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains(".fastq"))
        .collect();
    files.sort();
    files
}

pub fn random_sequence<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| *BASES.choose(rng).expect("BASES is never empty") as char)
        .collect()
}

/// Phred+33 qualities drawn from a normal distribution clamped to 0..=40.
pub fn random_quality<R: Rng>(rng: &mut R, length: usize, mean: f32, stdev: f32) -> String {
    let normal = Normal::new(mean, stdev).unwrap();
    (0..length)
        .map(|_| {
            let q: f32 = normal.sample(rng).clamp(0.0, 40.0);
            (q as u8 + 33) as char
        })
        .collect()
}

/// Copy of `barcode` with `n` distinct positions changed to another base.
pub fn mutate<R: Rng>(rng: &mut R, barcode: &str, n: usize) -> String {
    let mut bytes = barcode.as_bytes().to_vec();
    let mut positions: Vec<usize> = (0..bytes.len()).collect();
    for i in 0..n {
        let j = rng.random_range(i..positions.len());
        positions.swap(i, j);
        let pos = positions[i];
        let current = bytes[pos];
        let others: Vec<u8> = BASES.iter().copied().filter(|&b| b != current).collect();
        bytes[pos] = *others.choose(rng).expect("three other bases");
    }
    String::from_utf8(bytes).unwrap()
}
