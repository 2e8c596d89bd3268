//! # memecheck - Streaming checkers for MEME Suite input files
//!
//! Validates the files people upload to motif analysis tools before any real
//! work is done on them, reading each file in small chunks so the size of
//! the file never matters.
//!
//! ## Architecture
//!
//! - `chunked`: the chunk driver, blobs and cancellation
//! - `decoder`: UTF-8 decoding with line and column tracking
//! - `search`: Boyer-Moore-Horspool search that works across chunks
//! - `faults`: bounded records of where problems occurred
//! - `formats`: format sniffing, the FASTA checker and the background model
//!   parser
//! - `motif`: motif parsers for MEME text, HTML and XML output, typed-in
//!   motifs and matrix utilities
//! - `report`: messages and summaries shown to the user
//! - `config`: YAML configuration
//!
//! ## Example
//!
//! ```no_run
//! use memecheck::formats::fasta_summary::FastaOptions;
//!
//! let summary = memecheck::check_fasta_file("reads.fa", &FastaOptions::default(), 1024)?;
//! for message in summary.summary().messages {
//!     println!("{}", message.message);
//! }
//! # Ok::<(), memecheck::CheckError>(())
//! ```

use std::io;
use std::path::Path;

use thiserror::Error;

/// A regex compiled once, on first use.
macro_rules! regex {
    ($re:literal) => {{
        static RE: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
        RE.get_or_init(|| ::regex::Regex::new($re).expect("static regex"))
    }};
}

pub mod alphabet;
pub mod chunked;
pub mod config;
pub mod decoder;
pub mod faults;
pub mod formats;
pub mod model;
pub mod motif;
pub mod report;
pub mod search;

use chunked::FileBlob;
use config::Config;
use decoder::SourceError;
use formats::background::{BgOptions, BgParser, BgSummary};
use formats::fasta::FastaChecker;
use formats::fasta_summary::{FastaOptions, FastaSummary};
use formats::FileFormat;
use motif::parser::MotifParser;
use motif::MotifCollector;
use report::Summary;

/// Failures that stop a check before it reaches a verdict. Problems found
/// in the file itself are never errors; they end up in the [`Summary`].
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Decoder misuse: {0}")]
    Source(#[from] SourceError),

    #[error("Check was cancelled")]
    Cancelled,
}

pub type CheckResult<T> = Result<T, CheckError>;

/// Checks a FASTA file on disk.
pub fn check_fasta_file<P: AsRef<Path>>(path: P, options: &FastaOptions, chunk_size: usize) -> CheckResult<FastaSummary> {
    let mut blob = FileBlob::open(path)?;
    let mut checker = FastaChecker::new(options, FastaSummary::new(options.clone()));
    checker.check_blob(&mut blob, chunk_size)?;
    checker.into_handler().ok_or(CheckError::Cancelled)
}

/// Parses a motif file on disk, keeping every motif.
pub fn parse_motif_file<P: AsRef<Path>>(path: P, chunk_size: usize) -> CheckResult<MotifCollector> {
    let mut blob = FileBlob::open(path)?;
    let mut parser = MotifParser::new(MotifCollector::new());
    parser.process_blob(&mut blob, chunk_size)?;
    parser.into_handler().ok_or(CheckError::Cancelled)
}

/// Checks a Markov background file on disk.
pub fn check_background_file<P: AsRef<Path>>(path: P, options: &BgOptions, chunk_size: usize) -> CheckResult<BgSummary> {
    let mut blob = FileBlob::open(path)?;
    let mut parser = BgParser::new(BgSummary::new(options.clone()));
    parser.parse_blob(&mut blob, chunk_size)?;
    parser.into_handler().ok_or(CheckError::Cancelled)
}

/// The result of checking one file.
#[derive(Debug, Clone)]
pub enum Checked {
    Fasta(FastaSummary),
    Motif(MotifCollector),
    Background(BgSummary),
}

impl Checked {
    pub fn format(&self) -> FileFormat {
        match self {
            Checked::Fasta(_) => FileFormat::Fasta,
            Checked::Motif(_) => FileFormat::Motif,
            Checked::Background(_) => FileFormat::Background,
        }
    }

    pub fn summary(&self) -> Summary {
        match self {
            Checked::Fasta(fasta) => fasta.summary(),
            Checked::Motif(motifs) => motifs.summary(),
            Checked::Background(background) => background.summary(),
        }
    }
}

/// Checks `path` as `format` with the options and chunk sizes of `config`.
pub fn check_file<P: AsRef<Path>>(path: P, format: FileFormat, config: &Config) -> CheckResult<Checked> {
    let path = path.as_ref();
    let checked = match format {
        FileFormat::Fasta => Checked::Fasta(check_fasta_file(path, &config.fasta, config.chunks.fasta)?),
        FileFormat::Motif => Checked::Motif(parse_motif_file(path, config.chunks.motif)?),
        FileFormat::Background => {
            Checked::Background(check_background_file(path, &config.background, config.chunks.background)?)
        }
    };
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_check_fasta_file() {
        let file = temp_file(">seq1\nACGTACGT\n>seq2\nACGGTTCA\n");
        let fasta = check_fasta_file(file.path(), &FastaOptions::default(), 5).unwrap();
        assert_eq!(fasta.sequence_count(), 2);
        assert!(!fasta.summary().error);
    }

    #[test]
    fn test_parse_motif_file() {
        let file = temp_file(
            "MEME version 4\n\nALPHABET= ACGT\n\nMOTIF m1\nletter-probability matrix: alength= 4 w= 2\n\
             0.1 0.2 0.3 0.4\n0.25 0.25 0.25 0.25\n",
        );
        let motifs = parse_motif_file(file.path(), 16).unwrap();
        assert_eq!(motifs.motifs.len(), 1);
        assert_eq!(motifs.motifs[0].id, "m1");
        assert!(motifs.finished);
        assert!(!motifs.summary().error);
    }

    #[test]
    fn test_check_file_dispatch() {
        let file = temp_file("A 0.25\nC 0.25\nG 0.25\nT 0.25\n");
        let checked = check_file(file.path(), FileFormat::Background, &Config::default()).unwrap();
        assert_eq!(checked.format(), FileFormat::Background);
        let summary = checked.summary();
        assert!(!summary.error);
        assert_eq!(summary.alphabet, Some(Alphabet::Dna));
    }

    #[test]
    fn test_missing_file() {
        let err = check_fasta_file("/nonexistent/reads.fa", &FastaOptions::default(), 1024).unwrap_err();
        assert!(matches!(err, CheckError::Io(_)));
    }
}
