//! memecheck - Check MEME Suite input files
//!
//! Validates FASTA sequences, MEME motif files and Markov background models
//! and lists everything wrong with them.
//!
//! ## Usage
//!
//! ```bash
//! memecheck reads.fa
//! memecheck -f motif --json meme.html
//! memecheck -a dna -c limits.yaml upload.dat
//! ```
//!
//! ## Exit status
//!
//! - `0`: no errors (warnings are fine)
//! - `1`: the file has errors
//! - `2`: the file could not be read, or the arguments are wrong

// Use jemalloc for better memory management (returns memory to OS)
#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::Serialize;

use memecheck::alphabet::{Alphabet, AlphabetSet};
use memecheck::config::{ChunkSizes, Config};
use memecheck::formats::{detect_format, FileFormat};
use memecheck::model::{Motif, MotifMeta};
use memecheck::motif::utils;
use memecheck::report::Summary;
use memecheck::Checked;

/// File format choice for command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// FASTA sequences
    Fasta,
    /// MEME motifs (text, HTML or XML)
    Motif,
    /// Markov background model
    Background,
    /// Auto-detect from extension and content
    Auto,
}

impl From<FormatArg> for Option<FileFormat> {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Fasta => Some(FileFormat::Fasta),
            FormatArg::Motif => Some(FileFormat::Motif),
            FormatArg::Background => Some(FileFormat::Background),
            FormatArg::Auto => None,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlphabetArg {
    Dna,
    Rna,
    Protein,
}

impl From<AlphabetArg> for Alphabet {
    fn from(arg: AlphabetArg) -> Self {
        match arg {
            AlphabetArg::Dna => Alphabet::Dna,
            AlphabetArg::Rna => Alphabet::Rna,
            AlphabetArg::Protein => Alphabet::Protein,
        }
    }
}

/// memecheck - Check FASTA, MEME motif and background files
///
/// Reads the file in small chunks and reports every problem found, with
/// line numbers.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to check
    file: PathBuf,

    /// Force a specific file format (overrides auto-detection)
    #[arg(short = 'f', long = "format", value_enum, default_value = "auto")]
    format: FormatArg,

    /// YAML configuration file with checker options
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Bytes read per chunk (overrides the configuration)
    #[arg(long = "chunk-size")]
    chunk_size: Option<usize>,

    /// Allowed alphabet; repeat to allow several (overrides the configuration)
    #[arg(short = 'a', long = "alphabet", value_enum)]
    alphabets: Vec<AlphabetArg>,

    /// Print the report as JSON
    #[arg(long = "json")]
    json: bool,

    /// Wrap the text report at this many columns
    #[arg(long = "width")]
    width: Option<usize>,

    /// More logging on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    file: String,
    format: String,
    #[serde(flatten)]
    summary: &'a Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a MotifMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    motifs: Option<&'a [Motif]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequences: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order: Option<usize>,
}

/// Width for the text report: `--width`, then `$COLUMNS`, then 80.
fn report_width(width: Option<usize>) -> usize {
    width
        .or_else(|| std::env::var("COLUMNS").ok().and_then(|cols| cols.parse().ok()))
        .unwrap_or(80)
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_yaml(path)?,
        None => Config::default(),
    };
    if let Some(size) = args.chunk_size {
        if size == 0 {
            anyhow::bail!("--chunk-size must be at least 1");
        }
        config.chunks = ChunkSizes::all(size);
    }
    if !args.alphabets.is_empty() {
        let alphabets: Vec<Alphabet> = args.alphabets.iter().map(|&a| a.into()).collect();
        let allowed = AlphabetSet::of(&alphabets);
        config.fasta.alphabets = allowed;
        config.background.alphabets = allowed;
    }
    config.validate()?;
    Ok(config)
}

fn motif_line(motif: &Motif, alphabet: Alphabet) -> String {
    format!(
        "  {:<16} {:<16} w={:<3} nsites={:<6} E={:<9.2e} {}",
        motif.id,
        motif.alt.as_deref().unwrap_or("-"),
        motif.len,
        motif.nsites,
        motif.evalue,
        utils::consensus(&motif.pwm, alphabet)
    )
}

fn render_text(file: &Path, checked: &Checked, summary: &Summary, width: usize) -> String {
    let name = file.display();
    let mut out = match checked {
        Checked::Fasta(fasta) => format!(
            "{}: FASTA, {} sequences ({} letters), {}\n",
            name,
            fasta.sequence_count(),
            fasta.sequence_total(),
            fasta.alphabet()
        ),
        Checked::Background(background) => format!("{}: {}\n", name, background),
        Checked::Motif(collector) => {
            let alphabet = collector.meta.as_ref().map_or(Alphabet::Unknown, |meta| meta.alphabet);
            let version = collector
                .meta
                .as_ref()
                .and_then(|meta| meta.version.as_deref())
                .map(|version| format!("MEME version {}, ", version))
                .unwrap_or_default();
            let mut out = format!("{}: {}{}, {} motifs\n", name, version, alphabet, collector.motifs.len());
            for motif in &collector.motifs {
                out.push_str(&motif_line(motif, alphabet));
                out.push('\n');
            }
            out
        }
    };
    if summary.messages.is_empty() {
        out.push_str("No problems found.\n");
    } else {
        out.push_str(&summary.to_text(width));
    }
    out
}

fn run(args: &Args) -> Result<ExitCode> {
    let config = load_config(args)?;
    let format = match Option::<FileFormat>::from(args.format) {
        Some(format) => format,
        None => detect_format(&args.file)
            .with_context(|| format!("Failed to read file: {}", args.file.display()))?,
    };
    log::info!("Checking {} as {}", args.file.display(), format);

    let checked = memecheck::check_file(&args.file, format, &config)
        .with_context(|| format!("Failed to check file: {}", args.file.display()))?;
    let summary = checked.summary();

    if args.json {
        let report = JsonReport {
            file: args.file.display().to_string(),
            format: format.to_string(),
            summary: &summary,
            meta: match &checked {
                Checked::Motif(collector) => collector.meta.as_ref(),
                _ => None,
            },
            motifs: match &checked {
                Checked::Motif(collector) => Some(collector.motifs.as_slice()),
                _ => None,
            },
            sequences: match &checked {
                Checked::Fasta(fasta) => Some(fasta.sequence_count()),
                _ => None,
            },
            order: match &checked {
                Checked::Background(background) => Some(background.order()),
                _ => None,
            },
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_text(&args.file, &checked, &summary, report_width(args.width)));
    }

    Ok(if summary.error { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
