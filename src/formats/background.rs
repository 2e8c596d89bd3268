//! Markov background model files.
//!
//! A background file lists the probability of every letter chain, shortest
//! chains first. Chains of length `n + 1` make up an order `n` model:
//!
//! ```text
//! # order 0
//! A 0.3
//! C 0.2
//! G 0.2
//! T 0.3
//! # order 1
//! AA 0.1
//! ...
//! ```
//!
//! The alphabet is decided once every single letter has been read: any
//! protein-only letter makes it protein, otherwise DNA. Each order must list
//! every chain exactly once and its probabilities must sum to 1.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alphabet::{Alphabet, AlphabetSet};
use crate::chunked::{self, Blob, CancelToken, ChunkConsumer, Flow};
use crate::decoder::{EncodingError, LineDecoder};
use crate::faults::FileFaults;
use crate::formats::fasta::{live_handler, Position};
use crate::formats::fasta_summary::OptionsError;
use crate::formats::{unusable_format, FileKind, UnusableFormat};
use crate::report::Summary;
use crate::CheckError;

/// Bytes of the first chunk scanned for NUL bytes.
const FORMAT_SCAN: usize = 40;
/// Consecutive times a character may be handed to a new state.
const MAX_REPROCESS: usize = 20;
/// Allowed distance from 1 of the probabilities of one order.
const SUM_TOLERANCE: f64 = 0.1;
/// Missing chains named in a message.
const MISSING_SHOWN: usize = 11;

const ENCODING_HELP: &str = " - re-save as plain text; either Unicode UTF-8 (no Byte Order Mark) or ASCII";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BgClass(u8);

impl BgClass {
    const JUNK: BgClass = BgClass(1);
    const WHITESPACE: BgClass = BgClass(2);
    const DNA: BgClass = BgClass(4);
    const PROTEIN: BgClass = BgClass(8);
    const NUMBER_START: BgClass = BgClass(16);
    const NUMBER_MID: BgClass = BgClass(32);
    const COMMENT: BgClass = BgClass(64);

    const LETTER: BgClass = BgClass(4 | 8);
    const NUMBER: BgClass = BgClass(16 | 32);

    fn of(codepoint: u32) -> BgClass {
        let Some(ch) = char::from_u32(codepoint).filter(char::is_ascii) else {
            return BgClass::JUNK;
        };
        match ch.to_ascii_uppercase() {
            ' ' | '\t' | '\x0C' | '\n' | '\r' => BgClass::WHITESPACE,
            'A' | 'C' | 'G' | 'T' => BgClass::LETTER,
            // also the exponent of a number
            'E' => BgClass(BgClass::PROTEIN.0 | BgClass::NUMBER_MID.0),
            'D' | 'F' | 'H' | 'I' | 'K' | 'L' | 'M' | 'N' | 'P' | 'Q' | 'R' | 'S' | 'V' | 'W' | 'Y' => {
                BgClass::PROTEIN
            }
            '0'..='9' => BgClass::NUMBER,
            '-' | '+' | '.' => BgClass::NUMBER_MID,
            '#' => BgClass::COMMENT,
            _ => BgClass::JUNK,
        }
    }

    fn has(self, other: BgClass) -> bool {
        self.0 & other.0 != 0
    }
}

/// Problems that make a line unreadable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgSyntax {
    #[error("Found a number before the letter chain was established.")]
    NumberBeforeChain,
    #[error("Found a character that was not part of a state chain")]
    NotInChain,
    #[error("There is no gap between the letter chain and the probability.")]
    NoGap,
    #[error("Found a character that was not the start of a number")]
    NotNumberStart,
    #[error("Expected a number.")]
    ExpectedNumber,
    #[error("Expected whitespace")]
    ExpectedWhitespace,
    #[error("Number does not match expected format.")]
    NumberFormat,
    #[error("Number is not in expected range 0 < p < 1")]
    NumberRange,
    #[error("Did not find a probability to go with the chain")]
    MissingProbability,
}

/// Receives what the parser finds. Every method defaults to doing nothing.
pub trait BgEvents {
    fn begin(&mut self, _file_size: u64) {}

    fn progress(&mut self, _fraction: f64, _alphabet: Alphabet) {}

    /// A chain and its probability; invalid probabilities are given as 0.
    fn info_chain(&mut self, _chain: &str, _probability: f64) {}

    fn error_syntax(&mut self, _at: Position, _problem: BgSyntax) {}

    /// A letter of the other alphabet.
    fn error_mismatch(&mut self, _at: Position, _letter: char) {}

    fn error_duplicate(&mut self, _at: Position, _chain: &str) {}

    /// Chains that were never given, as [`chain_name`] indexes in
    /// `alphabet`.
    fn error_missing(&mut self, _at: Position, _alphabet: Alphabet, _missing: &[usize]) {}

    /// The chains of length `chain_len` sum to `total` instead of 1.
    fn error_sum(&mut self, _at: Position, _chain_len: usize, _total: f64) {}

    /// The file is not plain text. Parsing stops.
    fn error_format(&mut self, _format: &UnusableFormat) {}

    /// The file is not valid UTF-8. Parsing stops.
    fn error_encoding(&mut self, _error: &EncodingError) {}

    /// Parsing finished; `order` is the highest Markov order seen.
    fn end(&mut self, _alphabet: Alphabet, _order: usize) {}
}

/// Name of the chain stored at `index`.
///
/// Chains are numbered shortest first, and in alphabet order within a
/// length: for DNA 0 is `A`, 3 is `T`, 4 is `AA`.
pub fn chain_name(alphabet: Alphabet, index: usize) -> String {
    let Some(letters) = alphabet.letters() else {
        return String::new();
    };
    let letters = letters.as_bytes();
    let alen = letters.len();
    let mut name = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let digit = (n - 1) % alen;
        name.push(letters[digit]);
        n = (n - 1) / alen;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Comment,
    Chain,
    Gap,
    Number,
    Whitespace,
}

/// Every chain of one length was missing, so nothing more can be checked.
struct Abort;

/// The background file state machine.
pub struct BgParser<H: BgEvents> {
    handler: Option<H>,
    cancel: CancelToken,
    decoder: LineDecoder,
    state: State,
    /// Decided alphabet; unknown until the first order is complete.
    alphabet: Alphabet,
    /// Letters accepted in chains, protein until decided otherwise.
    chain_letters: Alphabet,
    chain: String,
    chain_index: usize,
    chain_pos: Position,
    /// Expected length of chains.
    chain_len: usize,
    probs_check_start: usize,
    prob: String,
    probs: Vec<Option<f64>>,
    file_size: u64,
    file_name: Option<String>,
}

impl<H: BgEvents> BgParser<H> {
    pub fn new(handler: H) -> Self {
        Self::with_cancel_token(handler, CancelToken::new())
    }

    pub fn with_cancel_token(handler: H, cancel: CancelToken) -> Self {
        Self {
            handler: Some(handler),
            cancel,
            decoder: LineDecoder::new(),
            state: State::Start,
            alphabet: Alphabet::Unknown,
            chain_letters: Alphabet::Protein,
            chain: String::new(),
            chain_index: 0,
            chain_pos: Position { offset: 0, line: 0, column: 0 },
            chain_len: 1,
            probs_check_start: 0,
            prob: String::new(),
            probs: vec![None; 20],
            file_size: 0,
            file_name: None,
        }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops parsing and drops the handler; no further events are sent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.handler = None;
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Gives back the handler, unless the parser was cancelled.
    pub fn into_handler(self) -> Option<H> {
        if self.cancel.is_cancelled() {
            None
        } else {
            self.handler
        }
    }

    pub fn parse_blob<B: Blob + ?Sized>(&mut self, blob: &mut B, chunk_size: usize) -> Result<Flow, CheckError> {
        log::info!("Checking background file {} ({} bytes)", blob.name().unwrap_or("<memory>"), blob.size());
        let flow = chunked::drive(blob, self, chunk_size)?;
        log::info!("Background check finished: {:?}", flow);
        Ok(flow)
    }

    fn live(&mut self) -> Option<&mut H> {
        live_handler(&mut self.handler, &self.cancel)
    }

    fn position(&self) -> Position {
        Position {
            offset: self.decoder.offset(),
            line: self.decoder.line(),
            column: self.decoder.column(),
        }
    }

    fn syntax(&mut self, problem: BgSyntax) {
        let at = self.position();
        if let Some(h) = self.live() {
            h.error_syntax(at, problem);
        }
    }

    fn mismatch(&mut self, letter: char) {
        let at = self.position();
        if let Some(h) = self.live() {
            h.error_mismatch(at, letter);
        }
    }

    fn alen(&self) -> usize {
        self.chain_letters.size().unwrap_or(20)
    }

    /// Handles one character, returning false when the new state should see
    /// it again.
    fn step(&mut self, ch: char, class: BgClass) -> Result<bool, Abort> {
        match self.state {
            State::Start => Ok(self.process_start(ch, class)),
            State::Comment => {
                if self.decoder.column() == 0 {
                    self.state = State::Start;
                    return Ok(false);
                }
                Ok(true)
            }
            State::Chain => self.process_chain(ch, class),
            State::Gap => Ok(self.process_gap(class)),
            State::Number => Ok(self.process_number(ch, class)),
            State::Whitespace => {
                if self.decoder.column() == 0 {
                    self.state = State::Start;
                    return Ok(false);
                }
                if !class.has(BgClass::WHITESPACE) {
                    self.syntax(BgSyntax::ExpectedWhitespace);
                    self.state = State::Comment;
                }
                Ok(true)
            }
        }
    }

    fn chain_class(&self) -> BgClass {
        if self.chain_letters == Alphabet::Dna {
            BgClass::DNA
        } else {
            BgClass::LETTER
        }
    }

    fn process_start(&mut self, ch: char, class: BgClass) -> bool {
        if class.has(BgClass::COMMENT) {
            self.state = State::Comment;
            return true;
        }
        if class.has(BgClass::WHITESPACE) {
            return true;
        }
        if class.has(self.chain_class()) {
            self.state = State::Chain;
            self.chain.clear();
            self.chain_index = 0;
            self.chain_pos = self.position();
            return false;
        }
        if class.has(BgClass::LETTER) {
            self.mismatch(ch);
        } else if class.has(BgClass::NUMBER) {
            self.syntax(BgSyntax::NumberBeforeChain);
        } else {
            self.syntax(BgSyntax::NotInChain);
        }
        self.state = State::Comment;
        true
    }

    fn check_duplicate(&mut self) {
        if self.chain_index == 0 {
            return;
        }
        if self.probs.get(self.chain_index - 1).copied().flatten().is_some() {
            let at = self.chain_pos;
            if let Some(h) = live_handler(&mut self.handler, &self.cancel) {
                h.error_duplicate(at, &self.chain);
            }
        }
    }

    fn process_chain(&mut self, ch: char, class: BgClass) -> Result<bool, Abort> {
        if class.has(BgClass::WHITESPACE) {
            self.check_duplicate();
            self.state = State::Gap;
            return Ok(true);
        }
        if class.has(self.chain_class()) {
            self.chain.push(ch);
            if self.chain.chars().count() > self.chain_len {
                // the next order begins
                self.determine_alphabet();
                self.check_probabilities()?;
                self.probs_check_start = self.probs.len();
                self.chain_len += 1;
                let added = self.alen().pow(self.chain_len as u32);
                self.probs.resize(self.probs_check_start + added, None);
            }
            match self.index_of(&self.chain) {
                Some(index) => self.chain_index = index,
                None => {
                    // the alphabet was just decided against this letter
                    self.mismatch(ch);
                    self.state = State::Comment;
                }
            }
            return Ok(true);
        }
        if class.has(BgClass::LETTER) {
            self.mismatch(ch);
        } else if class.has(BgClass::NUMBER_START) {
            self.syntax(BgSyntax::NoGap);
            self.state = State::Number;
            self.prob.clear();
            return Ok(false);
        } else {
            self.syntax(BgSyntax::NotInChain);
        }
        self.state = State::Comment;
        Ok(true)
    }

    /// One-based position of `chain` among all chains.
    fn index_of(&self, chain: &str) -> Option<usize> {
        let alen = self.alen();
        chain.chars().try_fold(0usize, |index, letter| {
            let digit = self.chain_letters.index_of(letter)?;
            Some(index * alen + digit + 1)
        })
    }

    fn process_gap(&mut self, class: BgClass) -> bool {
        if self.decoder.column() == 0 {
            self.syntax(BgSyntax::MissingProbability);
            self.state = State::Start;
            return false;
        }
        if class.has(BgClass::WHITESPACE) {
            return true;
        }
        if class.has(BgClass::NUMBER_START) {
            self.state = State::Number;
            self.prob.clear();
            return false;
        }
        self.syntax(BgSyntax::NotNumberStart);
        self.state = State::Comment;
        true
    }

    fn process_number(&mut self, ch: char, class: BgClass) -> bool {
        if class.has(BgClass::NUMBER) {
            self.prob.push(ch);
            return true;
        }
        if class.has(BgClass::WHITESPACE) {
            self.store_number();
            return false;
        }
        self.syntax(BgSyntax::ExpectedNumber);
        self.state = State::Comment;
        true
    }

    fn store_number(&mut self) {
        let prob = if !regex!(r"^(?:0(?:\.[0-9]+)?|[1-9][0-9]*(?:\.[0-9]+)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
            .is_match(&self.prob)
        {
            self.syntax(BgSyntax::NumberFormat);
            0.0
        } else {
            match self.prob.parse::<f64>() {
                Ok(prob) if prob > 0.0 && prob < 1.0 => prob,
                _ => {
                    self.syntax(BgSyntax::NumberRange);
                    0.0
                }
            }
        };
        if self.chain_index > 0 {
            if let Some(slot) = self.probs.get_mut(self.chain_index - 1) {
                *slot = Some(prob);
            }
            if let Some(h) = live_handler(&mut self.handler, &self.cancel) {
                h.info_chain(&self.chain, prob);
            }
        }
        self.state = State::Whitespace;
    }

    /// Decides between DNA and protein once the single letters are read.
    fn determine_alphabet(&mut self) {
        if self.chain_len != 1 || self.alphabet != Alphabet::Unknown {
            return;
        }
        let protein_only = "DEFHIKLMNPQRSVWY"
            .chars()
            .filter_map(|letter| Alphabet::Protein.index_of(letter))
            .any(|i| self.probs[i].is_some());
        if protein_only {
            self.alphabet = Alphabet::Protein;
        } else {
            let dna: Vec<Option<f64>> = "ACGT"
                .chars()
                .filter_map(|letter| Alphabet::Protein.index_of(letter))
                .map(|i| self.probs[i])
                .collect();
            self.probs = dna;
            self.alphabet = Alphabet::Dna;
        }
        self.chain_letters = self.alphabet;
        log::debug!("Background alphabet is {}", self.alphabet);
    }

    /// Checks that the chains of the current length are complete and sum
    /// to 1.
    fn check_probabilities(&mut self) -> Result<(), Abort> {
        let start = self.probs_check_start;
        let mut sum = 0.0;
        let mut missing = Vec::new();
        for (i, prob) in self.probs.iter().enumerate().skip(start) {
            match prob {
                Some(prob) => sum += prob,
                None => missing.push(i),
            }
        }
        let at = self.position();
        let (alphabet, chain_len) = (self.alphabet, self.chain_len);
        if !missing.is_empty() {
            if let Some(h) = self.live() {
                h.error_missing(at, alphabet, &missing);
            }
            if missing.len() == self.probs.len() - start {
                log::debug!("No chains of length {}", chain_len);
                return Err(Abort);
            }
        } else if (sum - 1.0).abs() > SUM_TOLERANCE {
            if let Some(h) = self.live() {
                h.error_sum(at, chain_len, sum);
            }
        }
        Ok(())
    }

    fn finish_file(&mut self) {
        match self.state {
            State::Chain | State::Gap => {
                if self.state == State::Chain {
                    self.check_duplicate();
                }
                self.syntax(BgSyntax::MissingProbability);
            }
            State::Number => self.store_number(),
            _ => {}
        }
        self.determine_alphabet();
        // an abort has already been reported as missing chains
        let _ = self.check_probabilities();
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        let alphabet = self.alphabet;
        let order = self.chain_len - 1;
        if let Some(h) = self.live() {
            h.progress(1.0, alphabet);
            h.end(alphabet, order);
        }
    }
}

impl<H: BgEvents> ChunkConsumer for BgParser<H> {
    fn begin(&mut self, size: u64, name: Option<&str>) {
        self.file_size = size;
        self.file_name = name.map(str::to_string);
        if let Some(h) = self.live() {
            h.begin(size);
        }
    }

    fn consume(&mut self, chunk: &[u8], offset: u64, is_last: bool) -> Result<Flow, CheckError> {
        let fraction = if self.file_size > 0 {
            offset as f64 / self.file_size as f64
        } else {
            0.0
        };
        let alphabet = self.alphabet;
        if let Some(h) = self.live() {
            h.progress(fraction, alphabet);
        }
        if offset == 0 {
            if let Some(format) = unusable_format(chunk, Some(FORMAT_SCAN), self.file_name.as_deref()) {
                log::debug!("Not a text file: {}", format.name);
                if let Some(h) = self.live() {
                    h.error_format(&format);
                }
                self.signal_stop();
                return Ok(Flow::Finished);
            }
        }
        self.decoder.set_source(chunk, is_last)?;
        loop {
            let codepoint = match self.decoder.next() {
                Ok(Some(codepoint)) => codepoint,
                Ok(None) => break,
                Err(error) => {
                    log::debug!("Encoding error: {}", error);
                    if let Some(h) = self.live() {
                        h.error_encoding(&error);
                    }
                    self.signal_stop();
                    return Ok(Flow::Finished);
                }
            };
            let class = BgClass::of(codepoint);
            let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
            let mut consumed = false;
            for _ in 0..MAX_REPROCESS {
                match self.step(ch, class) {
                    Ok(true) => {
                        consumed = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(Abort) => {
                        self.signal_stop();
                        return Ok(Flow::Finished);
                    }
                }
            }
            if !consumed {
                log::warn!("Background parser stuck at offset {}", self.decoder.offset());
                self.state = State::Comment;
            }
            if self.cancel.is_cancelled() {
                self.handler = None;
                log::debug!("Background check cancelled");
                return Ok(Flow::Cancelled);
            }
        }
        if is_last {
            self.finish_file();
            Ok(Flow::Finished)
        } else {
            Ok(Flow::Continue)
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a background file is allowed to contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BgOptions {
    /// Files larger than this many bytes get a warning.
    pub file_max: Option<u64>,
    pub alphabets: AlphabetSet,
}

impl Default for BgOptions {
    fn default() -> Self {
        Self {
            file_max: Some(1 << 20),
            alphabets: AlphabetSet::of(&[Alphabet::Dna, Alphabet::Protein]),
        }
    }
}

impl BgOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.alphabets.is_empty() {
            return Err(OptionsError::NoAlphabets);
        }
        Ok(())
    }
}

/// Collects parser events and summarises them.
#[derive(Debug, Clone)]
pub struct BgSummary {
    options: BgOptions,
    file_size: u64,
    fraction: f64,
    format: Option<UnusableFormat>,
    encoding_error: Option<String>,
    alphabet: Alphabet,
    order: usize,
    entries: u64,
    syntax_errors: FileFaults,
    mismatches: FileFaults,
    duplicates: FileFaults,
    missing_count: usize,
    /// First few missing chains, by name.
    missing: Vec<String>,
    bad_sums: Vec<usize>,
}

impl BgSummary {
    pub fn new(options: BgOptions) -> Self {
        Self {
            options,
            file_size: 0,
            fraction: 0.0,
            format: None,
            encoding_error: None,
            alphabet: Alphabet::Unknown,
            order: 0,
            entries: 0,
            syntax_errors: FileFaults::default(),
            mismatches: FileFaults::default(),
            duplicates: FileFaults::default(),
            missing_count: 0,
            missing: Vec::new(),
            bad_sums: Vec::new(),
        }
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Markov order of the model.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of chains read.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            alphabet: Some(self.alphabet),
            ..Summary::default()
        };
        if let Some(max) = self.options.file_max {
            if self.file_size > max {
                let mb = (self.file_size as f64 / (1u64 << 20) as f64).round();
                summary.add_warning("Large file", vec![format!("File is {}MB", mb)]);
            }
        }
        if let Some(format) = &self.format {
            let message = match format.kind {
                FileKind::Encoding => format!("Bad encoding \"{}\"{}", format.name, ENCODING_HELP),
                FileKind::Binary => format!("Bad format \"{}\"{}", format.name, ENCODING_HELP),
                FileKind::Compressed => format!("Bad format \"{}\" - must be decompressed first", format.name),
            };
            summary.add_error(message, vec![]);
            return summary;
        }
        if let Some(error) = &self.encoding_error {
            summary.add_error(format!("Bad encoding{}", ENCODING_HELP), vec![error.clone()]);
            return summary;
        }

        if self.syntax_errors.faults() > 0 {
            summary.add_error(
                "Syntax errors",
                vec![format!(
                    "Incorrect syntax on {}{}",
                    line_word(&self.syntax_errors),
                    self.syntax_errors.lines_str()
                )],
            );
        }

        if self.mismatches.faults() > 0 {
            let letters = self.mismatches.letters_sep();
            let mut reason = if self.mismatches.faults() == 1 {
                format!(
                    "Found a character {}not in the detected {} alphabet on ",
                    if letters.is_empty() { String::new() } else { format!("{} ", letters) },
                    self.alphabet
                )
            } else {
                format!(
                    "Found {} characters {}not in the detected {} alphabet on ",
                    self.mismatches.faults(),
                    if letters.is_empty() { String::new() } else { format!("(including {}) ", letters) },
                    self.alphabet
                )
            };
            reason.push_str(line_word(&self.mismatches));
            reason.push_str(&self.mismatches.lines_str());
            summary.add_error("Alphabet is inconsistent", vec![reason]);
        }

        if self.duplicates.faults() > 0 {
            let reason = if self.duplicates.faults() == 1 {
                format!("Found a duplicated entry on line {}", self.duplicates.lines_str())
            } else {
                format!(
                    "Found {} duplicated entries on lines {}",
                    self.duplicates.faults(),
                    self.duplicates.lines_str()
                )
            };
            summary.add_error("Duplicated entries", vec![reason]);
        }

        if self.missing_count > 0 {
            let reason = if self.missing_count == 1 {
                format!("Did not find the entry for {}", self.missing.join(""))
            } else {
                format!(
                    "Did not find {} entries for {}",
                    self.missing_count,
                    list_str(&self.missing, self.missing_count)
                )
            };
            summary.add_error("Missing entries", vec![reason]);
        }

        if !self.bad_sums.is_empty() {
            let reason = if self.bad_sums.len() == 1 {
                format!(
                    "The probabilities did not sum to 1 for the entries of length {}",
                    self.bad_sums[0]
                )
            } else {
                let lengths: Vec<String> = self.bad_sums.iter().map(usize::to_string).collect();
                format!(
                    "The probabilities did not sum to 1 for multiple entry lengths {}",
                    list_str(&lengths, lengths.len())
                )
            };
            summary.add_error("Probabilities should sum to 1", vec![reason]);
        }

        if self.alphabet != Alphabet::Unknown && !self.options.alphabets.contains(self.alphabet) {
            summary.add_error(
                "Background is wrong alphabet",
                vec![format!(
                    "The background was {} but {} was expected",
                    self.alphabet, self.options.alphabets
                )],
            );
        }
        summary
    }
}

impl fmt::Display for BgSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {} {} background, {} entries", self.order, self.alphabet, self.entries)
    }
}

fn line_word(faults: &FileFaults) -> &'static str {
    if faults.line_count() == 1 {
        "line "
    } else {
        "lines "
    }
}

/// `a, b and c`, or `a, b, ...` when only part of `total` items is known.
fn list_str(items: &[String], total: usize) -> String {
    let shown = items.len().min(MISSING_SHOWN);
    if shown == total && shown > 1 {
        format!("{} and {}", items[..shown - 1].join(", "), items[shown - 1])
    } else {
        format!("{}, ...", items[..shown.min(MISSING_SHOWN - 1)].join(", "))
    }
}

impl BgEvents for BgSummary {
    fn begin(&mut self, file_size: u64) {
        *self = Self::new(self.options.clone());
        self.file_size = file_size;
    }

    fn progress(&mut self, fraction: f64, alphabet: Alphabet) {
        self.fraction = fraction;
        self.alphabet = alphabet;
    }

    fn info_chain(&mut self, _chain: &str, _probability: f64) {
        self.entries += 1;
    }

    fn error_syntax(&mut self, at: Position, _problem: BgSyntax) {
        self.syntax_errors.add(at.line, None);
    }

    fn error_mismatch(&mut self, at: Position, letter: char) {
        self.mismatches.add(at.line, Some(letter));
    }

    fn error_duplicate(&mut self, at: Position, _chain: &str) {
        self.duplicates.add(at.line, None);
    }

    fn error_missing(&mut self, _at: Position, alphabet: Alphabet, missing: &[usize]) {
        self.missing_count += missing.len();
        let room = MISSING_SHOWN.saturating_sub(self.missing.len());
        self.missing
            .extend(missing.iter().take(room).map(|&index| chain_name(alphabet, index)));
    }

    fn error_sum(&mut self, _at: Position, chain_len: usize, _total: f64) {
        self.bad_sums.push(chain_len);
    }

    fn error_format(&mut self, format: &UnusableFormat) {
        self.format = Some(*format);
    }

    fn error_encoding(&mut self, error: &EncodingError) {
        self.encoding_error = Some(error.to_string());
    }

    fn end(&mut self, alphabet: Alphabet, order: usize) {
        self.alphabet = alphabet;
        self.order = order;
        self.fraction = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::MemoryBlob;

    const DNA_ORDER_1: &str = "# order 0\nA 0.3\nC 0.2\nG 0.2\nT 0.3\n# order 1\n\
        AA 0.1\nAC 0.05\nAG 0.05\nAT 0.1\nCA 0.05\nCC 0.05\nCG 0.05\nCT 0.05\n\
        GA 0.05\nGC 0.05\nGG 0.05\nGT 0.05\nTA 0.1\nTC 0.05\nTG 0.05\nTT 0.1\n";

    fn summarize(options: BgOptions, text: &[u8], chunk_size: usize) -> (BgSummary, Summary) {
        let mut parser = BgParser::new(BgSummary::new(options));
        parser.parse_blob(&mut MemoryBlob::new(text), chunk_size).unwrap();
        let handler = parser.into_handler().unwrap();
        let summary = handler.summary();
        (handler, summary)
    }

    fn headlines(summary: &Summary) -> Vec<&str> {
        summary.messages.iter().map(|m| m.message.as_str()).collect()
    }

    #[test]
    fn test_chain_names() {
        assert_eq!(chain_name(Alphabet::Dna, 0), "A");
        assert_eq!(chain_name(Alphabet::Dna, 3), "T");
        assert_eq!(chain_name(Alphabet::Dna, 4), "AA");
        assert_eq!(chain_name(Alphabet::Dna, 5), "AC");
        assert_eq!(chain_name(Alphabet::Dna, 19), "TT");
        assert_eq!(chain_name(Alphabet::Dna, 20), "AAA");
        assert_eq!(chain_name(Alphabet::Protein, 19), "Y");
        assert_eq!(chain_name(Alphabet::Unknown, 2), "");
    }

    #[test]
    fn test_valid_dna_model() {
        for chunk_size in [3, 7, 4096] {
            let (handler, summary) = summarize(BgOptions::default(), DNA_ORDER_1.as_bytes(), chunk_size);
            assert!(summary.messages.is_empty(), "{:?}", summary.messages);
            assert_eq!(handler.alphabet(), Alphabet::Dna);
            assert_eq!(handler.order(), 1);
            assert_eq!(handler.entries(), 20);
        }
    }

    #[test]
    fn test_protein_model() {
        let letters = "ACDEFGHIKLMNPQRSTVWY";
        let text: String = letters.chars().map(|c| format!("{} 0.05\n", c)).collect();
        let (handler, summary) = summarize(BgOptions::default(), text.as_bytes(), 16);
        assert!(summary.messages.is_empty(), "{:?}", summary.messages);
        assert_eq!(handler.alphabet(), Alphabet::Protein);
        assert_eq!(handler.order(), 0);
        assert_eq!(handler.to_string(), "order 0 protein background, 20 entries");
    }

    #[test]
    fn test_missing_and_sum() {
        let (_, summary) = summarize(BgOptions::default(), b"A 0.3\nC 0.2\nT 0.3\n", 4096);
        assert_eq!(headlines(&summary), vec!["Missing entries"]);
        assert_eq!(summary.messages[0].reasons, vec!["Did not find the entry for G"]);

        let (_, summary) = summarize(BgOptions::default(), b"A 0.5\nC 0.5\nG 0.5\nT 0.5\n", 4096);
        assert_eq!(headlines(&summary), vec!["Probabilities should sum to 1"]);
        assert_eq!(
            summary.messages[0].reasons,
            vec!["The probabilities did not sum to 1 for the entries of length 1"]
        );
    }

    #[test]
    fn test_missing_second_order() {
        let text = "A 0.25\nC 0.25\nG 0.25\nT 0.25\nAA 0.5\nAC 0.5\n";
        let (handler, summary) = summarize(BgOptions::default(), text.as_bytes(), 4096);
        assert_eq!(handler.order(), 1);
        assert_eq!(headlines(&summary), vec!["Missing entries"]);
        assert_eq!(
            summary.messages[0].reasons,
            vec!["Did not find 14 entries for AG, AT, CA, CC, CG, CT, GA, GC, GG, GT, ..."]
        );
    }

    #[test]
    fn test_syntax_problems() {
        let text = "A 0.3\n0.2\nC0.2\nG 1.5\nT\n";
        let (_, summary) = summarize(BgOptions::default(), text.as_bytes(), 4096);
        assert_eq!(headlines(&summary), vec!["Syntax errors", "Missing entries"]);
        assert_eq!(summary.messages[0].reasons, vec!["Incorrect syntax on lines 2-5"]);
    }

    #[test]
    fn test_duplicates_and_mismatch() {
        let text = "A 0.3\nC 0.2\nG 0.2\nT 0.3\nA 0.3\nAD 0.1\n";
        let (handler, summary) = summarize(BgOptions::default(), text.as_bytes(), 5);
        assert_eq!(handler.alphabet(), Alphabet::Dna);
        assert_eq!(
            headlines(&summary),
            vec!["Alphabet is inconsistent", "Duplicated entries", "Missing entries"]
        );
        assert_eq!(
            summary.messages[0].reasons,
            vec!["Found a character 'D' not in the detected DNA alphabet on line 6"]
        );
        assert_eq!(summary.messages[1].reasons, vec!["Found a duplicated entry on line 5"]);
    }

    #[test]
    fn test_wrong_alphabet() {
        let options = BgOptions {
            alphabets: AlphabetSet::of(&[Alphabet::Protein]),
            ..BgOptions::default()
        };
        let (_, summary) = summarize(options, b"A 0.25\nC 0.25\nG 0.25\nT 0.25\n", 4096);
        assert_eq!(headlines(&summary), vec!["Background is wrong alphabet"]);
        assert_eq!(summary.messages[0].reasons, vec!["The background was DNA but protein was expected"]);
    }

    #[test]
    fn test_unusable_files() {
        let (_, summary) = summarize(BgOptions::default(), &[0x1F, 0x8B, 0x08, 0x00], 4096);
        assert_eq!(headlines(&summary), vec!["Bad format \"GZIP archive\" - must be decompressed first"]);

        let (_, summary) = summarize(BgOptions::default(), b"A 0.25\nC \xFF0.25\n", 4096);
        assert_eq!(summary.messages.len(), 1);
        assert!(summary.messages[0].message.starts_with("Bad encoding"));
    }

    #[test]
    fn test_large_file_warning() {
        let options = BgOptions {
            file_max: Some(8),
            ..BgOptions::default()
        };
        let (_, summary) = summarize(options, b"A 0.25\nC 0.25\nG 0.25\nT 0.25\n", 4096);
        assert!(!summary.error);
        assert!(summary.warning);
        assert_eq!(headlines(&summary), vec!["Large file"]);
    }

    #[test]
    fn test_options_validation() {
        assert!(BgOptions::default().validate().is_ok());
        let options = BgOptions {
            alphabets: AlphabetSet::EMPTY,
            ..BgOptions::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::NoAlphabets));
    }

    #[test]
    fn test_cancel() {
        let mut parser = BgParser::new(BgSummary::new(BgOptions::default()));
        parser.cancel();
        let flow = parser
            .parse_blob(&mut MemoryBlob::new(DNA_ORDER_1.as_bytes()), 8)
            .unwrap();
        assert_eq!(flow, Flow::Cancelled);
        assert!(parser.into_handler().is_none());
    }
}
