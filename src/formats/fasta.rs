//! Streaming FASTA checker.
//!
//! This module validates FASTA files chunk by chunk without keeping the
//! sequences. It checks record structure, classifies every sequence
//! character against the allowed alphabets and reports what it finds to a
//! [`FastaEvents`] handler. It also understands the MEME `WEIGHTS`
//! extension.
//!
//! ## FASTA Format
//!
//! ```text
//! >sequence_identifier optional description
//! ACGTACGTACGT...
//! ;comment lines are reported but tolerated
//! >WEIGHTS 0.5 1 0.25
//! >another_sequence
//! TGCATGCATGCA...
//! ```

use std::ops::{BitAnd, BitOr};

use crate::alphabet::{Alphabet, AlphabetSet};
use crate::chunked::{self, Blob, CancelToken, ChunkConsumer, Flow};
use crate::decoder::{EncodingError, LineDecoder};
use crate::formats::fasta_summary::FastaOptions;
use crate::formats::{unusable_format, UnusableFormat};
use crate::CheckError;

/// Bytes of the first chunk scanned for NUL bytes.
const FORMAT_SCAN: usize = 400;

/// Character class bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharClass(u16);

impl CharClass {
    /// A character not in the alphabet and not whitespace.
    pub const NON_ALPHA: CharClass = CharClass(1);
    /// A character in the current alphabet.
    pub const ALPHA: CharClass = CharClass(2);
    /// A character that should never appear.
    pub const NUL: CharClass = CharClass(3);
    // the next four combine with ALPHA
    pub const LOWERCASE: CharClass = CharClass(4);
    pub const MASK: CharClass = CharClass(8);
    pub const AMBIGUOUS: CharClass = CharClass(16);
    pub const GAP: CharClass = CharClass(32);
    // both of these are also NON_ALPHA
    pub const CHEVRON: CharClass = CharClass(64);
    pub const COMMENT: CharClass = CharClass(128);
    pub const WHITESPACE: CharClass = CharClass(256);
    pub const NEWLINE: CharClass = CharClass(512);

    const NONE: CharClass = CharClass(0);

    /// True when any of the bits in `other` are set.
    pub fn has(self, other: CharClass) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for CharClass {
    type Output = CharClass;

    fn bitor(self, rhs: CharClass) -> CharClass {
        CharClass(self.0 | rhs.0)
    }
}

impl BitAnd for CharClass {
    type Output = CharClass;

    fn bitand(self, rhs: CharClass) -> CharClass {
        CharClass(self.0 & rhs.0)
    }
}

/// Where a character sits in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub offset: u64,
    pub line: u64,
    pub column: u64,
}

/// A sequence record, complete or in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqInfo<'a> {
    /// Byte offset of the `>`.
    pub offset: u64,
    /// Line of the `>`.
    pub line: u64,
    pub name: &'a str,
    pub desc_len: u64,
    /// Sequence characters read so far.
    pub seq_len: u64,
}

/// Receives what the checker finds. Every method defaults to doing nothing.
pub trait FastaEvents {
    /// Checking starts on a file of `file_size` bytes.
    fn begin(&mut self, _file_size: u64) {}

    fn progress(&mut self, _fraction: f64, _alphabet: Alphabet) {}

    /// A complete sequence record.
    fn info_seq(&mut self, _seq: &SeqInfo<'_>) {}

    /// A `;` comment line.
    fn info_comment(&mut self, _offset: u64, _line: u64) {}

    /// A `>WEIGHTS` record holding `count` weights.
    fn info_weights(&mut self, _offset: u64, _line: u64, _count: u64) {}

    /// Text outside any record.
    fn warn_junk(&mut self, _at: Position, _class: CharClass, _ch: char) {}

    /// A sequence character that is not allowed.
    fn warn_seq(&mut self, _at: Position, _seq: &SeqInfo<'_>, _class: CharClass, _ch: char) {}

    /// A weight outside (0, 1].
    fn warn_weight(&mut self, _at: Position, _text: &str) {}

    /// A `>` that is not at the start of a line.
    fn warn_chevron(&mut self, _at: Position) {}

    /// The file is not plain text. Checking stops.
    fn error_format(&mut self, _format: &UnusableFormat) {}

    /// The file is not valid UTF-8. Checking stops.
    fn error_encoding(&mut self, _error: &EncodingError) {}

    /// Checking finished, possibly early.
    fn end(&mut self, _alphabet: Alphabet) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Name,
    Description,
    Sequence,
    Comment,
    Weights,
    PostWeights,
}

/// The FASTA state machine.
///
/// Feed it with [`check_blob`](Self::check_blob), or drive it yourself
/// through its [`ChunkConsumer`] implementation.
pub struct FastaChecker<H: FastaEvents> {
    handler: Option<H>,
    cancel: CancelToken,
    enable_weights: bool,
    alpha_map: [CharClass; 128],
    alpha_bitmask: CharClass,
    letter_counts: [u64; 27],
    decoder: LineDecoder,
    state: State,
    after_comment: State,
    file_size: u64,
    file_name: Option<String>,
    seq_byte_offset: u64,
    seq_line: u64,
    seq_name: String,
    seq_desc_len: u64,
    seq_offset: u64,
    weight: String,
    weight_pos: Position,
    weight_count: u64,
}

impl<H: FastaEvents> FastaChecker<H> {
    pub fn new(options: &FastaOptions, handler: H) -> Self {
        Self::with_cancel_token(options, handler, CancelToken::new())
    }

    /// Creates a checker that stops when `cancel` is triggered, for example
    /// by the handler itself or by another thread.
    pub fn with_cancel_token(options: &FastaOptions, handler: H, cancel: CancelToken) -> Self {
        let allowed = options.alphabets;
        let dna_only = !allowed.is_empty() && !allowed.contains(Alphabet::Protein);
        let protein_only = allowed == AlphabetSet::of(&[Alphabet::Protein]);
        let masking = options.masking || options.ambigs;
        let mut alpha_bitmask = CharClass::NONE;
        if !masking {
            alpha_bitmask = alpha_bitmask | CharClass::MASK;
        }
        if !options.ambigs {
            alpha_bitmask = alpha_bitmask | CharClass::AMBIGUOUS;
        }
        if !options.gaps {
            alpha_bitmask = alpha_bitmask | CharClass::GAP;
        }
        if options.uppercase {
            alpha_bitmask = alpha_bitmask | CharClass::LOWERCASE;
        }
        Self {
            handler: Some(handler),
            cancel,
            enable_weights: options.weights,
            alpha_map: make_alpha_map(dna_only, protein_only),
            alpha_bitmask,
            letter_counts: [0; 27],
            decoder: LineDecoder::new(),
            state: State::Start,
            after_comment: State::Start,
            file_size: 0,
            file_name: None,
            seq_byte_offset: 0,
            seq_line: 0,
            seq_name: String::new(),
            seq_desc_len: 0,
            seq_offset: 0,
            weight: String::new(),
            weight_pos: Position { offset: 0, line: 0, column: 0 },
            weight_count: 0,
        }
    }

    /// A token that cancels this checker when triggered.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops checking and drops the handler; no further events are sent.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.handler = None;
    }

    pub fn handler(&self) -> Option<&H> {
        self.handler.as_ref()
    }

    /// Gives back the handler, unless the checker was cancelled.
    pub fn into_handler(self) -> Option<H> {
        if self.cancel.is_cancelled() {
            None
        } else {
            self.handler
        }
    }

    /// Checks a whole blob, `chunk_size` bytes at a time.
    pub fn check_blob<B: Blob + ?Sized>(&mut self, blob: &mut B, chunk_size: usize) -> Result<Flow, CheckError> {
        log::info!("Checking FASTA file {} ({} bytes)", blob.name().unwrap_or("<memory>"), blob.size());
        let flow = chunked::drive(blob, self, chunk_size)?;
        log::info!("FASTA check finished: {:?}", flow);
        Ok(flow)
    }

    /// Guesses the alphabet from the letters seen so far.
    ///
    /// More than 90% A, C, G, T, U or N means nucleotides: DNA unless U
    /// outnumbers T. Anything else is protein.
    pub fn guess_alphabet(&self) -> Alphabet {
        let total: u64 = self.letter_counts.iter().sum();
        if total == 0 {
            return Alphabet::Unknown;
        }
        let count = |letter: u8| self.letter_counts[(letter - b'A' + 1) as usize];
        let acgtun = count(b'A') + count(b'C') + count(b'G') + count(b'T') + count(b'N') + count(b'U');
        if acgtun as f64 / total as f64 > 0.9 {
            if count(b'T') >= count(b'U') {
                Alphabet::Dna
            } else {
                Alphabet::Rna
            }
        } else {
            Alphabet::Protein
        }
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

    fn at_line_start(&self) -> bool {
        self.decoder.column() == 0
    }

    fn report_seq_info(&mut self) {
        let seq = SeqInfo {
            offset: self.seq_byte_offset,
            line: self.seq_line,
            name: &self.seq_name,
            desc_len: self.seq_desc_len,
            seq_len: self.seq_offset,
        };
        if let Some(h) = live_handler(&mut self.handler, &self.cancel) {
            h.info_seq(&seq);
        }
    }

    fn start_record(&mut self) {
        self.state = State::Name;
        self.seq_name.clear();
        self.seq_desc_len = 0;
        self.seq_offset = 0;
        self.seq_byte_offset = self.decoder.offset();
        self.seq_line = self.decoder.line();
    }

    fn start_comment(&mut self, resume: State) {
        self.after_comment = resume;
        self.state = State::Comment;
        let (offset, line) = (self.decoder.offset(), self.decoder.line());
        if let Some(h) = self.live() {
            h.info_comment(offset, line);
        }
    }

    fn warn_chevron(&mut self, class: CharClass) {
        if class.has(CharClass::CHEVRON) {
            let at = self.position();
            if let Some(h) = self.live() {
                h.warn_chevron(at);
            }
        }
    }

    fn step(&mut self, codepoint: u32) {
        let class = if codepoint < 128 {
            self.alpha_map[codepoint as usize]
        } else {
            CharClass::NON_ALPHA
        };
        let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
        match self.state {
            State::Start => self.process_outside(State::Start, class, ch),
            State::PostWeights => self.process_outside(State::PostWeights, class, ch),
            State::Comment => {
                if class.has(CharClass::NEWLINE) {
                    self.state = self.after_comment;
                }
            }
            State::Name => self.process_name(class, ch),
            State::Description => {
                if class.has(CharClass::NEWLINE) {
                    self.state = State::Sequence;
                } else {
                    self.seq_desc_len += 1;
                    self.warn_chevron(class);
                }
            }
            State::Weights => self.process_weights(class, ch),
            State::Sequence => self.process_sequence(codepoint, class, ch),
        }
    }

    /// Before the first record or after a weights line.
    fn process_outside(&mut self, current: State, class: CharClass, ch: char) {
        if self.at_line_start() && class.has(CharClass::CHEVRON) {
            self.start_record();
        } else if self.at_line_start() && class.has(CharClass::COMMENT) {
            self.start_comment(current);
        } else if class.has(CharClass::ALPHA | CharClass::NON_ALPHA) {
            self.warn_chevron(class);
            let at = self.position();
            if let Some(h) = self.live() {
                h.warn_junk(at, class, ch);
            }
        }
    }

    fn process_name(&mut self, class: CharClass, ch: char) {
        if !class.has(CharClass::WHITESPACE | CharClass::NEWLINE) {
            self.warn_chevron(class);
            self.seq_name.push(ch);
            return;
        }
        if self.enable_weights && self.seq_name == "WEIGHTS" {
            if class.has(CharClass::NEWLINE) {
                let (offset, line) = (self.seq_byte_offset, self.seq_line);
                if let Some(h) = self.live() {
                    h.info_weights(offset, line, 0);
                }
                self.state = State::PostWeights;
            } else {
                self.state = State::Weights;
                self.weight.clear();
                self.weight_count = 0;
            }
            return;
        }
        if class.has(CharClass::WHITESPACE) {
            self.seq_desc_len = 0;
            self.state = State::Description;
        } else {
            self.state = State::Sequence;
        }
    }

    fn process_weights(&mut self, class: CharClass, ch: char) {
        if !class.has(CharClass::WHITESPACE | CharClass::NEWLINE) {
            if self.weight.is_empty() {
                self.weight_pos = self.position();
            }
            self.weight.push(ch);
            return;
        }
        self.finish_weight();
        if class.has(CharClass::NEWLINE) {
            self.end_weights();
        }
    }

    fn finish_weight(&mut self) {
        if self.weight.is_empty() {
            return;
        }
        self.weight_count += 1;
        if !is_valid_weight(&self.weight) {
            let at = self.weight_pos;
            if let Some(h) = live_handler(&mut self.handler, &self.cancel) {
                h.warn_weight(at, &self.weight);
            }
        }
        self.weight.clear();
    }

    fn end_weights(&mut self) {
        let (offset, line, count) = (self.seq_byte_offset, self.seq_line, self.weight_count);
        if let Some(h) = self.live() {
            h.info_weights(offset, line, count);
        }
        self.state = State::PostWeights;
    }

    fn process_sequence(&mut self, codepoint: u32, class: CharClass, ch: char) {
        if class.has(CharClass::ALPHA) {
            if class.has(self.alpha_bitmask) {
                self.warn_seq(class, ch);
            }
            self.count_letter(codepoint);
        } else if self.at_line_start() && class.has(CharClass::CHEVRON) {
            self.report_seq_info();
            self.start_record();
        } else if self.at_line_start() && class.has(CharClass::COMMENT) {
            self.start_comment(State::Sequence);
        } else if class.has(CharClass::NON_ALPHA) {
            self.warn_chevron(class);
            self.warn_seq(class, ch);
            self.count_letter(codepoint);
        }
        // whitespace and newlines are ignored
    }

    fn warn_seq(&mut self, class: CharClass, ch: char) {
        let at = self.position();
        let seq = SeqInfo {
            offset: self.seq_byte_offset,
            line: self.seq_line,
            name: &self.seq_name,
            desc_len: self.seq_desc_len,
            seq_len: self.seq_offset,
        };
        if let Some(h) = live_handler(&mut self.handler, &self.cancel) {
            h.warn_seq(at, &seq, class, ch);
        }
    }

    fn count_letter(&mut self, codepoint: u32) {
        self.seq_offset += 1;
        let index = match codepoint {
            c @ 0x41..=0x5A => (c - 0x41 + 1) as usize,
            c @ 0x61..=0x7A => (c - 0x61 + 1) as usize,
            _ => 0,
        };
        self.letter_counts[index] += 1;
    }

    fn finish_file(&mut self) {
        if self.state == State::Comment {
            self.state = self.after_comment;
        }
        if self.state == State::Name && self.enable_weights && self.seq_name == "WEIGHTS" {
            let (offset, line) = (self.seq_byte_offset, self.seq_line);
            if let Some(h) = self.live() {
                h.info_weights(offset, line, 0);
            }
            self.state = State::PostWeights;
        }
        if self.state == State::Weights {
            self.finish_weight();
            self.end_weights();
        }
        if matches!(self.state, State::Name | State::Description | State::Sequence) {
            self.report_seq_info();
        }
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        let alphabet = self.guess_alphabet();
        if let Some(h) = self.live() {
            h.progress(1.0, alphabet);
            h.end(alphabet);
        }
    }
}

impl<H: FastaEvents> ChunkConsumer for FastaChecker<H> {
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
        let alphabet = self.guess_alphabet();
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
            match self.decoder.next() {
                Ok(Some(codepoint)) => {
                    self.step(codepoint);
                    if self.cancel.is_cancelled() {
                        self.handler = None;
                        log::debug!("FASTA check cancelled");
                        return Ok(Flow::Cancelled);
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    log::debug!("Encoding error: {}", error);
                    if let Some(h) = self.live() {
                        h.error_encoding(&error);
                    }
                    self.signal_stop();
                    return Ok(Flow::Finished);
                }
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

/// Returns the handler unless the token has been triggered, in which case
/// the handler is dropped for good.
pub(crate) fn live_handler<'a, H>(handler: &'a mut Option<H>, cancel: &CancelToken) -> Option<&'a mut H> {
    if cancel.is_cancelled() {
        *handler = None;
    }
    handler.as_mut()
}

/// A weight is `0` or `1` optionally followed by decimals, with a value in
/// (0, 1].
fn is_valid_weight(text: &str) -> bool {
    let (int, frac) = match text.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (text, ""),
    };
    if int != "0" && int != "1" || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    matches!(text.parse::<f64>(), Ok(w) if w > 0.0 && w <= 1.0)
}

fn add_letters(map: &mut [CharClass; 128], letters: &str, class: CharClass) {
    for b in letters.bytes() {
        map[b as usize] = class;
        let lower = b.to_ascii_lowercase();
        if lower != b {
            map[lower as usize] = class | CharClass::LOWERCASE;
        }
    }
}

fn make_alpha_map(dna_only: bool, protein_only: bool) -> [CharClass; 128] {
    let mut map = [CharClass::NON_ALPHA; 128];
    map[0] = CharClass::NUL;
    if dna_only {
        // U is accepted so RNA can share the DNA checks
        add_letters(&mut map, "ACGTU", CharClass::ALPHA);
        add_letters(&mut map, "N", CharClass::ALPHA | CharClass::MASK);
        add_letters(&mut map, "RYKMSWBDHV", CharClass::ALPHA | CharClass::AMBIGUOUS);
    } else if protein_only {
        // O and U are unsupported
        add_letters(&mut map, "ACDEFGHIKLMNPQRSTVWY", CharClass::ALPHA);
        add_letters(&mut map, "X", CharClass::ALPHA | CharClass::MASK);
        add_letters(&mut map, "BZ", CharClass::ALPHA | CharClass::AMBIGUOUS);
    } else {
        // everything but J and O
        add_letters(&mut map, "ABCDEFGHIKLMNPQRSTUVWXYZ", CharClass::ALPHA);
    }
    add_letters(&mut map, ".-", CharClass::ALPHA | CharClass::GAP);
    add_letters(&mut map, " \t\x0C", CharClass::WHITESPACE);
    add_letters(&mut map, "\n\r", CharClass::NEWLINE);
    map[b'>' as usize] = CharClass::CHEVRON | CharClass::NON_ALPHA;
    map[b';' as usize] = CharClass::COMMENT | CharClass::NON_ALPHA;
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::MemoryBlob;
    use rand::Rng;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Begin(u64),
        Seq { line: u64, name: String, desc_len: u64, seq_len: u64 },
        Comment(u64),
        Weights(u64, u64),
        Junk(u64, u64, char),
        BadSeq(u64, u64, String, char),
        BadWeight(u64, String),
        Chevron(u64, u64),
        Format(&'static str),
        Encoding(u64),
        End(Alphabet),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl FastaEvents for Recorder {
        fn begin(&mut self, size: u64) {
            self.events.push(Event::Begin(size));
        }
        fn info_seq(&mut self, seq: &SeqInfo<'_>) {
            self.events.push(Event::Seq {
                line: seq.line,
                name: seq.name.to_string(),
                desc_len: seq.desc_len,
                seq_len: seq.seq_len,
            });
        }
        fn info_comment(&mut self, _offset: u64, line: u64) {
            self.events.push(Event::Comment(line));
        }
        fn info_weights(&mut self, _offset: u64, line: u64, count: u64) {
            self.events.push(Event::Weights(line, count));
        }
        fn warn_junk(&mut self, at: Position, _class: CharClass, ch: char) {
            self.events.push(Event::Junk(at.line, at.column, ch));
        }
        fn warn_seq(&mut self, at: Position, seq: &SeqInfo<'_>, _class: CharClass, ch: char) {
            self.events.push(Event::BadSeq(at.line, at.column, seq.name.to_string(), ch));
        }
        fn warn_weight(&mut self, at: Position, text: &str) {
            self.events.push(Event::BadWeight(at.column, text.to_string()));
        }
        fn warn_chevron(&mut self, at: Position) {
            self.events.push(Event::Chevron(at.line, at.column));
        }
        fn error_format(&mut self, format: &UnusableFormat) {
            self.events.push(Event::Format(format.name));
        }
        fn error_encoding(&mut self, error: &EncodingError) {
            self.events.push(Event::Encoding(error.offset()));
        }
        fn end(&mut self, alphabet: Alphabet) {
            self.events.push(Event::End(alphabet));
        }
    }

    fn check_with(options: &FastaOptions, text: &[u8], chunk_size: usize) -> (Vec<Event>, Alphabet) {
        let mut checker = FastaChecker::new(options, Recorder::default());
        checker.check_blob(&mut MemoryBlob::new(text), chunk_size).unwrap();
        let alphabet = checker.guess_alphabet();
        (checker.into_handler().unwrap().events, alphabet)
    }

    fn check(text: &str) -> Vec<Event> {
        check_with(&FastaOptions::default(), text.as_bytes(), 1024).0
    }

    fn seq(line: u64, name: &str, desc_len: u64, seq_len: u64) -> Event {
        Event::Seq { line, name: name.to_string(), desc_len, seq_len }
    }

    #[test]
    fn test_two_records() {
        let events = check(">seq1 desc\nACGTACGT\n>seq2\nACGNACGT\n");
        assert_eq!(
            events,
            vec![
                Event::Begin(35),
                seq(0, "seq1", 4, 8),
                seq(2, "seq2", 0, 8),
                Event::End(Alphabet::Dna),
            ]
        );
    }

    #[test]
    fn test_alphabet_guesses() {
        let guess = |text: &str| check_with(&FastaOptions::default(), text.as_bytes(), 1024).1;
        assert_eq!(guess(">a\nACGTACGTTTGCA\n"), Alphabet::Dna);
        assert_eq!(guess(">a\nACGUACGUUUGCA\n"), Alphabet::Rna);
        assert_eq!(guess(">a\nACGTUACGTU\n"), Alphabet::Dna);
        assert_eq!(guess(">a\nEFILPQEFILPQACGT\n"), Alphabet::Protein);
        assert_eq!(guess(">a\n\n"), Alphabet::Unknown);
    }

    #[test]
    fn test_junk_and_chevrons() {
        let events = check("hi\n>s1 x>y\nACGTACGTAC>GT\n");
        assert_eq!(
            events[1..],
            [
                Event::Junk(0, 0, 'h'),
                Event::Junk(0, 1, 'i'),
                Event::Chevron(1, 5),
                Event::Chevron(2, 10),
                Event::BadSeq(2, 10, "s1".to_string(), '>'),
                seq(1, "s1", 3, 13),
                Event::End(Alphabet::Dna),
            ]
        );
    }

    #[test]
    fn test_comments() {
        let events = check(";first\n>s1\nAC\n;mid\nGT\n");
        assert_eq!(
            events[1..],
            [
                Event::Comment(0),
                Event::Comment(3),
                seq(1, "s1", 0, 4),
                Event::End(Alphabet::Dna),
            ]
        );
    }

    #[test]
    fn test_weights() {
        let events = check(">WEIGHTS 0.5 1  0 1.5 x\n>s1\nACGT\n>WEIGHTS\n");
        assert_eq!(
            events[1..],
            [
                Event::BadWeight(16, "0".to_string()),
                Event::BadWeight(18, "1.5".to_string()),
                Event::BadWeight(22, "x".to_string()),
                Event::Weights(0, 5),
                seq(1, "s1", 0, 4),
                Event::Weights(3, 0),
                Event::End(Alphabet::Dna),
            ]
        );
    }

    #[test]
    fn test_weights_disabled() {
        let options = FastaOptions { weights: false, ..FastaOptions::default() };
        let (events, _) = check_with(&options, b">WEIGHTS 0.5\nACGT\n", 64);
        assert_eq!(events[1], seq(0, "WEIGHTS", 3, 4));
    }

    #[test]
    fn test_restricted_alphabet_flags() {
        let options = FastaOptions {
            alphabets: AlphabetSet::of(&[Alphabet::Dna]),
            ambigs: false,
            masking: false,
            uppercase: true,
            ..FastaOptions::default()
        };
        let (events, _) = check_with(&options, b">s\nACGTNRac-X\n", 64);
        let bad: Vec<char> = events
            .iter()
            .filter_map(|e| match e {
                Event::BadSeq(_, _, _, c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(bad, vec!['N', 'R', 'a', 'c', '-', 'X']);
    }

    #[test]
    fn test_binary_and_encoding_errors() {
        let (events, _) = check_with(&FastaOptions::default(), &[0x1F, 0x8B, 0x08, 0, 0], 1024);
        assert_eq!(events[1..], [Event::Format("GZIP archive"), Event::End(Alphabet::Unknown)]);

        let (events, _) = check_with(&FastaOptions::default(), b">s\nAC\xFFGT\n", 1024);
        assert_eq!(events[1..], [Event::Encoding(5), Event::End(Alphabet::Dna)]);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let events = check(">s1 d\nACGT");
        assert_eq!(events[1], seq(0, "s1", 1, 4));
        let events = check(">s1");
        assert_eq!(events[1], seq(0, "s1", 0, 0));
    }

    #[test]
    fn test_chunk_splits_give_same_events() {
        let text = ">seq1 some d\u{e9}scription\r\nACGTNNNN\r\nacgt>x\r\n;note\r\n>WEIGHTS 0.1 0.2\r\n>seq2\r\nAC-GT\u{3b1}\r\n";
        let options = FastaOptions {
            alphabets: AlphabetSet::of(&[Alphabet::Dna]),
            masking: false,
            ambigs: false,
            ..FastaOptions::default()
        };
        let (whole, _) = check_with(&options, text.as_bytes(), 4096);
        let mut rng = rand::rng();
        for _ in 0..50 {
            let chunk_size = rng.random_range(1..=16);
            let (events, _) = check_with(&options, text.as_bytes(), chunk_size);
            assert_eq!(events, whole, "chunk size {}", chunk_size);
        }
    }

    /// Panics if called once the shared flag is set.
    struct Tripwire {
        cancelled: Rc<RefCell<bool>>,
        token: CancelToken,
        seqs: usize,
    }

    impl Tripwire {
        fn guard(&self) {
            assert!(!*self.cancelled.borrow(), "handler called after cancel");
        }
    }

    impl FastaEvents for Tripwire {
        fn progress(&mut self, _fraction: f64, _alphabet: Alphabet) {
            self.guard();
        }
        fn info_seq(&mut self, _seq: &SeqInfo<'_>) {
            self.guard();
            self.seqs += 1;
            if self.seqs == 3 {
                self.token.cancel();
                *self.cancelled.borrow_mut() = true;
            }
        }
        fn warn_seq(&mut self, _at: Position, _seq: &SeqInfo<'_>, _class: CharClass, _ch: char) {
            self.guard();
        }
        fn end(&mut self, _alphabet: Alphabet) {
            self.guard();
        }
    }

    #[test]
    fn test_cancel_stops_callbacks() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!(">s{}\nAC%GT\n", i));
        }
        let cancelled = Rc::new(RefCell::new(false));
        let token = CancelToken::new();
        let handler = Tripwire { cancelled: cancelled.clone(), token: token.clone(), seqs: 0 };
        let mut checker = FastaChecker::with_cancel_token(&FastaOptions::default(), handler, token);
        let flow = checker.check_blob(&mut MemoryBlob::new(text.as_bytes()), 64).unwrap();
        assert_eq!(flow, Flow::Cancelled);
        assert!(*cancelled.borrow());
        assert!(checker.handler().is_none());
        assert!(checker.into_handler().is_none());
    }

    #[test]
    fn test_cancel_before_start() {
        let mut checker = FastaChecker::new(&FastaOptions::default(), Recorder::default());
        checker.cancel();
        let flow = checker.check_blob(&mut MemoryBlob::new(b">s\nACGT\n"), 64).unwrap();
        assert_eq!(flow, Flow::Cancelled);
        assert!(checker.into_handler().is_none());
    }

    #[test]
    fn test_weight_validation() {
        assert!(is_valid_weight("1"));
        assert!(is_valid_weight("1.000"));
        assert!(is_valid_weight("0.25"));
        assert!(is_valid_weight("0.5"));
        assert!(!is_valid_weight("0"));
        assert!(!is_valid_weight("0.0"));
        assert!(!is_valid_weight("1.5"));
        assert!(!is_valid_weight(".5"));
        assert!(!is_valid_weight("2"));
        assert!(!is_valid_weight("0.5e1"));
    }
}
