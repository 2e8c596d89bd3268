//! Plain-text MEME motif parser.
//!
//! The format is line oriented:
//!
//! ```text
//! MEME version 4
//!
//! ALPHABET= ACGT
//! strands: + -
//!
//! Background letter frequencies
//! A 0.303 C 0.183 G 0.209 T 0.306
//!
//! MOTIF crp alternate_name
//! letter-probability matrix: alength= 4 w= 2 nsites= 17 E= 4.1e-009
//!  0.000000  0.176471  0.000000  0.823529
//!  0.000000  0.058824  0.647059  0.294118
//! ```
//!
//! Lines are assembled from decoded codepoints, so a line may span any number
//! of chunks. Old MEME HTML output embeds the same text and repeats each
//! motif introduction; a repeated `MOTIF` line only starts a new motif when
//! it has the same kind (`MOTIF` or `BL MOTIF`) as the first one.

use std::mem;

use crate::alphabet::Alphabet;
use crate::decoder::Utf8Decoder;
use crate::model::{Matrix, Motif, MotifMeta, Strands};
use crate::motif::utils::{self, Counts};
use crate::motif::{MotifError, MotifResult, MotifSink, ParserFault, StreamingMotifParser, RATING_MOTIF, RATING_NONE};
use crate::report::Message;

/// Matrix rows are printed with six decimals.
const ROW_TOLERANCE: f64 = 0.00001;
const BACKGROUND_TOLERANCE: f64 = 0.1;
/// A line is reprocessed at most this many times after state changes.
const MAX_REPROCESS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FindVersion,
    PreMotif,
    /// Reading letter/frequency pairs; `true` when they are the background.
    InFreqs(bool),
    InMotif,
    InPspm,
    InPssm,
    AfterMotifs,
}

#[derive(Debug, Default)]
struct PendingMotif {
    id: Option<String>,
    alt: Option<String>,
    len: Option<usize>,
    sites: Option<f64>,
    evalue: Option<f64>,
    url: Option<String>,
    pspm: Option<Matrix>,
    pssm: Option<Matrix>,
}

/// Which header keys a matrix line may carry.
struct MatrixKeys {
    sites: bool,
}

#[derive(Debug)]
pub struct TextMotifParser {
    decoder: Utf8Decoder,
    line: String,
    state: State,
    stopped: bool,
    sent_meta: bool,
    is_html: bool,
    started_with_bl_line: Option<bool>,
    counter: usize,
    sum: f64,
    version: Option<String>,
    alphabet: Alphabet,
    strands: Option<Strands>,
    background_source: Option<String>,
    background: Option<Vec<f64>>,
    motif: PendingMotif,
    errors: Vec<Message>,
    rating: u8,
}

impl Default for TextMotifParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMotifParser {
    pub fn new() -> Self {
        Self {
            decoder: Utf8Decoder::new(),
            line: String::new(),
            state: State::FindVersion,
            stopped: false,
            sent_meta: false,
            is_html: false,
            started_with_bl_line: None,
            counter: 0,
            sum: 0.0,
            version: None,
            alphabet: Alphabet::Unknown,
            strands: None,
            background_source: None,
            background: None,
            motif: PendingMotif::default(),
            errors: Vec::new(),
            rating: RATING_NONE,
        }
    }

    /// Where the background came from, when the file says.
    pub fn background_source(&self) -> Option<&str> {
        self.background_source.as_deref()
    }

    fn end_line(&mut self, sink: &mut dyn MotifSink) {
        let mut line = mem::take(&mut self.line);
        if line.starts_with('\r') {
            line.remove(0);
        }
        if line.ends_with('\r') {
            line.pop();
        }
        for _ in 0..MAX_REPROCESS {
            match self.process_line(&line, sink) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(error) => {
                    log::debug!("Text motif parser stopped: {}", error);
                    self.errors.push(error.to_message());
                    self.stopped = true;
                    break;
                }
            }
        }
        line.clear();
        // reuse the allocation
        self.line = line;
    }

    /// Returns false when the line must be processed again in the new state.
    fn process_line(&mut self, line: &str, sink: &mut dyn MotifSink) -> MotifResult<bool> {
        match self.state {
            State::FindVersion => Ok(self.find_version(line)),
            State::PreMotif => self.pre_motif(line),
            State::InFreqs(is_background) => self.in_freqs(line, is_background),
            State::InMotif => self.in_motif(line, sink),
            State::InPspm => self.in_matrix(line, true),
            State::InPssm => self.in_matrix(line, false),
            State::AfterMotifs => Ok(true),
        }
    }

    fn find_version(&mut self, line: &str) -> bool {
        if regex!(r"(?i)<html>").is_match(line) {
            self.is_html = true;
        }
        if let Some(caps) = regex!(r"^\s*MEME\s+version\s+(\d+(?:\.\d+){0,2}).*$").captures(line) {
            let version = caps[1].to_string();
            if self.is_html && is_newer_than_4_3_2(&version) {
                // newer HTML output is read by the HTML parser
                self.stopped = true;
                return true;
            }
            self.version = Some(version);
            self.state = State::PreMotif;
            self.rating = 3;
        } else if !self.is_html && motif_intro(line).is_some() {
            // no version line; accept the motifs that follow
            self.state = State::InMotif;
            self.rating = self.rating.max(2);
            return false;
        }
        true
    }

    fn pre_motif(&mut self, line: &str) -> MotifResult<bool> {
        if let Some(caps) = regex!(r"(?i)^\s*ALPHABET\s*=\s*(\S*)\s*$").captures(line) {
            self.alphabet = match &caps[1] {
                "ACGT" => Alphabet::Dna,
                "ACGU" => Alphabet::Rna,
                "ACDEFGHIKLMNPQRSTVWY" => Alphabet::Protein,
                other => return Err(MotifError::new(format!("Invalid alphabet {}", other))),
            };
            self.rating = self.rating.max(4);
        } else if let Some(caps) = regex!(r"(?i)^\s*strands\s*:([\s+\-]*)$").captures(line) {
            let value = &caps[1];
            if !value.contains('+') {
                return Err(MotifError::new(format!("Invalid strands value \"{}\".", value)));
            }
            self.strands = Some(if value.contains('-') {
                Strands::Both
            } else {
                Strands::Forward
            });
            self.rating = self.rating.max(5);
        } else if regex!(r"(?i)^Letter frequencies in dataset:$").is_match(line) {
            self.counter = 0;
            self.sum = 0.0;
            self.state = State::InFreqs(false);
        } else if let Some(caps) = regex!(r"(?i)^\s*Background\s+letter\s+frequencies(\s.*)?$").captures(line) {
            if let Some(rest) = caps.get(1) {
                if let Some(source) = regex!(r"(?i)^\s+\(from\s+(.*)\):.*$").captures(rest.as_str()) {
                    self.background_source = Some(source[1].to_string());
                }
            }
            self.counter = 0;
            self.sum = 0.0;
            self.background = Some(Vec::new());
            self.state = State::InFreqs(true);
        } else if motif_intro(line).is_some() {
            self.state = State::InMotif;
            return Ok(false);
        }
        Ok(true)
    }

    /// Checks a background letter, deciding the alphabet from the first
    /// letters when it is still unknown.
    fn alphabet_test(&mut self, index: usize, letter: &str) -> MotifResult<bool> {
        let mut chars = letter.chars();
        let (Some(letter), None) = (chars.next(), chars.next()) else {
            return Err(MotifError::new("Letter value should be only one character"));
        };
        if let Some(letters) = self.alphabet.letters() {
            return Ok(letters.chars().nth(index) == Some(letter));
        }
        Ok(match (index, letter) {
            (0, 'A') | (1, 'C') | (2, 'G') => true,
            (2, 'D') => {
                self.alphabet = Alphabet::Protein;
                true
            }
            (3, 'T') => {
                self.alphabet = Alphabet::Dna;
                true
            }
            (3, 'U') => {
                self.alphabet = Alphabet::Rna;
                true
            }
            _ => false,
        })
    }

    fn in_freqs(&mut self, line: &str, is_background: bool) -> MotifResult<bool> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() % 2 != 0 {
            return Err(MotifError::new(format!(
                "Expected letter and frequency pairs. Got \"{}\".",
                line
            )));
        }
        for pair in parts.chunks(2) {
            if !self.alphabet_test(self.counter, pair[0])? {
                return Err(MotifError::new(format!(
                    "Unrecognised alphabet letter \"{}\" at position {}.",
                    pair[0], self.counter
                )));
            }
            let freq = match pair[1].parse::<f64>() {
                Ok(freq) if regex!(r"^\+?\d*\.?\d+(?:[eE][\-+]?\d+)?$").is_match(pair[1]) => freq,
                _ => {
                    return Err(MotifError::new(format!(
                        "Letter frequency is not the accepted number format \"{}\" at position {}.",
                        pair[1], self.counter
                    )))
                }
            };
            if is_background {
                if let Some(background) = self.background.as_mut() {
                    background.push(freq);
                }
            }
            self.sum += freq;
            self.counter += 1;
        }
        if let Some(size) = self.alphabet.size() {
            if self.counter >= size {
                if (self.sum - 1.0).abs() > BACKGROUND_TOLERANCE {
                    return Err(MotifError::new("The letter frequencies do not sum to 1."));
                }
                self.state = State::PreMotif;
            }
        }
        self.rating = self.rating.max(6);
        Ok(true)
    }

    fn in_motif(&mut self, line: &str, sink: &mut dyn MotifSink) -> MotifResult<bool> {
        if let Some((bl_line, id, rest)) = motif_intro(line) {
            if self.motif.id.as_deref() == Some(id) {
                // repeated introduction
                if self.is_html || self.started_with_bl_line != Some(bl_line) {
                    return Ok(true);
                }
            }
            self.enqueue_motif(sink)?;
            self.started_with_bl_line = Some(bl_line);
            self.motif.id = Some(id.to_string());
            if self.is_html {
                self.motif.alt = Some("MEME".to_string());
            } else if rest.len() > 1 {
                if let Some(caps) = regex!(r"^\s+([^\s=]+)(?:\s+(?:[^\s=].*)?)?$").captures(rest) {
                    self.motif.alt = Some(caps[1].to_string());
                }
            }
        } else if let Some(caps) = regex!(r"^\s*letter\s*-\s*probability\s+matrix\s*:(.*)$").captures(line) {
            if self.motif.pspm.is_some() {
                return Err(MotifError::new(format!(
                    "Repeated \"letter-probability matrix\" section in motif {}.",
                    self.motif_name()
                )));
            }
            self.parse_keyvals(&caps[1], MatrixKeys { sites: true })?;
            self.motif.pspm = Some(Vec::new());
            self.state = State::InPspm;
        } else if let Some(caps) = regex!(r"^\s*log\s*-\s*odds\s+matrix\s*:(.*)$").captures(line) {
            if self.motif.pssm.is_some() {
                return Err(MotifError::new(format!(
                    "Repeated \"log-odds matrix\" section in motif {}.",
                    self.motif_name()
                )));
            }
            self.parse_keyvals(&caps[1], MatrixKeys { sites: false })?;
            self.motif.pssm = Some(Vec::new());
            self.state = State::InPssm;
        } else if let Some(caps) = regex!(r"^\s*URL\s*(\S*)\s*").captures(line) {
            self.motif.url = Some(caps[1].to_string());
        } else if regex!(r"^\tCombined block diagrams: non-overlapping sites with p-value < \+?\d*\.?\d+(?:[eE][\-+]?\d+)?$")
            .is_match(line)
        {
            self.enqueue_motif(sink)?;
            self.state = State::AfterMotifs;
        }
        Ok(true)
    }

    fn motif_name(&self) -> &str {
        self.motif.id.as_deref().unwrap_or("")
    }

    fn parse_keyvals(&mut self, text: &str, keys: MatrixKeys) -> MotifResult<()> {
        for caps in regex!(r"([a-zA-Z]+)\s*=\s*(\+?\d*\.?\d+(?:[eE][\-+]?\d+)?)").captures_iter(text) {
            let Ok(value) = caps[2].parse::<f64>() else {
                continue;
            };
            match &caps[1] {
                "alength" => {
                    if value != 4.0 && value != 20.0 {
                        return Err(MotifError::new("Alphabet length can only be 4 or 20."));
                    }
                    match self.alphabet.size() {
                        None => self.alphabet = Alphabet::from_size(value as usize),
                        Some(size) if size as f64 != value => {
                            return Err(MotifError::new(
                                "Alphabet length does not match previously specified alphabet.",
                            ))
                        }
                        Some(_) => {}
                    }
                }
                "w" => {
                    if value.fract() != 0.0 || value < 1.0 {
                        return Err(MotifError::new("Motif width must be a positive whole number."));
                    }
                    self.motif.len = Some(value as usize);
                }
                "nsites" if keys.sites => {
                    if value <= 0.0 {
                        return Err(MotifError::new("Motif sites must be positive."));
                    }
                    self.motif.sites = Some(value);
                }
                "E" => {
                    if value < 0.0 {
                        return Err(MotifError::new("Motif evalue must be positive."));
                    }
                    self.motif.evalue = Some(value);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn parse_nums(&mut self, line: &str, is_prob: bool) -> MotifResult<Option<Vec<f64>>> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(None);
        }
        let mut row = Vec::with_capacity(parts.len());
        for part in parts {
            let value = match part.parse::<f64>() {
                Ok(value) if regex!(r"^[\-+]?\d*\.?\d+(?:[eE][\-+]?\d+)?$").is_match(part) => value,
                _ => return Err(MotifError::new(format!("Value \"{}\" is not a number.", part))),
            };
            if is_prob && !(0.0..=1.0).contains(&value) {
                return Err(MotifError::new(format!("Value {} is not a probability.", value)));
            }
            row.push(value);
        }
        if is_prob && !utils::sums_to_one(&row, ROW_TOLERANCE) {
            return Err(MotifError::with_reasons(
                "Array of probabilities does not sum to 1.",
                vec![format!("The row \"{}\" sums to {}.", line.trim(), row.iter().sum::<f64>())],
            ));
        }
        match self.alphabet.size() {
            Some(size) if size != row.len() => {
                return Err(MotifError::new(format!("Expected row to have {} columns.", size)));
            }
            Some(_) => {}
            None => {
                if row.len() != 4 && row.len() != 20 {
                    return Err(MotifError::new("Expected the row to have either 4 or 20 columns."));
                }
                self.alphabet = Alphabet::from_size(row.len());
            }
        }
        Ok(Some(row))
    }

    fn in_matrix(&mut self, line: &str, is_prob: bool) -> MotifResult<bool> {
        let row = self.parse_nums(line, is_prob)?;
        let matrix = if is_prob {
            self.motif.pspm.get_or_insert_with(Vec::new)
        } else {
            self.motif.pssm.get_or_insert_with(Vec::new)
        };
        match row {
            Some(row) => matrix.push(row),
            None => {
                if self.motif.len.is_none() && !matrix.is_empty() {
                    self.motif.len = Some(matrix.len());
                }
            }
        }
        let rows = matrix.len();
        if matches!(self.motif.len, Some(len) if rows >= len) {
            self.state = State::InMotif;
        }
        Ok(true)
    }

    fn enqueue_motif(&mut self, sink: &mut dyn MotifSink) -> MotifResult<()> {
        let Some(id) = self.motif.id.take() else {
            return Ok(());
        };
        let pending = mem::take(&mut self.motif);
        if !self.sent_meta {
            if self.alphabet == Alphabet::Unknown {
                return Err(MotifError::new(format!("Could not determine the alphabet of motif {}.", id)));
            }
            let mut meta = MotifMeta::new(self.version.clone(), self.alphabet);
            if let Some(strands) = self.strands {
                meta.strands = strands;
            }
            if let Some(background) = &self.background {
                meta.background = background.clone();
            }
            self.background = Some(meta.background.clone());
            sink.meta(&meta);
            self.sent_meta = true;
        }
        let sites = pending.sites.unwrap_or(utils::DEFAULT_SITECOUNT);
        let counts = Counts::with_sites(sites);
        let background = self.background.as_deref();
        let (pwm, psm) = match (pending.pspm, pending.pssm) {
            (None, None) => return Err(MotifError::new("Missing motif score and probability matrix")),
            (Some(pwm), Some(psm)) => (pwm, psm),
            (Some(pwm), None) => {
                let psm = utils::freqs_to_scores(&pwm, counts, background);
                (pwm, psm)
            }
            (None, Some(psm)) => (utils::scores_to_freqs(&psm, counts, background), psm),
        };
        let len = pending.len.unwrap_or(pwm.len());
        if pwm.len() != len || psm.len() != len {
            return Err(MotifError::new(format!(
                "Motif {} has a width of {} but its matrix has {} rows.",
                id,
                len,
                pwm.len().min(psm.len())
            )));
        }
        sink.motif(&Motif {
            id,
            alt: pending.alt,
            len,
            nsites: sites,
            evalue: pending.evalue.unwrap_or(0.0),
            pwm,
            psm: Some(psm),
            url: pending.url,
        });
        self.rating = self.rating.max(RATING_MOTIF);
        Ok(())
    }

    fn record(&mut self, result: MotifResult<()>) {
        if let Err(error) = result {
            self.errors.push(error.to_message());
            self.stopped = true;
        }
    }
}

/// Splits a `MOTIF` or `BL MOTIF` line into (is BL line, id, rest).
fn motif_intro(line: &str) -> Option<(bool, &str, &str)> {
    let caps = regex!(r"^\s*(BL\s+)?MOTIF\s*(\S+)(\s.*)?$").captures(line)?;
    let bl_line = caps.get(1).is_some_and(|m| m.as_str().len() > 2);
    let id = caps.get(2)?.as_str();
    let rest = caps.get(3).map_or("", |m| m.as_str());
    Some((bl_line, id, rest))
}

fn is_newer_than_4_3_2(version: &str) -> bool {
    let mut parts = [0u32; 3];
    for (slot, part) in parts.iter_mut().zip(version.split('.')) {
        *slot = part.parse().unwrap_or(0);
    }
    parts > [4, 3, 2]
}

impl StreamingMotifParser for TextMotifParser {
    fn process_chunk(&mut self, chunk: &[u8], sink: &mut dyn MotifSink) -> Result<(), ParserFault> {
        if self.stopped {
            return Ok(());
        }
        self.decoder.set_source(chunk, false)?;
        while let Some(codepoint) = self.decoder.next()? {
            let ch = char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER);
            if ch == '\n' {
                self.end_line(sink);
                if self.stopped {
                    return Ok(());
                }
            } else {
                self.line.push(ch);
            }
        }
        Ok(())
    }

    fn process_end(&mut self, sink: &mut dyn MotifSink) -> Result<(), ParserFault> {
        if self.stopped {
            return Ok(());
        }
        self.decoder.set_source(&[], true)?;
        while self.decoder.next()?.is_some() {}
        if !self.line.is_empty() {
            self.end_line(sink);
            if self.stopped {
                return Ok(());
            }
        }
        let result = self.enqueue_motif(sink);
        self.record(result);
        Ok(())
    }

    fn rating(&self) -> u8 {
        self.rating
    }

    fn errors(&self) -> &[Message] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motif::RecordingSink;

    fn parse_in_chunks(text: &str, chunk_size: usize) -> (TextMotifParser, RecordingSink) {
        let mut parser = TextMotifParser::new();
        let mut sink = RecordingSink::default();
        for chunk in text.as_bytes().chunks(chunk_size.max(1)) {
            parser.process_chunk(chunk, &mut sink).unwrap();
        }
        parser.process_end(&mut sink).unwrap();
        (parser, sink)
    }

    fn parse(text: &str) -> (TextMotifParser, RecordingSink) {
        parse_in_chunks(text, 4096)
    }

    const MEME_FILE: &str = "MEME version 4\n\
        \n\
        ALPHABET= ACGT\n\
        \n\
        strands: + -\n\
        \n\
        Background letter frequencies (from uniform background):\n\
        A 0.30000 C 0.20000 G 0.20000 T 0.30000\n\
        \n\
        MOTIF crp CRP_ECOLI\n\
        letter-probability matrix: alength= 4 w= 3 nsites= 17 E= 4.1e-009\n\
        \x20 0.000000  0.176471  0.000000  0.823529\n\
        \x20 0.000000  0.058824  0.647059  0.294118\n\
        \x20 0.250000  0.250000  0.250000  0.250000\n\
        \n\
        URL http://example.org/crp\n\
        \n\
        MOTIF lexA\n\
        log-odds matrix: alength= 4 w= 2 E= 0\n\
        100 -100 -100 -100\n\
        0 0 0 0\n";

    #[test]
    fn test_version_less_motif() {
        let (parser, sink) = parse(
            "MOTIF m1\nletter-probability matrix: alength= 4 w= 2 nsites= 20 E= 0.01\n0.25 0.25 0.25 0.25\n1 0 0 0\n",
        );
        assert!(parser.errors().is_empty());
        assert_eq!(sink.metas.len(), 1);
        assert_eq!(sink.metas[0].version, None);
        assert_eq!(sink.metas[0].alphabet, Alphabet::Dna);
        assert_eq!(sink.motifs.len(), 1);
        let motif = &sink.motifs[0];
        assert_eq!(motif.id, "m1");
        assert_eq!(motif.len, 2);
        assert_eq!(motif.nsites, 20.0);
        assert_eq!(motif.evalue, 0.01);
        assert_eq!(motif.pwm, vec![vec![0.25, 0.25, 0.25, 0.25], vec![1.0, 0.0, 0.0, 0.0]]);
        assert_eq!(parser.rating(), RATING_MOTIF);
    }

    #[test]
    fn test_full_file() {
        let (parser, sink) = parse(MEME_FILE);
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        assert_eq!(parser.background_source(), Some("uniform background"));
        let meta = &sink.metas[0];
        assert_eq!(meta.version.as_deref(), Some("4"));
        assert_eq!(meta.strands, Strands::Both);
        assert_eq!(meta.background, vec![0.3, 0.2, 0.2, 0.3]);
        assert_eq!(sink.motifs.len(), 2);
        let crp = &sink.motifs[0];
        assert_eq!(crp.alt.as_deref(), Some("CRP_ECOLI"));
        assert_eq!(crp.len, 3);
        assert_eq!(crp.nsites, 17.0);
        assert_eq!(crp.url.as_deref(), Some("http://example.org/crp"));
        assert_eq!(crp.psm.as_ref().map(Vec::len), Some(3));
        let lexa = &sink.motifs[1];
        assert_eq!(lexa.id, "lexA");
        assert_eq!(lexa.alt, None);
        assert_eq!(lexa.nsites, 20.0);
        assert!(lexa.pwm.iter().all(|row| row.iter().all(|f| (0.0..=1.0).contains(f))));
    }

    #[test]
    fn test_chunk_splits_give_same_motifs() {
        let (_, whole) = parse(MEME_FILE);
        for chunk_size in [1, 2, 3, 7, 64] {
            let (parser, sink) = parse_in_chunks(MEME_FILE, chunk_size);
            assert!(parser.errors().is_empty());
            assert_eq!(sink.motifs, whole.motifs, "chunk size {}", chunk_size);
            assert_eq!(sink.metas, whole.metas);
        }
    }

    #[test]
    fn test_bad_row_sum() {
        let (parser, sink) = parse(
            "MEME version 4\n\nMOTIF m1\nletter-probability matrix: alength= 4 w= 2\n0.25 0.25 0.25 0.25\n0.5 0.5 0.5 0\n",
        );
        assert!(sink.motifs.is_empty());
        assert_eq!(parser.errors().len(), 1);
        assert_eq!(parser.errors()[0].message, "Array of probabilities does not sum to 1.");
        assert_eq!(parser.rating(), 3);
    }

    #[test]
    fn test_signed_evalue_not_read() {
        let text = "MEME version 4\n\nMOTIF a\nletter-probability matrix: alength= 4 w= 1 E= -1\n0.1 0.2 0.3 0.4\n";
        let (parser, sink) = parse(text);
        assert!(parser.errors().is_empty(), "{:?}", parser.errors());
        assert_eq!(sink.motifs.len(), 1);
        assert_eq!(sink.motifs[0].evalue, 0.0);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let text = "MEME version 4.4\r\n\r\nMOTIF a\r\nletter-probability matrix: w= 1\r\n0.1 0.2 0.3 0.4";
        let (parser, sink) = parse(text);
        assert!(parser.errors().is_empty());
        assert_eq!(sink.motifs.len(), 1);
        assert_eq!(sink.motifs[0].pwm, vec![vec![0.1, 0.2, 0.3, 0.4]]);
    }

    #[test]
    fn test_repeated_intro_lines() {
        let text = "MEME version 4\n\
            MOTIF 1 width=2 seqs=3\n\
            BL   MOTIF 1 width=2 seqs=3\n\
            letter-probability matrix: alength= 4 w= 2\n\
            1 0 0 0\n\
            0 1 0 0\n\
            MOTIF 1 width=2 seqs=3\n";
        // the BL line repeats the first intro and is skipped
        let without_last = &text[..text.rfind("MOTIF").unwrap_or(text.len())];
        let (parser, sink) = parse(without_last);
        assert!(parser.errors().is_empty());
        assert_eq!(sink.motifs.len(), 1);
        assert_eq!(sink.motifs[0].len, 2);

        // the last intro has the same kind as the first, so it starts a
        // second motif, which has no matrix
        let (parser, sink) = parse(text);
        assert_eq!(sink.motifs.len(), 1);
        assert_eq!(parser.errors()[0].message, "Missing motif score and probability matrix");
    }

    #[test]
    fn test_background_decides_alphabet() {
        let text = "MEME version 4\n\nBackground letter frequencies\nA 0.25 C 0.25 G 0.25 U 0.25\n\nMOTIF r\nletter-probability matrix:\n0 0 0 1\n\n";
        let (parser, sink) = parse(text);
        assert!(parser.errors().is_empty());
        assert_eq!(sink.metas[0].alphabet, Alphabet::Rna);
        assert_eq!(sink.motifs[0].len, 1);
    }

    #[test]
    fn test_structural_errors() {
        let (parser, _) = parse("MEME version 4\nALPHABET= XYZ\n");
        assert_eq!(parser.errors()[0].message, "Invalid alphabet XYZ");

        let (parser, _) = parse("MEME version 4\nMOTIF a\nletter-probability matrix: alength= 5\n");
        assert_eq!(parser.errors()[0].message, "Alphabet length can only be 4 or 20.");

        let (parser, _) = parse("MEME version 4\nMOTIF a\nletter-probability matrix: w= 1\n0.5 0.5 x 0\n");
        assert_eq!(parser.errors()[0].message, "Value \"x\" is not a number.");

        let (parser, _) = parse("MEME version 4\nMOTIF a\nURL x\n");
        assert_eq!(parser.errors()[0].message, "Could not determine the alphabet of motif a.");
    }

    #[test]
    fn test_invalid_utf8_is_a_fault() {
        let mut parser = TextMotifParser::new();
        let mut sink = RecordingSink::default();
        assert!(parser.process_chunk(b"MEME version 4\n\xFF\n", &mut sink).is_err());
    }

    #[test]
    fn test_newer_html_is_left_alone() {
        let (parser, sink) = parse("<html>\nMEME version 4.9.0\nMOTIF a\n");
        assert!(sink.metas.is_empty());
        assert!(parser.errors().is_empty());
        assert_eq!(parser.rating(), RATING_NONE);
        assert!(is_newer_than_4_3_2("4.3.3"));
        assert!(!is_newer_than_4_3_2("4.3"));
    }
}
