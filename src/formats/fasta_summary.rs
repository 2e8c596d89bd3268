//! FASTA check options and the handler that turns checker events into a
//! [`Summary`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alphabet::{Alphabet, AlphabetSet};
use crate::faults::FileFaults;
use crate::formats::fasta::{CharClass, FastaEvents, Position, SeqInfo};
use crate::formats::{FileKind, UnusableFormat};
use crate::decoder::EncodingError;
use crate::report::Summary;

const ENCODING_HELP: &str = " - re-save as plain text; either Unicode UTF-8 (no Byte Order Mark) or ASCII";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Option min_seq_len must not be larger than option max_seq_len.")]
    SeqLengthRange,
    #[error("No alphabets are allowed.")]
    NoAlphabets,
}

/// What a FASTA file is allowed to contain.
///
/// Limits left as `None` are not checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FastaOptions {
    /// Files larger than this many bytes get a warning.
    pub file_max: Option<u64>,
    pub alphabets: AlphabetSet,
    /// Accept the MEME `>WEIGHTS` record.
    pub weights: bool,
    /// Accept masking characters such as N in DNA or X in protein.
    pub masking: bool,
    /// Accept ambiguity codes. Implies `masking`.
    pub ambigs: bool,
    pub gaps: bool,
    /// Reject lowercase sequence letters.
    pub uppercase: bool,
    pub max_name_len: Option<u64>,
    pub max_desc_len: Option<u64>,
    pub min_seq_len: Option<u64>,
    pub max_seq_len: Option<u64>,
    pub max_seq_count: Option<u64>,
    pub max_seq_total: Option<u64>,
}

impl Default for FastaOptions {
    fn default() -> Self {
        Self {
            file_max: None,
            alphabets: AlphabetSet::ALL,
            weights: true,
            masking: true,
            ambigs: true,
            gaps: false,
            uppercase: false,
            max_name_len: None,
            max_desc_len: None,
            min_seq_len: None,
            max_seq_len: None,
            max_seq_count: None,
            max_seq_total: None,
        }
    }
}

impl FastaOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.alphabets.is_empty() {
            return Err(OptionsError::NoAlphabets);
        }
        match (self.min_seq_len, self.max_seq_len) {
            (Some(min), Some(max)) if min > max => Err(OptionsError::SeqLengthRange),
            _ => Ok(()),
        }
    }

    /// Masking characters are always allowed when ambiguity codes are.
    pub fn allows_masking(&self) -> bool {
        self.masking || self.ambigs
    }

    /// Zero limits mean no limit, except for the minimum sequence length.
    fn normalized(mut self) -> Self {
        let positive = |limit: Option<u64>| limit.filter(|&n| n >= 1);
        self.max_name_len = positive(self.max_name_len);
        self.max_desc_len = positive(self.max_desc_len);
        self.max_seq_len = positive(self.max_seq_len);
        self.max_seq_count = positive(self.max_seq_count);
        self.max_seq_total = positive(self.max_seq_total);
        self
    }
}

/// Collects checker events and summarises them.
#[derive(Debug, Clone)]
pub struct FastaSummary {
    options: FastaOptions,
    file_size: u64,
    fraction: f64,
    format: Option<UnusableFormat>,
    encoding_error: Option<String>,
    alphabet: Alphabet,
    names: HashSet<String>,
    sequence_count: u64,
    sequence_total: u64,
    weights_count: u64,
    missing_name: FileFaults,
    long_name: FileFaults,
    duplicate_name: FileFaults,
    long_description: FileFaults,
    short_sequence: FileFaults,
    long_sequence: FileFaults,
    comment: FileFaults,
    junk: FileFaults,
    bad_weight: FileFaults,
    chevron: FileFaults,
    seq_errors: u64,
    seq_gap: FileFaults,
    seq_ambig: FileFaults,
    seq_mask: FileFaults,
    seq_lc: FileFaults,
    seq_non_alpha: FileFaults,
    seqs_with_error: u64,
    last_error_seq_line: Option<u64>,
}

impl FastaSummary {
    pub fn new(options: FastaOptions) -> Self {
        Self {
            options: options.normalized(),
            file_size: 0,
            fraction: 0.0,
            format: None,
            encoding_error: None,
            alphabet: Alphabet::Unknown,
            names: HashSet::new(),
            sequence_count: 0,
            sequence_total: 0,
            weights_count: 0,
            missing_name: FileFaults::default(),
            long_name: FileFaults::default(),
            duplicate_name: FileFaults::default(),
            long_description: FileFaults::default(),
            short_sequence: FileFaults::default(),
            long_sequence: FileFaults::default(),
            comment: FileFaults::default(),
            junk: FileFaults::default(),
            bad_weight: FileFaults::default(),
            chevron: FileFaults::default(),
            seq_errors: 0,
            seq_gap: FileFaults::default(),
            seq_ambig: FileFaults::default(),
            seq_mask: FileFaults::default(),
            seq_lc: FileFaults::default(),
            seq_non_alpha: FileFaults::default(),
            seqs_with_error: 0,
            last_error_seq_line: None,
        }
    }

    pub fn options(&self) -> &FastaOptions {
        &self.options
    }

    pub fn sequence_count(&self) -> u64 {
        self.sequence_count
    }

    pub fn sequence_total(&self) -> u64 {
        self.sequence_total
    }

    /// Number of `>WEIGHTS` records seen.
    pub fn weights_count(&self) -> u64 {
        self.weights_count
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Fraction of the file read so far.
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Builds the list of problems found, errors and warnings interleaved in
    /// a fixed order.
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

        let allowed = self.options.alphabets;
        if self.sequence_count == 0 {
            summary.add_error("No sequences found", vec![]);
        } else if self.alphabet != Alphabet::Unknown && !allowed.contains(self.alphabet) {
            summary.add_warning(
                format!("Sequences look like {} but {} was expected.", self.alphabet, allowed),
                vec![],
            );
        }

        if self.junk.faults() > 0 {
            summary.add_error(
                "Junk text found",
                vec![format!(
                    "Found some text that is not part of any sequence or weights on {}{}",
                    line_word(&self.junk),
                    self.junk.lines_str()
                )],
            );
        }

        if self.bad_weight.faults() > 0 {
            let reason = if self.bad_weight.faults() == 1 {
                format!(
                    "Found a sequence weight that was not in the correct range (0 < weight \u{2264} 1) on line {}",
                    self.bad_weight.lines_str()
                )
            } else {
                format!(
                    "Found {} sequences weights that were not in the correct range (0 < weight \u{2264} 1) on {}{}",
                    self.bad_weight.faults(),
                    line_word(&self.bad_weight),
                    self.bad_weight.lines_str()
                )
            };
            summary.add_error("Sequence weights out of range", vec![reason]);
        }

        if self.missing_name.faults() > 0 {
            let reason = if self.missing_name.faults() == 1 {
                format!("Missed a sequence identifier on line {}", self.missing_name.lines_str())
            } else {
                format!(
                    "Missed {} sequence identifiers on lines {}",
                    self.missing_name.faults(),
                    self.missing_name.lines_str()
                )
            };
            summary.add_error("Sequence identifier missing - all sequences must have identifiers", vec![reason]);
        }

        if self.duplicate_name.faults() > 0 {
            let reason = if self.duplicate_name.faults() == 1 {
                format!("Found a duplicate sequence identifier on line {}", self.duplicate_name.lines_str())
            } else {
                format!(
                    "Found {} duplicated sequence identifiers on lines {}",
                    self.duplicate_name.faults(),
                    self.duplicate_name.lines_str()
                )
            };
            summary.add_error("Sequence identifier duplicated - identifiers must be unique", vec![reason]);
        }

        if self.short_sequence.faults() > 0 || self.long_sequence.faults() > 0 {
            let mut reasons = Vec::new();
            if let Some(min) = self.options.min_seq_len.filter(|_| self.short_sequence.faults() > 0) {
                reasons.push(length_reason(&self.short_sequence, "shorter", "minimum", min));
            }
            if let Some(max) = self.options.max_seq_len.filter(|_| self.long_sequence.faults() > 0) {
                reasons.push(length_reason(&self.long_sequence, "longer", "maximum", max));
            }
            summary.add_error("Sequence length out of bounds", reasons);
        }

        if self.seq_errors > 0 {
            let mut reasons = vec![format!(
                "Total of {} bad characters in {} sequences",
                self.seq_errors, self.seqs_with_error
            )];
            for (faults, kind) in [
                (&self.seq_gap, "gap"),
                (&self.seq_ambig, "ambiguous"),
                (&self.seq_mask, "masking"),
                (&self.seq_lc, "lowercase"),
            ] {
                if faults.faults() == 0 {
                    continue;
                }
                let head = if faults.faults() == 1 {
                    format!("Found a disallowed {} character {}", kind, faults.letters_sep())
                } else {
                    format!(
                        "Found {} disallowed {} characters {}",
                        faults.faults(),
                        kind,
                        faults.letters_sep()
                    )
                };
                reasons.push(format!("{} on {}{}", head, line_word(faults), faults.lines_str()));
            }
            if self.seq_non_alpha.faults() > 0 {
                let faults = &self.seq_non_alpha;
                let letters = faults.letters_sep();
                let head = if faults.faults() == 1 {
                    let letters = if letters.is_empty() { letters } else { letters + " " };
                    format!("Found a character {}", letters)
                } else {
                    let letters = if letters.is_empty() {
                        letters
                    } else {
                        format!("(including {}) ", letters)
                    };
                    format!("Found {} characters {}", faults.faults(), letters)
                };
                reasons.push(format!(
                    "{}not in the {} alphabet on {}{}",
                    head,
                    allowed,
                    line_word(faults),
                    faults.lines_str()
                ));
            }
            summary.add_error("Sequence contains bad characters", reasons);
        }

        if self.comment.faults() > 0 {
            let reason = if self.comment.faults() == 1 {
                format!("Found a comment on line {}", self.comment.lines_str())
            } else {
                format!("Found {} comments on lines {}", self.comment.faults(), self.comment.lines_str())
            };
            summary.add_error("Unsupported comments - comment lines must be removed", vec![reason]);
        }

        if self.chevron.faults() > 0 {
            let reason = if self.chevron.faults() == 1 {
                format!(
                    "Found a '>' character on line {} which is not at the beginning",
                    self.chevron.lines_str()
                )
            } else {
                format!(
                    "Found {} '>' characters on lines {} where the '>' is not at the beginning",
                    self.chevron.faults(),
                    self.chevron.lines_str()
                )
            };
            summary.add_warning("Potential malformed sequence start", vec![reason]);
        }

        if self.long_name.faults() > 0 {
            let reason = if self.long_name.faults() == 1 {
                format!("Found a sequence with a long identifier on line {}", self.long_name.lines_str())
            } else {
                format!(
                    "Found {} sequences with long identifiers on lines {}",
                    self.long_name.faults(),
                    self.long_name.lines_str()
                )
            };
            summary.add_warning("Long sequence identifiers may cause problems", vec![reason]);
        }

        if self.long_description.faults() > 0 {
            let reason = if self.long_description.faults() == 1 {
                format!(
                    "Found a sequence with a long description on line {}",
                    self.long_description.lines_str()
                )
            } else {
                format!(
                    "Found {} sequences with long descriptions on lines {}",
                    self.long_description.faults(),
                    self.long_description.lines_str()
                )
            };
            summary.add_warning("Long sequence descriptions may cause problems", vec![reason]);
        }

        if let Some(max) = self.options.max_seq_count {
            if self.sequence_count > max {
                summary.add_error(
                    "Too many sequences",
                    vec![format!(
                        "Found {} sequences but this only accepts up to {}",
                        self.sequence_count, max
                    )],
                );
            }
        }

        if let Some(max) = self.options.max_seq_total {
            if self.sequence_total > max {
                summary.add_error(
                    "Combined sequence length exceeds maximum",
                    vec![format!(
                        "Found sequences with lengths totaling {} but this only accepts a total length up to {}",
                        self.sequence_total, max
                    )],
                );
            }
        }
        summary
    }
}

fn line_word(faults: &FileFaults) -> &'static str {
    if faults.line_count() == 1 {
        "line "
    } else {
        "lines "
    }
}

fn length_reason(faults: &FileFaults, comparison: &str, bound: &str, limit: u64) -> String {
    if faults.faults() == 1 {
        format!(
            "Found a sequence {} than the {} allowed length of {} on line {}",
            comparison,
            bound,
            limit,
            faults.lines_str()
        )
    } else {
        format!(
            "Found {} sequences {} than the {} allowed length of {} on lines {}",
            faults.faults(),
            comparison,
            bound,
            limit,
            faults.lines_str()
        )
    }
}

impl FastaEvents for FastaSummary {
    fn begin(&mut self, file_size: u64) {
        *self = Self::new(self.options.clone());
        self.file_size = file_size;
    }

    fn progress(&mut self, fraction: f64, alphabet: Alphabet) {
        self.fraction = fraction;
        self.alphabet = alphabet;
    }

    fn info_seq(&mut self, seq: &SeqInfo<'_>) {
        self.sequence_count += 1;
        self.sequence_total += seq.seq_len;
        if seq.name.is_empty() {
            self.missing_name.add(seq.line, None);
        } else {
            if let Some(max) = self.options.max_name_len {
                if seq.name.chars().count() as u64 > max {
                    self.long_name.add(seq.line, None);
                }
            }
            if !self.names.insert(seq.name.to_string()) {
                self.duplicate_name.add(seq.line, None);
            }
        }
        if let Some(max) = self.options.max_desc_len {
            if seq.desc_len > max {
                self.long_description.add(seq.line, None);
            }
        }
        match (self.options.min_seq_len, self.options.max_seq_len) {
            (Some(min), _) if seq.seq_len < min => self.short_sequence.add(seq.line, None),
            (_, Some(max)) if seq.seq_len > max => self.long_sequence.add(seq.line, None),
            _ => {}
        }
    }

    fn info_comment(&mut self, _offset: u64, line: u64) {
        self.comment.add(line, None);
    }

    fn info_weights(&mut self, _offset: u64, _line: u64, _count: u64) {
        self.weights_count += 1;
    }

    fn warn_junk(&mut self, at: Position, _class: CharClass, _ch: char) {
        self.junk.add(at.line, None);
    }

    fn warn_seq(&mut self, at: Position, seq: &SeqInfo<'_>, class: CharClass, ch: char) {
        self.seq_errors += 1;
        let faults = if class.has(CharClass::ALPHA) {
            if !self.options.gaps && class.has(CharClass::GAP) {
                &mut self.seq_gap
            } else if !self.options.ambigs && class.has(CharClass::AMBIGUOUS) {
                &mut self.seq_ambig
            } else if !self.options.allows_masking() && class.has(CharClass::MASK) {
                &mut self.seq_mask
            } else if self.options.uppercase && class.has(CharClass::LOWERCASE) {
                &mut self.seq_lc
            } else {
                // options changed between the checker and this handler
                &mut self.seq_non_alpha
            }
        } else {
            &mut self.seq_non_alpha
        };
        faults.add(at.line, Some(ch));
        if self.last_error_seq_line != Some(seq.line) {
            self.seqs_with_error += 1;
            self.last_error_seq_line = Some(seq.line);
        }
    }

    fn warn_weight(&mut self, at: Position, _text: &str) {
        self.bad_weight.add(at.line, None);
    }

    fn warn_chevron(&mut self, at: Position) {
        self.chevron.add(at.line, None);
    }

    fn error_format(&mut self, format: &UnusableFormat) {
        self.format = Some(*format);
    }

    fn error_encoding(&mut self, error: &EncodingError) {
        self.encoding_error = Some(error.to_string());
    }

    fn end(&mut self, alphabet: Alphabet) {
        self.alphabet = alphabet;
        self.fraction = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunked::MemoryBlob;
    use crate::formats::fasta::FastaChecker;

    fn summarize(options: FastaOptions, text: &[u8]) -> (FastaSummary, Summary) {
        let mut checker = FastaChecker::new(&options, FastaSummary::new(options.clone()));
        checker.check_blob(&mut MemoryBlob::new(text), 16).unwrap();
        let handler = checker.into_handler().unwrap();
        let summary = handler.summary();
        (handler, summary)
    }

    fn headlines(summary: &Summary) -> Vec<&str> {
        summary.messages.iter().map(|m| m.message.as_str()).collect()
    }

    #[test]
    fn test_clean_file() {
        let (handler, summary) = summarize(FastaOptions::default(), b">seq1 desc\nACGTACGT\n>seq2\nACGNACGT\n");
        assert_eq!(handler.sequence_count(), 2);
        assert_eq!(handler.sequence_total(), 16);
        assert!(!summary.error);
        assert!(!summary.warning);
        assert!(summary.messages.is_empty());
        assert_eq!(summary.alphabet, Some(Alphabet::Dna));
    }

    #[test]
    fn test_empty_file() {
        let (_, summary) = summarize(FastaOptions::default(), b"");
        assert!(summary.error);
        assert_eq!(headlines(&summary), vec!["No sequences found"]);
        assert_eq!(summary.alphabet, Some(Alphabet::Unknown));
    }

    #[test]
    fn test_unexpected_alphabet() {
        let options = FastaOptions {
            alphabets: AlphabetSet::of(&[Alphabet::Protein]),
            ..FastaOptions::default()
        };
        let (_, summary) = summarize(options, b">s\nACGTACGTACGT\n");
        assert!(!summary.error);
        assert_eq!(headlines(&summary), vec!["Sequences look like DNA but protein was expected."]);
    }

    #[test]
    fn test_identifier_problems() {
        let options = FastaOptions {
            max_name_len: Some(3),
            ..FastaOptions::default()
        };
        let (_, summary) = summarize(options, b">\nACGT\n>abc\nACGT\n>abc\nACGT\n>abcdef\nACGT\n");
        assert_eq!(
            headlines(&summary),
            vec![
                "Sequence identifier missing - all sequences must have identifiers",
                "Sequence identifier duplicated - identifiers must be unique",
                "Long sequence identifiers may cause problems",
            ]
        );
        assert_eq!(summary.messages[0].reasons, vec!["Missed a sequence identifier on line 1"]);
        assert_eq!(summary.messages[1].reasons, vec!["Found a duplicate sequence identifier on line 5"]);
        assert!(summary.error);
        assert!(summary.warning);
    }

    #[test]
    fn test_bad_characters() {
        let options = FastaOptions {
            alphabets: AlphabetSet::of(&[Alphabet::Dna]),
            ..FastaOptions::default()
        };
        let (_, summary) = summarize(options, b">a\nACGTACGTAC-GTACGT\n>b\nACGTAC*GT\nACGTAC*GT\n");
        assert_eq!(headlines(&summary), vec!["Sequence contains bad characters"]);
        assert_eq!(
            summary.messages[0].reasons,
            vec![
                "Total of 3 bad characters in 2 sequences",
                "Found a disallowed gap character '-' on line 2",
                "Found 2 characters (including '*') not in the DNA alphabet on lines 4-5",
            ]
        );
    }

    #[test]
    fn test_sequence_bounds() {
        let options = FastaOptions {
            min_seq_len: Some(3),
            max_seq_len: Some(5),
            max_seq_count: Some(2),
            max_seq_total: Some(8),
            ..FastaOptions::default()
        };
        let (_, summary) = summarize(options, b">a\nAC\n>b\nACGTACGT\n>c\nACGT\n");
        assert_eq!(
            headlines(&summary),
            vec![
                "Sequence length out of bounds",
                "Too many sequences",
                "Combined sequence length exceeds maximum",
            ]
        );
        assert_eq!(
            summary.messages[0].reasons,
            vec![
                "Found a sequence shorter than the minimum allowed length of 3 on line 1",
                "Found a sequence longer than the maximum allowed length of 5 on line 3",
            ]
        );
        assert_eq!(
            summary.messages[2].reasons,
            vec!["Found sequences with lengths totaling 14 but this only accepts a total length up to 8"]
        );
    }

    #[test]
    fn test_junk_comments_and_chevrons() {
        let (_, summary) = summarize(
            FastaOptions::default(),
            b"junk\n>a b>c\nACGT\n;note\n>WEIGHTS 0.5 2\n",
        );
        assert_eq!(
            headlines(&summary),
            vec![
                "Junk text found",
                "Sequence weights out of range",
                "Unsupported comments - comment lines must be removed",
                "Potential malformed sequence start",
            ]
        );
        assert_eq!(
            summary.messages[0].reasons,
            vec!["Found some text that is not part of any sequence or weights on line 1"]
        );
        assert_eq!(summary.messages[2].reasons, vec!["Found a comment on line 4"]);
    }

    #[test]
    fn test_unusable_files_stop_early() {
        let (_, summary) = summarize(FastaOptions::default(), &[0x1F, 0x8B, 0x08, 0x00]);
        assert_eq!(headlines(&summary), vec!["Bad format \"GZIP archive\" - must be decompressed first"]);

        let (_, summary) = summarize(FastaOptions::default(), b">s\nAC\xC3GT\n");
        assert_eq!(summary.messages.len(), 1);
        assert!(summary.messages[0].message.starts_with("Bad encoding - re-save as plain text"));
        assert_eq!(summary.messages[0].reasons.len(), 1);
    }

    #[test]
    fn test_large_file_warning() {
        let options = FastaOptions {
            file_max: Some(10),
            ..FastaOptions::default()
        };
        let (_, summary) = summarize(options, b">seq\nACGTACGTACGT\n");
        assert_eq!(summary.messages[0].message, "Large file");
        assert_eq!(summary.messages[0].reasons, vec!["File is 0MB"]);
    }

    #[test]
    fn test_options_validation() {
        let options = FastaOptions {
            min_seq_len: Some(10),
            max_seq_len: Some(5),
            ..FastaOptions::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::SeqLengthRange));
        let options = FastaOptions {
            alphabets: AlphabetSet::EMPTY,
            ..FastaOptions::default()
        };
        assert_eq!(options.validate(), Err(OptionsError::NoAlphabets));
        assert!(FastaOptions::default().validate().is_ok());
        assert!(FastaOptions::default().allows_masking());
    }

    #[test]
    fn test_options_from_yaml() {
        let options: FastaOptions = serde_yaml::from_str("alphabets: [DNA, RNA]\ngaps: true\nmax_seq_len: 100\n").unwrap();
        assert!(options.gaps);
        assert!(options.weights);
        assert_eq!(options.max_seq_len, Some(100));
        assert_eq!(options.alphabets, AlphabetSet::of(&[Alphabet::Dna, Alphabet::Rna]));
    }
}
