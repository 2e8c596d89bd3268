//! Data model for parsed motifs.
//!
//! This module contains the records the motif parsers produce:
//! - [`MotifMeta`]: file-wide details (version, alphabet, strands, background)
//! - [`Motif`]: one motif with its probability and score matrices
//!
//! Matrices are stored row-per-position: `matrix[position][letter]`, with
//! letters in the alphabet's canonical order.

use std::fmt;

use serde::Serialize;

use crate::alphabet::Alphabet;

/// Rows are motif positions, columns are alphabet letters.
pub type Matrix = Vec<Vec<f64>>;

/// Which strands a motif file was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strands {
    /// Both strands; the default for nucleotide motifs.
    #[default]
    Both,
    /// The given strand only.
    Forward,
    /// Strands do not apply (protein).
    None,
}

impl Strands {
    /// Parses the `strands:` notation: `+ -`, `+` or `none`.
    pub fn from_notation(text: &str) -> Option<Strands> {
        let mut plus = false;
        let mut minus = false;
        for part in text.split_whitespace() {
            match part {
                "+" => plus = true,
                "-" => minus = true,
                "none" => return Some(Strands::None),
                _ => return None,
            }
        }
        match (plus, minus) {
            (true, true) => Some(Strands::Both),
            (true, false) => Some(Strands::Forward),
            _ => None,
        }
    }

    /// The default for an alphabet.
    pub fn for_alphabet(alphabet: Alphabet) -> Strands {
        if alphabet.is_nucleotide() {
            Strands::Both
        } else {
            Strands::None
        }
    }
}

impl fmt::Display for Strands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strands::Both => write!(f, "+ -"),
            Strands::Forward => write!(f, "+"),
            Strands::None => write!(f, "none"),
        }
    }
}

/// File-wide motif details, reported once before the first motif.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotifMeta {
    /// The `MEME version` string, when the file has one.
    pub version: Option<String>,
    pub alphabet: Alphabet,
    pub strands: Strands,
    /// Letter frequencies in alphabet order, summing to 1.
    pub background: Vec<f64>,
}

impl MotifMeta {
    /// Meta-data with a uniform background.
    pub fn new(version: Option<String>, alphabet: Alphabet) -> Self {
        let size = alphabet.size().unwrap_or(0);
        Self {
            version,
            alphabet,
            strands: Strands::for_alphabet(alphabet),
            background: crate::motif::utils::uniform_freqs(size),
        }
    }
}

/// A parsed motif.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Motif {
    /// Motif identifier, unique within its file.
    pub id: String,
    /// Alternate name, often a consensus.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// Width in positions.
    pub len: usize,
    pub nsites: f64,
    pub evalue: f64,
    /// Probability matrix.
    pub pwm: Matrix,
    /// Log-odds score matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psm: Option<Matrix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Motif {
    /// Number of letters per row.
    pub fn alphabet_length(&self) -> usize {
        self.pwm.first().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strands_notation() {
        assert_eq!(Strands::from_notation("+ -"), Some(Strands::Both));
        assert_eq!(Strands::from_notation(" + "), Some(Strands::Forward));
        assert_eq!(Strands::from_notation("none"), Some(Strands::None));
        assert_eq!(Strands::from_notation("-"), None);
        assert_eq!(Strands::from_notation("both"), None);
        assert_eq!(Strands::Both.to_string(), "+ -");
    }

    #[test]
    fn test_meta_defaults() {
        let meta = MotifMeta::new(Some("4".to_string()), Alphabet::Dna);
        assert_eq!(meta.strands, Strands::Both);
        assert_eq!(meta.background, vec![0.25; 4]);
        let meta = MotifMeta::new(None, Alphabet::Protein);
        assert_eq!(meta.strands, Strands::None);
        assert_eq!(meta.background.len(), 20);
    }
}
