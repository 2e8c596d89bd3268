//! Sequence alphabets.
//!
//! The checkers only know three alphabets: DNA, RNA and protein. Parsers
//! that cannot decide yet report [`Alphabet::Unknown`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A biological sequence alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Alphabet {
    #[default]
    Unknown,
    Rna,
    Dna,
    Protein,
}

impl Alphabet {
    /// Number of letters in the core alphabet, `None` when unknown.
    pub fn size(self) -> Option<usize> {
        match self {
            Alphabet::Dna | Alphabet::Rna => Some(4),
            Alphabet::Protein => Some(20),
            Alphabet::Unknown => None,
        }
    }

    /// Core letters in matrix column order.
    pub fn letters(self) -> Option<&'static str> {
        match self {
            Alphabet::Dna => Some("ACGT"),
            Alphabet::Rna => Some("ACGU"),
            Alphabet::Protein => Some("ACDEFGHIKLMNPQRSTVWY"),
            Alphabet::Unknown => None,
        }
    }

    /// Recognises an alphabet from its exact letter list.
    pub fn from_letters(letters: &str) -> Alphabet {
        match letters {
            "ACGT" => Alphabet::Dna,
            "ACGU" => Alphabet::Rna,
            "ACDEFGHIKLMNPQRSTVWY" => Alphabet::Protein,
            _ => Alphabet::Unknown,
        }
    }

    /// Guesses an alphabet from the number of matrix columns.
    pub fn from_size(size: usize) -> Alphabet {
        match size {
            4 => Alphabet::Dna,
            20 => Alphabet::Protein,
            _ => Alphabet::Unknown,
        }
    }

    /// Index of `letter` in the core alphabet (case-insensitive).
    pub fn index_of(self, letter: char) -> Option<usize> {
        let upper = letter.to_ascii_uppercase();
        self.letters()?.chars().position(|c| c == upper)
    }

    /// True for the nucleotide alphabets.
    pub fn is_nucleotide(self) -> bool {
        matches!(self, Alphabet::Dna | Alphabet::Rna)
    }

    fn bit(self) -> u8 {
        match self {
            Alphabet::Unknown => 0,
            Alphabet::Rna => 1,
            Alphabet::Dna => 2,
            Alphabet::Protein => 4,
        }
    }
}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alphabet::Dna => write!(f, "DNA"),
            Alphabet::Rna => write!(f, "RNA"),
            Alphabet::Protein => write!(f, "protein"),
            Alphabet::Unknown => write!(f, "unknown alphabet"),
        }
    }
}

/// A set of alphabets, used for the "allowed alphabets" options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Alphabet>", into = "Vec<Alphabet>")]
pub struct AlphabetSet(u8);

impl AlphabetSet {
    pub const EMPTY: AlphabetSet = AlphabetSet(0);
    pub const ALL: AlphabetSet = AlphabetSet(1 | 2 | 4);

    pub fn of(alphabets: &[Alphabet]) -> Self {
        AlphabetSet(alphabets.iter().fold(0, |acc, a| acc | a.bit()))
    }

    pub fn contains(self, alphabet: Alphabet) -> bool {
        alphabet != Alphabet::Unknown && self.0 & alphabet.bit() != 0
    }

    pub fn insert(&mut self, alphabet: Alphabet) {
        self.0 |= alphabet.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in RNA, DNA, protein order.
    pub fn iter(self) -> impl Iterator<Item = Alphabet> {
        [Alphabet::Rna, Alphabet::Dna, Alphabet::Protein]
            .into_iter()
            .filter(move |a| self.contains(*a))
    }
}

impl Default for AlphabetSet {
    fn default() -> Self {
        AlphabetSet::ALL
    }
}

impl From<Vec<Alphabet>> for AlphabetSet {
    fn from(alphabets: Vec<Alphabet>) -> Self {
        AlphabetSet::of(&alphabets)
    }
}

impl From<AlphabetSet> for Vec<Alphabet> {
    fn from(set: AlphabetSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for AlphabetSet {
    /// Renders like "DNA or protein" or "RNA, DNA or protein".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|a| a.to_string()).collect();
        match names.len() {
            0 => write!(f, "unknown alphabet"),
            1 => write!(f, "{}", names[0]),
            n => write!(f, "{} or {}", names[..n - 1].join(", "), names[n - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters_and_sizes() {
        assert_eq!(Alphabet::Dna.size(), Some(4));
        assert_eq!(Alphabet::Protein.size(), Some(20));
        assert_eq!(Alphabet::Unknown.size(), None);
        assert_eq!(Alphabet::from_letters("ACGU"), Alphabet::Rna);
        assert_eq!(Alphabet::from_letters("ACGX"), Alphabet::Unknown);
        assert_eq!(Alphabet::Protein.index_of('y'), Some(19));
    }

    #[test]
    fn test_set_display() {
        assert_eq!(AlphabetSet::ALL.to_string(), "RNA, DNA or protein");
        assert_eq!(AlphabetSet::of(&[Alphabet::Dna, Alphabet::Protein]).to_string(), "DNA or protein");
        assert_eq!(AlphabetSet::of(&[Alphabet::Dna]).to_string(), "DNA");
        assert!(!AlphabetSet::ALL.contains(Alphabet::Unknown));
    }

    #[test]
    fn test_set_serde() {
        let set: AlphabetSet = serde_json::from_str(r#"["DNA", "PROTEIN"]"#).unwrap();
        assert!(set.contains(Alphabet::Dna));
        assert!(!set.contains(Alphabet::Rna));
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["DNA","PROTEIN"]"#);
    }
}
