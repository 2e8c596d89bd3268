//! Numeric helpers shared by the motif parsers.
//!
//! ## Score and probability matrices
//!
//! Scores are log-odds in hundredths of a bit. Converting probabilities to
//! scores blends each frequency with the background using a small pseudo
//! count, weighted by the number of sites:
//!
//! ```text
//! f' = (pseudo * bg + f * sites) / (sites + pseudo)
//! score = 100 * log2(f' / bg)
//! ```
//!
//! [`scores_to_freqs`] is the algebraic inverse, clamped to `[0, 1]`.
//!
//! ## IUPAC codes
//!
//! [`find_code`] picks the code whose implied frequencies are closest (least
//! squares) to a matrix row.

use crate::alphabet::Alphabet;
use crate::model::Matrix;

pub const DEFAULT_SITECOUNT: f64 = 20.0;
pub const DEFAULT_PSEUDOCOUNT: f64 = 0.01;

/// Frequencies substituted for zero when computing scores.
const MIN_FREQ: f64 = 0.0000005;

/// Site and pseudo counts for matrix conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Counts {
    pub site_count: f64,
    pub pseudo_count: f64,
}

impl Default for Counts {
    fn default() -> Self {
        Self {
            site_count: DEFAULT_SITECOUNT,
            pseudo_count: DEFAULT_PSEUDOCOUNT,
        }
    }
}

impl Counts {
    pub fn with_sites(site_count: f64) -> Self {
        Self {
            site_count,
            ..Self::default()
        }
    }
}

pub fn uniform_freqs(length: usize) -> Vec<f64> {
    if length == 0 {
        return Vec::new();
    }
    vec![1.0 / length as f64; length]
}

fn background_for<'a>(matrix: &Matrix, background: Option<&'a [f64]>, owned: &'a mut Vec<f64>) -> &'a [f64] {
    match background {
        Some(bg) => bg,
        None => {
            *owned = uniform_freqs(matrix.first().map_or(0, Vec::len));
            owned
        }
    }
}

/// Converts a score matrix into probabilities. A missing background is
/// uniform over the row length.
pub fn scores_to_freqs(scores: &Matrix, counts: Counts, background: Option<&[f64]>) -> Matrix {
    let mut uniform = Vec::new();
    let background = background_for(scores, background, &mut uniform);
    let total = counts.site_count + counts.pseudo_count;
    scores
        .iter()
        .map(|row| {
            background
                .iter()
                .zip(row)
                .map(|(&bg, &score)| {
                    let freq = 2f64.powf(score / 100.0) * bg;
                    let freq = (freq * total - bg * counts.pseudo_count) / counts.site_count;
                    freq.clamp(0.0, 1.0)
                })
                .collect()
        })
        .collect()
}

/// Converts a probability matrix into scores. A missing background is
/// uniform over the row length.
pub fn freqs_to_scores(freqs: &Matrix, counts: Counts, background: Option<&[f64]>) -> Matrix {
    let mut uniform = Vec::new();
    let background = background_for(freqs, background, &mut uniform);
    let total = counts.site_count + counts.pseudo_count;
    freqs
        .iter()
        .map(|row| {
            background
                .iter()
                .zip(row)
                .map(|(&bg, &freq)| {
                    let mut freq = (counts.pseudo_count * bg + freq * counts.site_count) / total;
                    if freq <= 0.0 {
                        freq = MIN_FREQ;
                    }
                    (freq / bg).log2() * 100.0
                })
                .collect()
        })
        .collect()
}

/// Nucleotide codes and the letter indexes (A, C, G, T) they stand for.
const DNA_CODES: [(char, &[usize]); 16] = [
    ('A', &[0]),
    ('C', &[1]),
    ('G', &[2]),
    ('T', &[3]),
    ('U', &[3]),
    ('W', &[0, 3]),
    ('S', &[1, 2]),
    ('M', &[0, 1]),
    ('K', &[2, 3]),
    ('R', &[0, 2]),
    ('Y', &[1, 3]),
    ('B', &[1, 2, 3]),
    ('D', &[0, 2, 3]),
    ('H', &[0, 1, 3]),
    ('V', &[0, 1, 2]),
    ('N', &[0, 1, 2, 3]),
];

/// Protein codes and the letter indexes they stand for; X is every letter.
const PROTEIN_CODES: [(char, &[usize]); 24] = [
    ('A', &[0]),
    ('C', &[1]),
    ('D', &[2]),
    ('E', &[3]),
    ('F', &[4]),
    ('G', &[5]),
    ('H', &[6]),
    ('I', &[7]),
    ('K', &[8]),
    ('L', &[9]),
    ('M', &[10]),
    ('N', &[11]),
    ('P', &[12]),
    ('Q', &[13]),
    ('R', &[14]),
    ('S', &[15]),
    ('T', &[16]),
    ('V', &[17]),
    ('W', &[18]),
    ('Y', &[19]),
    ('B', &[2, 11]),
    ('Z', &[3, 13]),
    ('J', &[7, 9]),
    ('X', &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19]),
];

/// Letter indexes a code stands for (case-insensitive).
pub fn code_indexes(alphabet: Alphabet, code: char) -> Option<&'static [usize]> {
    let codes: &[(char, &'static [usize])] = match alphabet {
        Alphabet::Dna | Alphabet::Rna => &DNA_CODES,
        Alphabet::Protein => &PROTEIN_CODES,
        Alphabet::Unknown => return None,
    };
    let code = code.to_ascii_uppercase();
    codes.iter().find(|(c, _)| *c == code).map(|(_, indexes)| *indexes)
}

/// A code together with the frequencies it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeFreqs {
    pub code: char,
    pub freqs: Vec<f64>,
}

fn code_freqs(codes: &[(char, &[usize])], alen: usize) -> Vec<CodeFreqs> {
    codes
        .iter()
        .map(|(code, indexes)| {
            let mut freqs = vec![0.0; alen];
            let share = 1.0 / indexes.len() as f64;
            for &i in indexes.iter() {
                freqs[i] += share;
            }
            CodeFreqs { code: *code, freqs }
        })
        .collect()
}

/// The codes searched for an alphabet; empty when the alphabet is unknown.
pub fn search_space(alphabet: Alphabet) -> Vec<CodeFreqs> {
    match alphabet {
        Alphabet::Dna | Alphabet::Rna => code_freqs(&DNA_CODES, 4),
        Alphabet::Protein => code_freqs(&PROTEIN_CODES, 20),
        Alphabet::Unknown => Vec::new(),
    }
}

/// The code whose frequencies are closest to `column`. Ties keep the
/// earliest code in the search space.
pub fn find_code(column: &[f64], space: &[CodeFreqs]) -> Option<char> {
    let mut best: Option<(char, f64)> = None;
    for candidate in space {
        let sum: f64 = column
            .iter()
            .zip(&candidate.freqs)
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        if best.map_or(true, |(_, best_sum)| sum < best_sum) {
            best = Some((candidate.code, sum));
        }
    }
    best.map(|(code, _)| code)
}

/// The closest code for every row of a probability matrix.
pub fn find_codes(matrix: &Matrix, space: &[CodeFreqs]) -> String {
    matrix.iter().filter_map(|row| find_code(row, space)).collect()
}

/// IUPAC consensus of a probability matrix, with U in place of T for RNA.
pub fn consensus(matrix: &Matrix, alphabet: Alphabet) -> String {
    let codes = find_codes(matrix, &search_space(alphabet));
    if alphabet == Alphabet::Rna {
        codes.replace('T', "U")
    } else {
        codes
    }
}

/// True when every value is within `tolerance` of summing to 1.
pub fn sums_to_one(values: &[f64], tolerance: f64) -> bool {
    (values.iter().sum::<f64>() - 1.0).abs() <= tolerance
}
