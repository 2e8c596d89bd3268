//! Motifs typed in by hand.
//!
//! Two notations are accepted:
//!
//! - IUPAC sites, one per line, with `[...]` listing alternatives at a
//!   position:
//!
//!   ```text
//!   TATAAT
//!   TA[TC]AAT
//!   ```
//!
//! - a count matrix, either one row per position or one line per letter:
//!
//!   ```text
//!   3 0 1 0
//!   0 4 0 0
//!   ```
//!
//! The first letter or number decides which. The text is kept as a list of
//! [`Token`]s so an editor can highlight problems; tokens that break the
//! motif are flagged but never stop it from being built.

use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::alphabet::Alphabet;
use crate::model::{Matrix, Motif};
use crate::motif::utils::{self, Counts};
use crate::motif::{MotifError, MotifResult};

/// Flags describing a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenClass(u8);

impl TokenClass {
    pub const NONE: Self = Self(0);
    /// Only whitespace.
    pub const SPACE: Self = Self(1);
    /// Whitespace containing a newline.
    pub const LINE: Self = Self(2);
    pub const MATRIX: Self = Self(4);
    pub const IUPAC: Self = Self(8);
    pub const WARN: Self = Self(16);
    pub const ERROR: Self = Self(32);
    /// The indicator belongs on the right of the token.
    pub const EAST: Self = Self(64);
    /// The indicator belongs below the token.
    pub const SOUTH: Self = Self(128);

    pub fn has(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for TokenClass {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TokenClass {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TokenClass {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// Marks a line shorter than the first one.
const SHORT_LINE: &str = "\u{2605}";
/// Difference in total count allowed between matrix rows.
const COUNT_DELTA: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub class: TokenClass,
    /// A short hint shown next to the token.
    pub indicator: Option<String>,
}

impl Token {
    fn new(text: &str, class: TokenClass) -> Self {
        Self {
            text: text.to_string(),
            class,
            indicator: None,
        }
    }

    fn flag(&mut self, class: TokenClass) {
        self.class |= class;
    }

    fn mark(&mut self, indicator: String, side: TokenClass) {
        self.indicator = Some(indicator);
        self.class |= side;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleMotif {
    pub tokens: Vec<Token>,
    pub motif: Motif,
}

impl SimpleMotif {
    /// Builds motif number `motif_num` from `text`.
    pub fn parse(alphabet: Alphabet, text: &str, motif_num: usize) -> MotifResult<SimpleMotif> {
        let alen = alphabet
            .size()
            .ok_or_else(|| MotifError::new("A simple motif needs a known alphabet."))?;
        let mut tokens = tokenize(text);
        let start = tokens
            .iter()
            .position(|t| t.class == TokenClass::MATRIX || t.class == TokenClass::IUPAC)
            .ok_or_else(|| MotifError::new("No motif found."))?;
        let (pwm, nsites) = if tokens[start].class == TokenClass::MATRIX {
            parse_matrix(alen, &mut tokens, start)
        } else {
            parse_iupac(alphabet, alen, &mut tokens, start)
        };
        let psm = utils::freqs_to_scores(&pwm, Counts::with_sites(nsites), None);
        let motif = Motif {
            id: motif_num.to_string(),
            alt: Some(utils::consensus(&pwm, alphabet)),
            len: pwm.len(),
            nsites,
            // there is no way to know an E-value
            evalue: 0.0,
            pwm,
            psm: Some(psm),
            url: None,
        };
        Ok(SimpleMotif { tokens, motif })
    }

    pub fn has_errors(&self) -> bool {
        self.tokens.iter().any(|t| t.class.has(TokenClass::ERROR))
    }

    pub fn has_warnings(&self) -> bool {
        self.tokens.iter().any(|t| t.class.has(TokenClass::WARN) || t.indicator.is_some())
    }
}

/// Splits text into whitespace, number and letter tokens. Anything between
/// them becomes an error token.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in regex!(r"(\s+)|(\+?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)|([a-zA-Z\[\]])").captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::new(&text[last..whole.start()], TokenClass::ERROR));
        }
        let class = if caps.get(1).is_some() {
            if whole.as_str().contains('\n') {
                TokenClass::SPACE | TokenClass::LINE
            } else {
                TokenClass::SPACE
            }
        } else if caps.get(2).is_some() {
            TokenClass::MATRIX
        } else {
            TokenClass::IUPAC
        };
        tokens.push(Token::new(whole.as_str(), class));
        last = whole.end();
    }
    if last < text.len() {
        tokens.push(Token::new(&text[last..], TokenClass::ERROR));
    }
    tokens
}

/// Sorted union of two index sets.
fn merge(group: &mut Vec<usize>, value: &[usize]) {
    group.extend_from_slice(value);
    group.sort_unstable();
    group.dedup();
}

fn parse_iupac(alphabet: Alphabet, alen: usize, tokens: &mut [Token], start: usize) -> (Matrix, f64) {
    let any: Vec<usize> = (0..alen).collect();
    let mut lines: Vec<Vec<Vec<usize>>> = Vec::new();
    let mut line: Vec<Vec<usize>> = Vec::new();
    let mut group: Option<(usize, Vec<usize>)> = None;
    let mut expected: Option<usize> = None;
    let mut last = start;

    for i in start..tokens.len() {
        let class = tokens[i].class;
        if class.has(TokenClass::LINE) {
            if let Some((group_start, value)) = group.take() {
                // unclosed group
                if !value.is_empty() {
                    line.push(value);
                }
                tokens[group_start].flag(TokenClass::ERROR);
            }
            match expected {
                None => expected = Some(line.len()),
                Some(expected) if line.len() < expected => {
                    tokens[last].mark(SHORT_LINE.to_string(), TokenClass::EAST);
                }
                Some(_) => {}
            }
            lines.push(std::mem::take(&mut line));
            continue;
        }
        if class.has(TokenClass::MATRIX) {
            tokens[i].flag(TokenClass::ERROR);
        }
        if !class.has(TokenClass::IUPAC) {
            continue;
        }
        last = i;
        if expected.is_some_and(|expected| line.len() >= expected) {
            tokens[i].flag(TokenClass::ERROR);
        }
        let text = tokens[i].text.clone();
        match text.as_str() {
            "[" => {
                if group.is_none() {
                    group = Some((i, Vec::new()));
                } else {
                    tokens[i].flag(TokenClass::ERROR);
                }
            }
            "]" => match group.take() {
                Some((_, value)) => {
                    if !value.is_empty() {
                        line.push(value);
                    }
                }
                None => tokens[i].flag(TokenClass::ERROR),
            },
            code => {
                let value = code
                    .chars()
                    .next()
                    .and_then(|c| utils::code_indexes(alphabet, c))
                    .map(<[usize]>::to_vec);
                let value = match value {
                    Some(value) => value,
                    None => {
                        // unknown letters count as any letter
                        tokens[i].flag(TokenClass::ERROR);
                        any.clone()
                    }
                };
                match group.as_mut() {
                    Some((_, group_value)) => merge(group_value, &value),
                    None => line.push(value),
                }
            }
        }
    }
    if let Some((group_start, value)) = group.take() {
        if !value.is_empty() {
            line.push(value);
        }
        tokens[group_start].flag(TokenClass::ERROR);
    }
    // a trailing newline does not start another site
    if !line.is_empty() || lines.is_empty() {
        if let Some(expected) = expected {
            if line.len() < expected {
                tokens[last].mark(SHORT_LINE.to_string(), TokenClass::EAST);
            }
        }
        lines.push(line);
    }

    let size = lines[0].len();
    let mut pwm = Vec::with_capacity(size);
    for i in 0..size {
        let mut row = vec![0.0; alen];
        let mut counts = 0.0;
        for value in lines.iter().filter_map(|line| line.get(i)) {
            let share = 1.0 / value.len() as f64;
            for &k in value {
                row[k] += share;
            }
            counts += 1.0;
        }
        for freq in row.iter_mut() {
            *freq /= counts;
        }
        pwm.push(row);
    }
    (pwm, lines.len() as f64)
}

/// Reads matrix entries either row-per-position or line-per-letter.
struct Layout<'a> {
    lines: &'a [Vec<usize>],
    row_matrix: bool,
}

impl Layout<'_> {
    /// Token index of letter `alpha_pos` at motif position `entry_pos`.
    fn entry(&self, entry_pos: usize, alpha_pos: usize) -> Option<usize> {
        let (line, column) = if self.row_matrix {
            (entry_pos, alpha_pos)
        } else {
            (alpha_pos, entry_pos)
        };
        self.lines.get(line)?.get(column).copied()
    }

    /// Number of letters given for a position.
    fn entry_alen(&self, entry_pos: usize) -> usize {
        if self.row_matrix {
            self.lines.get(entry_pos).map_or(0, Vec::len)
        } else {
            self.lines
                .iter()
                .rposition(|line| line.len() > entry_pos)
                .map_or(0, |i| i + 1)
        }
    }

    fn side(&self) -> TokenClass {
        if self.row_matrix {
            TokenClass::EAST
        } else {
            TokenClass::SOUTH
        }
    }
}

fn count_format(difference: f64) -> String {
    format!("{}{:.1}", if difference > 0.0 { "+" } else { "" }, difference)
}

fn parse_matrix(alen: usize, tokens: &mut [Token], start: usize) -> (Matrix, f64) {
    let mut lines: Vec<Vec<usize>> = Vec::new();
    let mut line = Vec::new();
    for i in start..tokens.len() {
        let class = tokens[i].class;
        if class.has(TokenClass::LINE) {
            lines.push(std::mem::take(&mut line));
        } else if class.has(TokenClass::IUPAC) {
            tokens[i].flag(TokenClass::ERROR);
        }
        if class.has(TokenClass::MATRIX) {
            line.push(i);
        }
    }
    lines.push(line);
    // lines without numbers, such as a trailing newline, carry nothing
    lines.retain(|line| !line.is_empty());

    let first_len = lines.first().map_or(0, Vec::len);
    let row_matrix = if first_len == alen {
        true
    } else if lines.len() == alen {
        false
    } else if first_len < alen && lines.len() < alen {
        // still being typed: pick the longer side, preferring columns on a
        // tie because people add lines faster than columns
        first_len > lines.len()
    } else {
        first_len < alen || lines.len() >= alen
    };
    let layout = Layout {
        lines: &lines,
        row_matrix,
    };

    let size = if row_matrix { lines.len() } else { first_len };
    let mut pwm = Vec::with_capacity(size);
    let mut expected_counts: Option<f64> = None;
    for i in 0..size {
        let mut row = vec![0.0; alen];
        let mut full = true;
        for (j, freq) in row.iter_mut().enumerate() {
            match layout.entry(i, j) {
                Some(t) => *freq = tokens[t].text.parse().unwrap_or(0.0),
                None => full = false,
            }
        }
        let counts: f64 = row.iter().sum();
        let entry_alen = layout.entry_alen(i);
        if full && entry_alen == alen {
            match expected_counts {
                None => expected_counts = Some(counts),
                Some(expected) if (expected - counts).abs() > COUNT_DELTA => {
                    for j in 0..alen {
                        if let Some(t) = layout.entry(i, j) {
                            tokens[t].flag(TokenClass::WARN);
                        }
                    }
                    if let Some(t) = layout.entry(i, alen - 1) {
                        tokens[t].mark(count_format(expected - counts), layout.side());
                    }
                }
                Some(_) => {}
            }
        } else if entry_alen > alen {
            for j in alen..entry_alen {
                if let Some(t) = layout.entry(i, j) {
                    tokens[t].flag(TokenClass::ERROR);
                }
            }
        } else if let Some(t) = entry_alen.checked_sub(1).and_then(|j| layout.entry(i, j)) {
            tokens[t].mark(SHORT_LINE.to_string(), layout.side());
        }
        if counts == 0.0 {
            // keep the row a valid distribution
            row.fill(1.0 / alen as f64);
        } else {
            for freq in row.iter_mut() {
                *freq /= counts;
            }
        }
        pwm.push(row);
    }
    if !row_matrix {
        for line in &lines {
            for &t in line.iter().skip(size) {
                tokens[t].flag(TokenClass::ERROR);
            }
        }
    }
    let nsites = expected_counts.map_or(1.0, |counts| counts.round().max(1.0));
    (pwm, nsites)
}
