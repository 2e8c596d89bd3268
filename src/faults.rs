//! Bounded record of where faults occurred in a file.
//!
//! Every validator keeps one [`FileFaults`] per kind of problem. Faults are
//! counted without limit, but only the first few line ranges and sample
//! characters are stored, so a file with millions of bad lines costs the
//! same memory as a file with eleven.

/// A run of consecutive faulty lines (0-based, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub begin: u64,
    pub end: u64,
}

impl LineRange {
    fn len(&self) -> u64 {
        self.end - self.begin + 1
    }
}

#[derive(Debug, Clone)]
pub struct FileFaults {
    count: u64,
    line_max: usize,
    line_count: u64,
    lines: Vec<LineRange>,
    last_line: Option<u64>,
    letter_max: usize,
    letters: Vec<char>,
}

impl Default for FileFaults {
    fn default() -> Self {
        Self::new(10, 5)
    }
}

impl FileFaults {
    /// Stores at most `line_max` line ranges (at least one) and `letter_max`
    /// distinct sample characters.
    pub fn new(line_max: usize, letter_max: usize) -> Self {
        Self {
            count: 0,
            line_max: line_max.max(1),
            line_count: 0,
            lines: Vec::new(),
            last_line: None,
            letter_max,
            letters: Vec::new(),
        }
    }

    /// Records a fault on `line`, optionally caused by `letter`.
    ///
    /// Lines are expected in non-decreasing order; a fault on a line that
    /// was already recorded is counted but does not add a line.
    pub fn add(&mut self, line: u64, letter: Option<char>) {
        self.count += 1;
        if let Some(letter) = letter {
            if self.letters.len() < self.letter_max
                && !is_unprintable(letter)
                && !self.letters.contains(&letter)
            {
                self.letters.push(letter);
            }
        }
        match self.last_line {
            None => {
                self.line_count += 1;
                self.lines.push(LineRange { begin: line, end: line });
            }
            Some(last) if line == last + 1 => {
                self.line_count += 1;
                match self.lines.last_mut() {
                    Some(range) if range.end == last => range.end = line,
                    // the previous line was never stored
                    _ => {
                        if self.lines.len() < self.line_max {
                            self.lines.push(LineRange { begin: line, end: line });
                        }
                    }
                }
            }
            Some(last) if line > last => {
                self.line_count += 1;
                self.push_range(line);
            }
            Some(_) => return,
        }
        self.last_line = Some(line);
    }

    fn push_range(&mut self, line: u64) {
        if self.lines.len() < self.line_max {
            self.lines.push(LineRange { begin: line, end: line });
        }
    }

    /// Total number of faults added.
    pub fn faults(&self) -> u64 {
        self.count
    }

    /// Number of distinct lines with faults, stored or not.
    pub fn line_count(&self) -> u64 {
        self.line_count
    }

    pub fn ranges(&self) -> &[LineRange] {
        &self.lines
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    /// Sample characters as `'a', 'b' and 'c'`.
    pub fn letters_sep(&self) -> String {
        let mut text = String::new();
        let n = self.letters.len();
        for (i, letter) in self.letters.iter().enumerate() {
            if i > 0 {
                text.push_str(if i == n - 1 { " and " } else { ", " });
            }
            text.push('\'');
            text.push(*letter);
            text.push('\'');
        }
        text
    }

    /// Sample characters run together: `'a'` for one, `"abc"` for several.
    pub fn letters_join(&self) -> String {
        let joined: String = self.letters.iter().collect();
        match self.letters.len() {
            0 => String::new(),
            1 => format!("'{}'", joined),
            _ => format!("\"{}\"", joined),
        }
    }

    /// Stored lines as 1-based text, e.g. `1, 4-6 and 9`. When lines were
    /// dropped the list ends with `, ...`.
    pub fn lines_str(&self) -> String {
        let mut text = String::new();
        let mut count = 0;
        for (i, range) in self.lines.iter().enumerate() {
            count += range.len();
            if i > 0 {
                if i == self.lines.len() - 1 && count == self.line_count {
                    text.push_str(" and ");
                } else {
                    text.push_str(", ");
                }
            }
            if range.begin == range.end {
                text.push_str(&(range.begin + 1).to_string());
            } else {
                text.push_str(&format!("{}-{}", range.begin + 1, range.end + 1));
            }
        }
        if count < self.line_count {
            text.push_str(", ...");
        }
        text
    }
}

/// Characters that make poor examples in a message: controls, format
/// characters, private use and non-characters.
fn is_unprintable(c: char) -> bool {
    c.is_control()
        || matches!(
            c as u32,
            0xAD | 0x061C
                | 0x200B..=0x200F
                | 0x202A..=0x202E
                | 0x2060..=0x206F
                | 0xE000..=0xF8FF
                | 0xFEFF
                | 0xFFF9..=0xFFFB
                | 0xFFFE
                | 0xFFFF
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merges_consecutive_lines() {
        let mut faults = FileFaults::default();
        for line in [0, 3, 4, 5, 5, 9] {
            faults.add(line, None);
        }
        assert_eq!(faults.faults(), 6);
        assert_eq!(faults.line_count(), 5);
        assert_eq!(
            faults.ranges(),
            &[
                LineRange { begin: 0, end: 0 },
                LineRange { begin: 3, end: 5 },
                LineRange { begin: 9, end: 9 },
            ]
        );
        assert_eq!(faults.lines_str(), "1, 4-6 and 10");
    }

    #[test]
    fn test_storage_is_bounded() {
        let mut faults = FileFaults::new(3, 2);
        let mut n = 0;
        // 50 separate ranges, three faults each
        for range in 0..50u64 {
            for line in [range * 10, range * 10, range * 10 + 1] {
                faults.add(line, Some(char::from(b'a' + (range % 26) as u8)));
                n += 1;
            }
        }
        assert_eq!(faults.faults(), n);
        assert_eq!(faults.ranges().len(), 3);
        assert_eq!(faults.line_count(), 100);
        assert_eq!(faults.letters(), &['a', 'b']);
        assert_eq!(faults.lines_str(), "1-2, 11-12, 21-22, ...");
    }

    #[test]
    fn test_letters() {
        let mut faults = FileFaults::default();
        faults.add(0, Some('x'));
        assert_eq!(faults.letters_join(), "'x'");
        faults.add(0, Some('\u{7}'));
        faults.add(1, Some('x'));
        faults.add(2, Some('%'));
        faults.add(3, Some('*'));
        assert_eq!(faults.letters_sep(), "'x', '%' and '*'");
        assert_eq!(faults.letters_join(), "\"x%*\"");
    }
}
