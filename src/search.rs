//! Boyer-Moore search over byte chunks.
//!
//! A needle may straddle two chunks. When the end of a chunk matches a
//! prefix of the needle, [`BmSearch::index_in`] reports a partial match; the
//! caller remembers how many bytes were matched and passes that amount,
//! negated, as the start index for the next chunk. The search then treats
//! those bytes as already present before the start of the new chunk.
//!
//! ```
//! use memecheck::search::BmSearch;
//!
//! let search = BmSearch::new("</script", true).unwrap();
//! let first = search.index_in(b"xxx</scr", 0).unwrap();
//! assert!(!first.complete);
//! let carry = first.carry(8);
//! let second = search.index_in(b"ipt>yyy", -(carry as isize)).unwrap();
//! assert!(second.complete);
//! assert_eq!(second.end(search.len()), 3);
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search string contains a character outside the ASCII range.")]
    NonAscii,

    #[error("Search string is empty.")]
    Empty,
}

/// Result of a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    /// Start of the match in the haystack. Negative when the match began in
    /// a previous chunk.
    pub index: isize,
    /// False when the match runs off the end of the haystack.
    pub complete: bool,
}

impl SearchMatch {
    /// Number of needle bytes matched at the end of a haystack of
    /// `haystack_len` bytes; the value to carry into the next search.
    pub fn carry(&self, haystack_len: usize) -> usize {
        (haystack_len as isize - self.index).max(0) as usize
    }

    /// Index just past the match.
    pub fn end(&self, needle_len: usize) -> usize {
        (self.index + needle_len as isize).max(0) as usize
    }
}

/// An ASCII needle with its precomputed shift tables.
#[derive(Debug, Clone)]
pub struct BmSearch {
    upper: Vec<u8>,
    lower: Option<Vec<u8>>,
    char_table: [usize; 128],
    offset_table: Vec<usize>,
}

impl BmSearch {
    pub fn new(needle: &str, ignore_case: bool) -> Result<Self, SearchError> {
        if !needle.is_ascii() {
            return Err(SearchError::NonAscii);
        }
        if needle.is_empty() {
            return Err(SearchError::Empty);
        }
        let (upper, lower) = if ignore_case {
            (
                needle.to_ascii_uppercase().into_bytes(),
                Some(needle.to_ascii_lowercase().into_bytes()),
            )
        } else {
            (needle.as_bytes().to_vec(), None)
        };
        let mut search = BmSearch {
            upper,
            lower,
            char_table: [0; 128],
            offset_table: Vec::new(),
        };
        search.char_table = search.make_char_table();
        search.offset_table = search.make_offset_table();
        Ok(search)
    }

    pub fn len(&self) -> usize {
        self.upper.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upper.is_empty()
    }

    pub fn is_ignoring_case(&self) -> bool {
        self.lower.is_some()
    }

    /// Searches `haystack` starting at `from`.
    ///
    /// `from` may be negative, down to `-(len - 1)`, meaning that many needle
    /// bytes were matched at the end of the previous chunk. Returns `None`
    /// when there is neither a complete nor a trailing partial match.
    pub fn index_in(&self, haystack: &[u8], from: isize) -> Option<SearchMatch> {
        let n = self.upper.len() as isize;
        let hay_len = haystack.len() as isize;
        debug_assert!(from >= -(n - 1) && from <= hay_len, "from index outside the haystack");
        let from = from.clamp(-(n - 1), hay_len);
        let byte_at = |i: isize| -> u8 {
            if i >= 0 {
                haystack[i as usize]
            } else {
                self.upper[(i - from) as usize]
            }
        };

        let mut i = from + n - 1;
        while i < hay_len {
            let mut j = n - 1;
            let mut h = byte_at(i);
            while self.matches(j, h) {
                if j == 0 {
                    return Some(SearchMatch { index: i, complete: true });
                }
                i -= 1;
                j -= 1;
                h = byte_at(i);
            }
            i += self.shift(h, self.offset_table[(n - 1 - j) as usize]);
        }

        // partial match running off the end; the overhang counts as matched
        let no_overlap = (hay_len - 1) + n;
        while i < no_overlap {
            let overhang = i - (hay_len - 1);
            let mut j = n - 1 - overhang;
            i -= overhang;
            let mut h = byte_at(i);
            while self.matches(j, h) {
                if j == 0 {
                    return Some(SearchMatch { index: i, complete: false });
                }
                i -= 1;
                j -= 1;
                h = byte_at(i);
            }
            // past the end only the bad character table is meaningful
            i += self.shift(h, (n - j) as usize);
        }
        None
    }

    fn matches(&self, j: isize, h: u8) -> bool {
        let j = j as usize;
        self.upper[j] == h || self.lower.as_ref().is_some_and(|lower| lower[j] == h)
    }

    fn shift(&self, h: u8, suffix_shift: usize) -> isize {
        if h < 128 {
            suffix_shift.max(self.char_table[h as usize]) as isize
        } else {
            self.upper.len() as isize
        }
    }

    fn make_char_table(&self) -> [usize; 128] {
        let n = self.upper.len();
        let mut table = [n; 128];
        for i in 0..n - 1 {
            table[self.upper[i] as usize] = n - 1 - i;
            if let Some(lower) = &self.lower {
                table[lower[i] as usize] = n - 1 - i;
            }
        }
        table
    }

    fn make_offset_table(&self) -> Vec<usize> {
        let n = self.upper.len();
        let mut table = vec![0; n];
        let mut last_prefix_position = n;
        for i in (0..n).rev() {
            if self.is_prefix(i + 1) {
                last_prefix_position = i + 1;
            }
            table[n - 1 - i] = last_prefix_position - i + n - 1;
        }
        for i in 0..n - 1 {
            let slen = self.suffix_length(i);
            table[slen] = n - 1 - i + slen;
        }
        table
    }

    fn is_prefix(&self, pos: usize) -> bool {
        self.upper[pos..]
            .iter()
            .zip(self.upper.iter())
            .all(|(a, b)| a == b)
    }

    fn suffix_length(&self, pos: usize) -> usize {
        self.upper[..=pos]
            .iter()
            .rev()
            .zip(self.upper.iter().rev())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Streams `chunks` through the search and returns the absolute end
    /// offsets of every complete match.
    fn stream_ends(search: &BmSearch, chunks: &[&[u8]]) -> Vec<usize> {
        let mut ends = Vec::new();
        let mut base = 0;
        let mut carry = 0usize;
        for chunk in chunks {
            let mut from = -(carry as isize);
            carry = 0;
            while let Some(m) = search.index_in(chunk, from) {
                if m.complete {
                    let end = m.end(search.len());
                    ends.push(base + end);
                    from = end as isize;
                } else {
                    carry = m.carry(chunk.len());
                    break;
                }
            }
            base += chunk.len();
        }
        ends
    }

    #[test]
    fn test_complete_match() {
        let search = BmSearch::new("needle", false).unwrap();
        let m = search.index_in(b"haystack with a needle in it", 0).unwrap();
        assert_eq!(m, SearchMatch { index: 16, complete: true });
        assert!(search.index_in(b"haystack without", 0).is_none());
    }

    #[test]
    fn test_partial_match_then_completion() {
        let search = BmSearch::new("</script", false).unwrap();
        let first = search.index_in(b"xxx</scr", 0).unwrap();
        assert_eq!(first, SearchMatch { index: 3, complete: false });
        assert_eq!(first.carry(8), 5);
        let second = search.index_in(b"ipt>yyy", -5).unwrap();
        assert_eq!(second, SearchMatch { index: -5, complete: true });
        assert_eq!(second.end(search.len()), 3);
    }

    #[test]
    fn test_no_match_returns_none() {
        let search = BmSearch::new("</script", true).unwrap();
        assert!(search.index_in(b"nothing to see", 0).is_none());
        // a carried prefix that does not continue
        assert!(search.index_in(b"xyz", -3).is_none());
    }

    #[test]
    fn test_ignore_case() {
        let search = BmSearch::new("</SCRIPT", true).unwrap();
        let m = search.index_in(b"var x;</Script>", 0).unwrap();
        assert_eq!(m, SearchMatch { index: 6, complete: true });
        let m = search.index_in(b"abc</sC", 0).unwrap();
        assert_eq!(m, SearchMatch { index: 3, complete: false });
    }

    #[test]
    fn test_case_sensitive_partial() {
        let search = BmSearch::new("-->", false).unwrap();
        assert_eq!(search.index_in(b"comment --", 0), Some(SearchMatch { index: 8, complete: false }));
        assert_eq!(search.index_in(b"comment -", 0), Some(SearchMatch { index: 8, complete: false }));
        assert_eq!(search.index_in(b">after", -2), Some(SearchMatch { index: -2, complete: true }));
    }

    #[test]
    fn test_non_ascii_haystack() {
        let search = BmSearch::new("abc", false).unwrap();
        let m = search.index_in("\u{e9}\u{e9}abc".as_bytes(), 0).unwrap();
        assert_eq!(m.index, 4);
        assert!(BmSearch::new("\u{e9}", false).is_err());
    }

    #[test]
    fn test_streamed_matches_any_split() {
        let search = BmSearch::new("@JSON_VAR", false).unwrap();
        let text = b"aa @JSON_VAR bb @JSON @JSON_VAR@JSON_VAR c";
        let whole = stream_ends(&search, &[text]);
        assert_eq!(whole, vec![12, 31, 40]);
        for split in 1..text.len() {
            let (a, b) = text.split_at(split);
            assert_eq!(stream_ends(&search, &[a, b]), whole, "split at {}", split);
        }
    }
}
