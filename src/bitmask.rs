//! Kernel-style resource bitmasks
//!
//! `/proc/<pid>/status` reports `Cpus_allowed` and `Mems_allowed` as
//! comma-separated hexadecimal masks. Thread sibling masks in sysfs use the
//! same format. Masks can exceed 64 bits on large machines, so the words are
//! kept in a vector, least significant word first.

use std::str::FromStr;
use thiserror::Error;

/// Error for malformed hexadecimal masks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid hex mask: {0:?}")]
pub struct ParseMaskError(pub String);

/// An allowed-resource bitmask of arbitrary width
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitMask {
    words: Vec<u64>,
}

impl BitMask {
    /// True when the given bit is set
    pub fn test(&self, bit: usize) -> bool {
        let word = bit / 64;
        match self.words.get(word) {
            Some(w) => w & (1u64 << (bit % 64)) != 0,
            None => false,
        }
    }

    /// Number of set bits at positions `0..=bit`
    pub fn count_through(&self, bit: usize) -> u32 {
        let full_words = bit / 64;
        let mut count = 0;
        for w in self.words.iter().take(full_words) {
            count += w.count_ones();
        }
        if let Some(w) = self.words.get(full_words) {
            let keep = bit % 64 + 1;
            let masked = if keep == 64 { *w } else { w & ((1u64 << keep) - 1) };
            count += masked.count_ones();
        }
        count
    }

    /// True when no bit is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

impl FromStr for BitMask {
    type Err = ParseMaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit() || b == b',') {
            return Err(ParseMaskError(s.to_string()));
        }
        let digits: String = s.chars().filter(|c| *c != ',').collect();
        if digits.is_empty() {
            return Err(ParseMaskError(s.to_string()));
        }
        let bytes = digits.as_bytes();
        let mut words = Vec::with_capacity(bytes.len() / 16 + 1);
        let mut end = bytes.len();
        while end > 0 {
            let start = end.saturating_sub(16);
            let chunk = &digits[start..end];
            let word = u64::from_str_radix(chunk, 16)
                .map_err(|_| ParseMaskError(s.to_string()))?;
            words.push(word);
            end = start;
        }
        while words.last() == Some(&0) {
            words.pop();
        }
        Ok(BitMask { words })
    }
}
