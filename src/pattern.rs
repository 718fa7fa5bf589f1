//! # `gost::pattern`
//!
//! A fixed byte-sequence matcher with a single wildcard sentinel. This is the substrate
//! the direct- and indirect-reference catalogues are built on: correctness-oriented, not
//! performance-tuned, since the instruction windows involved are tiny relative to a
//! `.text` section and a naive nested scan is adequate.
//!

/// Sentinel byte meaning "match any byte at this position"
pub const WILDCARD: u8 = 0xFF;

/// A single match: a starting byte offset into the scanned buffer, and the index of the
/// pattern (within the slice passed to [`match_bytes`]) that matched there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub index: usize,
    pub pattern: usize,
}

/// Finds every occurrence of every pattern in `data`, in ascending `(index, pattern)` order.
///
/// A pattern matches at position `i` iff `i + pattern.len() <= data.len()` and every byte of
/// the pattern is either [`WILDCARD`] or equal to the corresponding byte of `data`. Overlapping
/// matches at different positions are all reported independently.
///
/// # Panics
///
/// Panics if any pattern is empty — a zero-length pattern is a catalogue bug, not a runtime
/// condition callers should recover from.
pub fn match_bytes(data: &[u8], patterns: &[&[u8]]) -> Vec<Match> {
    for p in patterns {
        assert!(!p.is_empty(), "pattern matcher was given a zero-length pattern");
    }

    let mut results = Vec::new();

    for i in 0..data.len() {
        for (j, pattern) in patterns.iter().enumerate() {
            if i + pattern.len() > data.len() {
                continue;
            }

            let matched = pattern.iter().enumerate().all(|(k, &next)| {
                next == WILDCARD || next == data[i + k]
            });

            if matched {
                results.push(Match { index: i, pattern: j });
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_pattern() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let pattern: &[u8] = &[0x02, 0x03];
        let matches = match_bytes(&data, &[pattern]);
        assert_eq!(matches, vec![Match { index: 1, pattern: 0 }]);
    }

    #[test]
    fn wildcard_matches_any_byte() {
        let data = [0x48, 0x00, 0x90];
        let pattern: &[u8] = &[0x48, WILDCARD, 0x90];
        let matches = match_bytes(&data, &[pattern]);
        assert_eq!(matches, vec![Match { index: 0, pattern: 0 }]);
    }

    #[test]
    fn overlapping_matches_are_all_reported() {
        let data = [0xAA, 0xAA, 0xAA];
        let pattern: &[u8] = &[0xAA, 0xAA];
        let matches = match_bytes(&data, &[pattern]);
        assert_eq!(matches, vec![
            Match { index: 0, pattern: 0 },
            Match { index: 1, pattern: 0 },
        ]);
    }

    #[test]
    fn pattern_longer_than_remaining_data_does_not_match() {
        let data = [0x01, 0x02];
        let pattern: &[u8] = &[0x01, 0x02, 0x03];
        assert!(match_bytes(&data, &[pattern]).is_empty());
    }

    #[test]
    fn multiple_patterns_ordered_by_index_then_pattern() {
        let data = [0x01, 0x02];
        let p0: &[u8] = &[0x02];
        let p1: &[u8] = &[0x01];
        let matches = match_bytes(&data, &[p0, p1]);
        assert_eq!(matches, vec![
            Match { index: 0, pattern: 1 },
            Match { index: 1, pattern: 0 },
        ]);
    }

    #[test]
    #[should_panic]
    fn zero_length_pattern_panics() {
        let data = [0x01];
        let empty: &[u8] = &[];
        match_bytes(&data, &[empty]);
    }
}
