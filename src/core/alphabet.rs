//! Alphabet construction: bounded initial symbol set with coverage cutoff.
//!
//! The builder counts every distinct code point in the normalized training
//! stream, orders them by descending frequency (ascending code point on
//! ties), and keeps characters until the configured fraction of all
//! occurrences is covered. Everything rarer is recorded as removed and
//! stripped from the corpus before training. Id assignment follows the
//! same deterministic order, starting right after the special-token range,
//! so the whole construction is reproducible.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::config::SpecialTokens;

/// Sentinel standing in for any whitespace character. Every word is
/// prefixed with it, and subword pieces render word boundaries with it.
pub const SPACE_SENTINEL: char = '\u{2581}';

/// Mapping between surviving code points and compact symbol ids.
#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    char2id: FxHashMap<char, u32>,
    id2char: FxHashMap<u32, char>,
    removed: FxHashSet<char>,
}

impl Alphabet {
    /// Builds the alphabet from a normalized character stream.
    ///
    /// An empty stream yields an empty alphabet; that is a legal degenerate
    /// result, not an error. The sentinel is force-kept even when the
    /// coverage cutoff would drop it, and force-inserted with the last id
    /// when the stream contains no whitespace at all: every word carries a
    /// sentinel prefix, whitespace-free corpora included.
    pub fn build(stream: &[char], coverage: f64, special: &SpecialTokens) -> Alphabet {
        let mut counts: FxHashMap<char, u64> = FxHashMap::default();
        for &ch in stream {
            *counts.entry(ch).or_insert(0) += 1;
        }

        let mut ordered: Vec<(char, u64)> = counts.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let total: u64 = ordered.iter().map(|&(_, n)| n).sum();
        let required = (coverage * total as f64).ceil() as u64;

        let mut alphabet = Alphabet::default();
        let mut next_id = special.n_special;
        let mut covered = 0u64;
        for (ch, n) in ordered {
            if covered >= required && ch != SPACE_SENTINEL {
                alphabet.removed.insert(ch);
                continue;
            }
            covered += n;
            alphabet.char2id.insert(ch, next_id);
            alphabet.id2char.insert(next_id, ch);
            next_id += 1;
        }
        if !stream.is_empty() && !alphabet.char2id.contains_key(&SPACE_SENTINEL) {
            alphabet.char2id.insert(SPACE_SENTINEL, next_id);
            alphabet.id2char.insert(next_id, SPACE_SENTINEL);
        }

        log::debug!(
            "alphabet: {} kept, {} removed, coverage target {:.4}",
            alphabet.len(),
            alphabet.removed.len(),
            coverage
        );
        alphabet
    }

    pub fn id_of(&self, ch: char) -> Option<u32> {
        self.char2id.get(&ch).copied()
    }

    pub fn char_of(&self, id: u32) -> Option<char> {
        self.id2char.get(&id).copied()
    }

    pub fn is_removed(&self, ch: char) -> bool {
        self.removed.contains(&ch)
    }

    pub fn len(&self) -> usize {
        self.char2id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.char2id.is_empty()
    }

    /// Kept characters with their ids.
    pub fn chars(&self) -> impl Iterator<Item = (char, u32)> + '_ {
        self.char2id.iter().map(|(&c, &id)| (c, id))
    }

    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (char, u32)>) -> Alphabet {
        let mut alphabet = Alphabet::default();
        for (ch, id) in entries {
            alphabet.char2id.insert(ch, id);
            alphabet.id2char.insert(id, ch);
        }
        alphabet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn ids_follow_frequency_then_codepoint() {
        // a:3, b:2, c:1 with default 4 specials -> a=4, b=5, c=6
        let alphabet = Alphabet::build(&chars("aaabbc"), 1.0, &SpecialTokens::default());
        assert_eq!(alphabet.id_of('a'), Some(4));
        assert_eq!(alphabet.id_of('b'), Some(5));
        assert_eq!(alphabet.id_of('c'), Some(6));
        assert_eq!(alphabet.char_of(5), Some('b'));
    }

    #[test]
    fn frequency_ties_break_by_codepoint() {
        let alphabet = Alphabet::build(&chars("ba"), 1.0, &SpecialTokens::default());
        assert_eq!(alphabet.id_of('a'), Some(4));
        assert_eq!(alphabet.id_of('b'), Some(5));
    }

    #[test]
    fn coverage_drops_rare_characters() {
        // a:8, b:1, c:1; coverage 0.8 keeps 'a' plus the inserted sentinel
        let alphabet = Alphabet::build(&chars("aaaaaaaabc"), 0.8, &SpecialTokens::default());
        assert_eq!(alphabet.len(), 2);
        assert!(alphabet.is_removed('b'));
        assert!(alphabet.is_removed('c'));
        assert_eq!(alphabet.id_of('a'), Some(4));
        assert_eq!(alphabet.id_of(SPACE_SENTINEL), Some(5));
    }

    #[test]
    fn sentinel_survives_coverage_cutoff() {
        let mut stream = chars("aaaaaaaaa");
        stream.push(SPACE_SENTINEL);
        let alphabet = Alphabet::build(&stream, 0.5, &SpecialTokens::default());
        assert!(alphabet.id_of(SPACE_SENTINEL).is_some());
        assert!(!alphabet.is_removed(SPACE_SENTINEL));
    }

    #[test]
    fn sentinel_is_inserted_for_whitespace_free_streams() {
        // "abc" never produces a sentinel, but words still need their
        // prefix: it takes the id after the counted characters.
        let alphabet = Alphabet::build(&chars("abc"), 1.0, &SpecialTokens::default());
        assert_eq!(alphabet.id_of('a'), Some(4));
        assert_eq!(alphabet.id_of('c'), Some(6));
        assert_eq!(alphabet.id_of(SPACE_SENTINEL), Some(7));
    }

    #[test]
    fn empty_stream_is_legal() {
        let alphabet = Alphabet::build(&[], 1.0, &SpecialTokens::default());
        assert!(alphabet.is_empty());
    }
}
