//! Mutable corpus representation consumed by the trainer.

use crate::core::alphabet::{Alphabet, SPACE_SENTINEL};

/// Replaces every whitespace character with the sentinel and trims
/// trailing whitespace, which never contributes a word.
pub fn normalize_whitespace(text: &str) -> Vec<char> {
    let mut stream: Vec<char> = text
        .chars()
        .map(|c| if c.is_whitespace() { SPACE_SENTINEL } else { c })
        .collect();
    while stream.last() == Some(&SPACE_SENTINEL) {
        stream.pop();
    }
    stream
}

/// Whitespace-delimited words, each a growable symbol-id sequence prefixed
/// with the sentinel id. Rewritten in place by the trainer on every merge
/// round and discarded afterwards.
#[derive(Debug, Default)]
pub struct Corpus {
    words: Vec<Vec<u32>>,
}

impl Corpus {
    /// Pure transform from the normalized stream: removed characters are
    /// stripped first (splicing their neighbors together), then each
    /// maximal non-sentinel run becomes one word. Words consisting only of
    /// removed characters vanish entirely.
    pub fn build(stream: &[char], alphabet: &Alphabet) -> Corpus {
        // The sentinel is always present for a non-empty stream; only a
        // model built from empty text lacks it, and that has no words.
        let Some(space_id) = alphabet.id_of(SPACE_SENTINEL) else {
            return Corpus::default();
        };

        let filtered: Vec<char> = stream
            .iter()
            .copied()
            .filter(|&c| !alphabet.is_removed(c))
            .collect();

        let mut words = Vec::new();
        let mut i = 0;
        while i < filtered.len() {
            while i < filtered.len() && filtered[i] == SPACE_SENTINEL {
                i += 1;
            }
            if i == filtered.len() {
                break;
            }
            let mut word = vec![space_id];
            while i < filtered.len() && filtered[i] != SPACE_SENTINEL {
                if let Some(id) = alphabet.id_of(filtered[i]) {
                    word.push(id);
                }
                i += 1;
            }
            words.push(word);
        }
        Corpus { words }
    }

    pub fn words(&self) -> &[Vec<u32>] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [Vec<u32>] {
        &mut self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SpecialTokens;

    fn build(text: &str, coverage: f64) -> (Vec<char>, Alphabet) {
        let stream = normalize_whitespace(text);
        let alphabet = Alphabet::build(&stream, coverage, &SpecialTokens::default());
        (stream, alphabet)
    }

    #[test]
    fn words_are_sentinel_prefixed() {
        let (stream, alphabet) = build("ab ba", 1.0);
        let corpus = Corpus::build(&stream, &alphabet);
        let space = alphabet.id_of(SPACE_SENTINEL).unwrap();
        let a = alphabet.id_of('a').unwrap();
        let b = alphabet.id_of('b').unwrap();
        assert_eq!(corpus.words(), &[vec![space, a, b], vec![space, b, a]]);
    }

    #[test]
    fn whitespace_runs_collapse_to_boundaries() {
        let (stream, alphabet) = build("  a \t\n b  ", 1.0);
        let corpus = Corpus::build(&stream, &alphabet);
        assert_eq!(corpus.words().len(), 2);
        assert!(corpus.words().iter().all(|w| w.len() == 2));
    }

    #[test]
    fn removed_chars_splice_neighbors() {
        // 'z' occurs once among many 'a's; low coverage removes it,
        // so "za" collapses into a single-character word.
        let (stream, alphabet) = build("aaaa za", 0.7);
        assert!(alphabet.is_removed('z'));
        let corpus = Corpus::build(&stream, &alphabet);
        let a = alphabet.id_of('a').unwrap();
        assert_eq!(corpus.words()[1][1..], [a]);
    }

    #[test]
    fn whitespace_free_text_forms_one_word() {
        let (stream, alphabet) = build("abab", 1.0);
        let corpus = Corpus::build(&stream, &alphabet);
        let space = alphabet.id_of(SPACE_SENTINEL).unwrap();
        let a = alphabet.id_of('a').unwrap();
        let b = alphabet.id_of('b').unwrap();
        assert_eq!(corpus.words(), &[vec![space, a, b, a, b]]);
    }

    #[test]
    fn empty_text_yields_empty_corpus() {
        let (stream, alphabet) = build("   ", 1.0);
        let corpus = Corpus::build(&stream, &alphabet);
        assert!(corpus.is_empty());
    }
}
