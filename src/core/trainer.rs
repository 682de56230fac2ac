//! Greedy merge-rule learning over a live corpus.
//!
//! Each round counts adjacent symbol pairs across all words (sharded over
//! the worker pool, reduced by key-sum), picks one pair under a fixed total
//! order, mints a new symbol id for it, and rewrites every word in place.
//! Rounds are strictly sequential; only the counting inside a round is
//! parallel, and the reduction is an associative sum, so the thread count
//! never influences the learned rules. The output is identical to a naive
//! trainer that rescans the whole corpus from scratch every round.

use std::cmp::Ordering;
use std::path::Path;

use log::info;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::core::alphabet::Alphabet;
use crate::core::config::TrainConfig;
use crate::core::corpus::{normalize_whitespace, Corpus};
use crate::core::error::{Error, Result};
use crate::core::model::Model;

/// An adjacent symbol pair, left then right.
pub type Pair = (u32, u32);

/// One learned merge: adjacent `(x, y)` rewrites to `z`. Product ids
/// strictly increase in rule order, which is also the application order
/// at encode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Merge candidate ordered by the selection rule: count first, then
/// smaller max operand, then smaller min operand, then larger left
/// operand. Distinct pairs never compare equal, so selection is a total
/// order and independent of map iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    x: u32,
    y: u32,
    count: u64,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| {
                let this_mx = self.x.max(self.y);
                let other_mx = other.x.max(other.y);
                other_mx.cmp(&this_mx)
            })
            .then_with(|| {
                let this_mn = self.x.min(self.y);
                let other_mn = other.x.min(other.y);
                other_mn.cmp(&this_mn)
            })
            .then_with(|| self.x.cmp(&other.x))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Counts adjacent pairs in one word. Inside a run of three or more equal
/// symbols only non-overlapping pairs are counted: after (x, x) in an
/// "xxx" pattern the scan skips one position, so "aaa" contributes a
/// single (a, a).
fn count_word(word: &[u32], acc: &mut FxHashMap<Pair, u64>) {
    let mut i = 0;
    while i + 1 < word.len() {
        *acc.entry((word[i], word[i + 1])).or_insert(0) += 1;
        if word[i] == word[i + 1] && i + 2 < word.len() && word[i] == word[i + 2] {
            i += 1;
        }
        i += 1;
    }
}

/// Full pair count over the corpus: thread-local accumulators merged by a
/// single key-sum. No shared mutable counter exists during the hot loop.
fn count_pairs(words: &[Vec<u32>]) -> FxHashMap<Pair, u64> {
    words
        .par_iter()
        .fold(FxHashMap::default, |mut acc, word| {
            count_word(word, &mut acc);
            acc
        })
        .reduce(FxHashMap::default, |mut acc, local| {
            for (pair, n) in local {
                *acc.entry(pair).or_insert(0) += n;
            }
            acc
        })
}

fn select_best(counts: &FxHashMap<Pair, u64>) -> Option<(Pair, u64)> {
    counts
        .iter()
        .map(|(&(x, y), &count)| Candidate { x, y, count })
        .max()
        .map(|c| ((c.x, c.y), c.count))
}

/// Rewrites every non-overlapping adjacent `(x, y)` to `z`, left to right.
/// A freshly written `z` is never re-examined as the left side of a new
/// match in the same pass.
pub(crate) fn apply_rule(word: &mut Vec<u32>, rule: &Rule) {
    let len = word.len();
    let mut read = 0;
    let mut write = 0;
    while read < len {
        if read + 1 < len && word[read] == rule.x && word[read + 1] == rule.y {
            word[write] = rule.z;
            read += 2;
        } else {
            word[write] = word[read];
            read += 1;
        }
        write += 1;
    }
    word.truncate(write);
}

/// Learns a BPE vocabulary from raw text according to a [`TrainConfig`].
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainConfig,
}

impl Trainer {
    /// Validates the configuration up front; training itself has no
    /// failure modes beyond I/O on the optional model sink.
    pub fn new(cfg: TrainConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }

    /// Trains on UTF-8 text and returns the immutable model state.
    ///
    /// Stops early, below the target vocabulary size, once the corpus has
    /// no adjacent pair left to merge; that is a normal outcome and the
    /// caller can inspect `model.rules().len()`.
    pub fn train(&self, text: &str) -> Result<Model> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.cfg.n_threads)
            .build()?;

        let stream = normalize_whitespace(text);
        let alphabet = Alphabet::build(&stream, self.cfg.coverage, &self.cfg.special);
        let mut corpus = Corpus::build(&stream, &alphabet);

        let n_special = self.cfg.special.n_special;
        let mut used_ids = n_special + alphabet.len() as u32;
        let mut rules: Vec<Rule> = Vec::new();

        while used_ids < self.cfg.vocab_size {
            let counts = pool.install(|| count_pairs(corpus.words()));
            let Some(((x, y), count)) = select_best(&counts) else {
                info!(
                    "training stopped early at vocab size {}: no mergeable pairs left",
                    used_ids
                );
                break;
            };

            let z = used_ids;
            used_ids += 1;
            let rule = Rule { x, y, z };
            for word in corpus.words_mut() {
                apply_rule(word, &rule);
            }
            rules.push(rule);

            info!(
                "round {:>5}: merged ({}, {}) -> {} with count {}",
                rules.len(),
                x,
                y,
                z,
                count
            );
        }

        info!(
            "training complete: {} special + {} chars + {} rules = vocab {}",
            n_special,
            alphabet.len(),
            rules.len(),
            used_ids
        );
        Ok(Model::new(alphabet, rules, self.cfg.special))
    }

    /// Trains on raw bytes, rejecting malformed UTF-8 before any work.
    pub fn train_bytes(&self, data: &[u8]) -> Result<Model> {
        let text = std::str::from_utf8(data).map_err(|_| Error::InvalidUtf8)?;
        self.train(text)
    }

    /// Trains and persists the model to `path` in the versioned text
    /// format of [`Model::save`].
    pub fn train_to_path<P: AsRef<Path>>(&self, text: &str, path: P) -> Result<Model> {
        let model = self.train(text)?;
        model.save(path)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_run_counts_non_overlapping_pairs_once() {
        // "aaa" with a = 5: exactly one (5, 5) despite two adjacent slots.
        let mut acc = FxHashMap::default();
        count_word(&[6, 5, 5, 5], &mut acc);
        assert_eq!(acc.get(&(5, 5)), Some(&1));
        assert_eq!(acc.get(&(6, 5)), Some(&1));

        // Four in a row: two non-overlapping pairs.
        let mut acc = FxHashMap::default();
        count_word(&[5, 5, 5, 5], &mut acc);
        assert_eq!(acc.get(&(5, 5)), Some(&2));
    }

    #[test]
    fn selection_prefers_count_then_smaller_max() {
        let a = Candidate { x: 9, y: 2, count: 3 };
        let b = Candidate { x: 4, y: 5, count: 3 };
        assert!(b > a, "smaller max operand wins on equal count");

        let c = Candidate { x: 9, y: 2, count: 4 };
        assert!(c > b, "count dominates everything");
    }

    #[test]
    fn selection_breaks_full_ties_by_left_operand() {
        // Same count, same {min, max} set: the pair with the larger left
        // operand wins.
        let ab = Candidate { x: 4, y: 5, count: 2 };
        let ba = Candidate { x: 5, y: 4, count: 2 };
        assert!(ba > ab);
    }

    #[test]
    fn merge_scan_does_not_reexamine_replacement() {
        // Rule (7, 4 -> 9) over [7, 4, 4]: the freshly written 9 must not
        // pair with the trailing 4 in the same pass.
        let mut word = vec![7, 4, 4];
        apply_rule(&mut word, &Rule { x: 7, y: 4, z: 9 });
        assert_eq!(word, vec![9, 4]);
    }

    #[test]
    fn merge_rewrites_left_to_right_non_overlapping() {
        let mut word = vec![5, 5, 5];
        apply_rule(&mut word, &Rule { x: 5, y: 5, z: 8 });
        assert_eq!(word, vec![8, 5]);

        let mut word = vec![5, 5, 5, 5];
        apply_rule(&mut word, &Rule { x: 5, y: 5, z: 8 });
        assert_eq!(word, vec![8, 8]);
    }

    #[test]
    fn sharded_counting_matches_serial() {
        let words: Vec<Vec<u32>> = (0..200)
            .map(|i| vec![4 + (i % 3), 5, 5, 5, 4 + (i % 2)])
            .collect();
        let parallel = count_pairs(&words);
        let mut serial = FxHashMap::default();
        for word in &words {
            count_word(word, &mut serial);
        }
        assert_eq!(parallel, serial);
    }
}
