//! Training configuration and special-token layout.

use crate::core::error::{Error, Result};

/// The four fixed special-token slots plus the count of active ones.
///
/// Special tokens occupy the lowest id range `0..n_special` and are never
/// operands of a merge rule; alphabet ids start at `n_special`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad: u32,
    pub unk: u32,
    pub bos: u32,
    pub eos: u32,
    /// How many ids are reserved at the bottom of the id space.
    pub n_special: u32,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            pad: 0,
            unk: 1,
            bos: 2,
            eos: 3,
            n_special: 4,
        }
    }
}

impl SpecialTokens {
    /// Placeholder text for a reserved id, used by vocab listings and
    /// id-mode decoding (where unknown-span literals are not recoverable).
    pub fn placeholder(&self, id: u32) -> Option<String> {
        if id >= self.n_special {
            return None;
        }
        Some(if id == self.pad {
            "<PAD>".to_string()
        } else if id == self.unk {
            "<UNK>".to_string()
        } else if id == self.bos {
            "<BOS>".to_string()
        } else if id == self.eos {
            "<EOS>".to_string()
        } else {
            format!("<SPECIAL{}>", id)
        })
    }
}

/// Configuration consumed by [`Trainer::new`](crate::core::Trainer::new).
#[derive(Debug, Clone)]
pub struct TrainConfig {
    /// Target vocabulary size: special tokens + alphabet + merge rules.
    /// Training may stop below this if the corpus runs out of pairs.
    pub vocab_size: u32,
    /// Fraction of character occurrences that must be retained in the
    /// alphabet, in `(0, 1]`. Rarer characters are dropped.
    pub coverage: f64,
    /// Worker threads for pair counting and batch encoding. `0` uses all
    /// available cores. A pure performance knob: it never changes output.
    pub n_threads: usize,
    pub special: SpecialTokens,
}

impl TrainConfig {
    /// Configuration with full character coverage, default special tokens,
    /// and one worker per core.
    pub fn new(vocab_size: u32) -> Self {
        Self {
            vocab_size,
            coverage: 1.0,
            n_threads: 0,
            special: SpecialTokens::default(),
        }
    }

    pub fn with_coverage(mut self, coverage: f64) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    pub fn with_special_tokens(mut self, special: SpecialTokens) -> Self {
        self.special = special;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.coverage > 0.0 && self.coverage <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "coverage must be in (0, 1], got {}",
                self.coverage
            )));
        }
        if self.special.n_special == 0 {
            return Err(Error::InvalidConfig(
                "at least one special token (unk) is required".into(),
            ));
        }
        if self.special.unk >= self.special.n_special {
            return Err(Error::InvalidConfig(format!(
                "unk id {} outside reserved range 0..{}",
                self.special.unk, self.special.n_special
            )));
        }
        if self.vocab_size < self.special.n_special {
            return Err(Error::InvalidConfig(format!(
                "vocab size {} smaller than special token count {}",
                self.vocab_size, self.special.n_special
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_reserves_four_low_ids() {
        let s = SpecialTokens::default();
        assert_eq!((s.pad, s.unk, s.bos, s.eos, s.n_special), (0, 1, 2, 3, 4));
        assert_eq!(s.placeholder(1).unwrap(), "<UNK>");
        assert_eq!(s.placeholder(4), None);
    }

    #[test]
    fn validation_rejects_bad_coverage() {
        assert!(TrainConfig::new(100).with_coverage(0.0).validate().is_err());
        assert!(TrainConfig::new(100).with_coverage(1.5).validate().is_err());
        assert!(TrainConfig::new(100).with_coverage(1.0).validate().is_ok());
    }

    #[test]
    fn validation_rejects_tiny_vocab() {
        assert!(TrainConfig::new(3).validate().is_err());
        assert!(TrainConfig::new(4).validate().is_ok());
    }
}
