//! subtok - trainable whitespace-BPE subword tokenizer.
//!
//! Learns a merge-rule vocabulary from raw UTF-8 text and applies it to
//! segment new text into integer token ids or printable subword pieces.
//! Training is greedy and deterministic: pair counting shards across a
//! fixed worker pool with thread-local accumulators, selection follows a
//! fixed total order, and the result is identical to a naive quadratic
//! reference for any thread count.
//!
//! ```
//! use std::sync::Arc;
//! use subtok::{Encoder, TrainConfig, Trainer};
//!
//! let trainer = Trainer::new(TrainConfig::new(40)).unwrap();
//! let model = trainer.train("the cat sat on the mat").unwrap();
//! let encoder = Encoder::new(Arc::new(model), 1).unwrap();
//!
//! let ids = encoder.encode_as_ids(&["the cat"]);
//! let text = encoder.decode(&ids[0]).unwrap();
//! assert_eq!(text, "the cat");
//! ```

pub mod core;

pub use core::{
    normalize_whitespace, Alphabet, Corpus, EncodeOptions, Encoder, Error, Model, Pair, Result,
    Rule, SpecialTokens, TrainConfig, Trainer, SPACE_SENTINEL,
};
