//! Core BPE engine for subtok.
//!
//! This module contains the vocabulary learner and encoder:
//!
//! - [`Alphabet`]: bounded initial symbol set with a coverage cutoff
//! - [`Corpus`]: sentinel-prefixed word sequences the trainer mutates
//! - [`Trainer`]: greedy, deterministic merge-rule learning
//! - [`Model`]: immutable trained state with recipe and vocab views
//! - [`Encoder`]: rule application over new text, batched across threads
//!
//! # Determinism
//!
//! The defining constraint of the whole crate: the optimized, parallel
//! trainer and encoder produce output identical to a naive quadratic
//! reference regardless of worker count. Pair counting shards into
//! thread-local accumulators reduced by a single key-sum, candidate
//! selection is a total order with no residual ties, and corpus rewriting
//! is single-threaded per round.

mod alphabet;
mod config;
mod corpus;
mod encoder;
mod error;
mod model;
mod trainer;

pub use alphabet::{Alphabet, SPACE_SENTINEL};
pub use config::{SpecialTokens, TrainConfig};
pub use corpus::{normalize_whitespace, Corpus};
pub use encoder::{EncodeOptions, Encoder};
pub use error::{Error, Result};
pub use model::Model;
pub use trainer::{Pair, Rule, Trainer};
