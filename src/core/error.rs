//! Error type shared by training, encoding, and model persistence.

use thiserror::Error;

/// Errors surfaced by the public API.
///
/// Internal invariant violations (a known symbol id with no recipe) are not
/// represented here: every id minted by training has a recipe by
/// construction, so a missing one is a programming error and panics.
#[derive(Error, Debug)]
pub enum Error {
    /// Input bytes are not valid UTF-8.
    #[error("invalid UTF-8 in input")]
    InvalidUtf8,
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A caller-supplied token id is outside the model's vocabulary.
    #[error("unknown token id: {0}")]
    UnknownId(u32),
    /// A model file failed to parse.
    #[error("model format error: {0}")]
    ModelFormat(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
