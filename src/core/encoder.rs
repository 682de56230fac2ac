//! Applying a learned model to new text.
//!
//! Encoding re-derives each word's initial symbol sequence exactly the way
//! training did (sentinel prefix, same whitespace collapsing), then applies
//! the model's rules strictly in learned order — never by re-deriving the
//! best pair from runtime statistics. Unknown characters fold into spans:
//! a maximal run of consecutive unknown characters becomes one unit
//! carrying the unk id and the raw substring, not one token per character.
//!
//! Batches are sharded over an owned, fixed-size thread pool. Strings are
//! fully independent and the model is read-only, so per-string output is
//! byte-identical whatever the worker count or batch composition.
//!
//! Fully-known words are cached (LRU keyed by the initial id sequence
//! itself), so repeated words skip the rule replay entirely.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use rayon::prelude::*;
use rustc_hash::FxBuildHasher;

use crate::core::alphabet::SPACE_SENTINEL;
use crate::core::corpus::normalize_whitespace;
use crate::core::error::{Error, Result};
use crate::core::model::Model;

const DEFAULT_CACHE_SIZE: usize = 4096;

/// Per-sentence framing applied after encoding: `bos`/`eos` wrap the
/// sequence with the configured special ids; `reverse` reverses the token
/// order first, so the framing tokens stay at the outer ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub bos: bool,
    pub eos: bool,
    pub reverse: bool,
}

/// One output unit: a symbol id, plus the raw substring for unknown spans.
#[derive(Debug, Clone, PartialEq)]
struct Unit {
    id: u32,
    literal: Option<String>,
}

impl Unit {
    fn known(id: u32) -> Unit {
        Unit { id, literal: None }
    }
}

/// Reentrant encoder over a shared, immutable [`Model`].
pub struct Encoder {
    model: Arc<Model>,
    pool: rayon::ThreadPool,
    cache: Mutex<LruCache<Vec<u32>, Vec<u32>, FxBuildHasher>>,
    n_threads: usize,
    cache_size: usize,
}

impl Encoder {
    /// `n_threads == 0` uses all available cores. The count is a pure
    /// performance knob and never changes output.
    pub fn new(model: Arc<Model>, n_threads: usize) -> Result<Encoder> {
        Encoder::with_cache_size(model, n_threads, DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(
        model: Arc<Model>,
        n_threads: usize,
        cache_size: usize,
    ) -> Result<Encoder> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()?;
        let cache = Mutex::new(LruCache::with_hasher(
            NonZeroUsize::new(cache_size.max(1)).expect("cache size clamped to at least 1"),
            FxBuildHasher::default(),
        ));
        Ok(Encoder {
            model,
            pool,
            cache,
            n_threads,
            cache_size,
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Encodes a batch to token ids, preserving batch order.
    pub fn encode_as_ids(&self, texts: &[&str]) -> Vec<Vec<u32>> {
        self.encode_with_options(texts, &EncodeOptions::default())
    }

    pub fn encode_with_options(&self, texts: &[&str], opts: &EncodeOptions) -> Vec<Vec<u32>> {
        let special = *self.model.special_tokens();
        self.pool.install(|| {
            texts
                .par_iter()
                .map(|text| {
                    let units = self.encode_sentence(text);
                    let mut ids: Vec<u32> = units.iter().map(|u| u.id).collect();
                    if opts.reverse {
                        ids.reverse();
                    }
                    if opts.bos {
                        ids.insert(0, special.bos);
                    }
                    if opts.eos {
                        ids.push(special.eos);
                    }
                    ids
                })
                .collect()
        })
    }

    /// Encodes a batch to printable subword pieces. Unknown spans yield
    /// their raw substring verbatim, not a replacement marker.
    pub fn encode_as_subwords(&self, texts: &[&str]) -> Vec<Vec<String>> {
        self.encode_subwords_with_options(texts, &EncodeOptions::default())
    }

    pub fn encode_subwords_with_options(
        &self,
        texts: &[&str],
        opts: &EncodeOptions,
    ) -> Vec<Vec<String>> {
        let special = *self.model.special_tokens();
        self.pool.install(|| {
            texts
                .par_iter()
                .map(|text| {
                    let units = self.encode_sentence(text);
                    let mut pieces: Vec<String> = units
                        .into_iter()
                        .map(|unit| match unit.literal {
                            Some(raw) => raw,
                            None => self
                                .model
                                .id_to_subword(unit.id)
                                .unwrap_or_else(|| {
                                    panic!("no subword for encoded id {}", unit.id)
                                })
                                .to_string(),
                        })
                        .collect();
                    if opts.reverse {
                        pieces.reverse();
                    }
                    if opts.bos {
                        if let Some(bos) = special.placeholder(special.bos) {
                            pieces.insert(0, bos);
                        }
                    }
                    if opts.eos {
                        if let Some(eos) = special.placeholder(special.eos) {
                            pieces.push(eos);
                        }
                    }
                    pieces
                })
                .collect()
        })
    }

    /// Byte-level entry point honoring the UTF-8 codec boundary: malformed
    /// input fails up front with no partial output.
    pub fn encode_bytes_as_ids(&self, texts: &[&[u8]]) -> Result<Vec<Vec<u32>>> {
        let decoded: Vec<&str> = texts
            .iter()
            .map(|bytes| std::str::from_utf8(bytes).map_err(|_| Error::InvalidUtf8))
            .collect::<Result<_>>()?;
        Ok(self.encode_as_ids(&decoded))
    }

    /// Inverse of id-mode encoding: concatenates each id's recipe-derived
    /// text with no separators, maps the sentinel back to a space, and
    /// strips the single leading space the sentinel introduces. Characters
    /// dropped at the coverage stage render as `<UNK>`.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut out = String::new();
        for &id in ids {
            let piece = self.model.id_to_subword(id).ok_or(Error::UnknownId(id))?;
            out.push_str(piece);
        }
        Ok(finish_decode(&out))
    }

    /// Inverse of subword-mode encoding.
    pub fn decode_pieces<S: AsRef<str>>(&self, pieces: &[S]) -> String {
        let mut out = String::new();
        for piece in pieces {
            out.push_str(piece.as_ref());
        }
        finish_decode(&out)
    }

    /// Batch decode, preserving order.
    pub fn decode_batch(&self, batches: &[Vec<u32>]) -> Result<Vec<String>> {
        self.pool
            .install(|| batches.par_iter().map(|ids| self.decode(ids)).collect())
    }

    /// Builds the unit sequence for one sentence: per word, the sentinel
    /// prefix and a two-state scan (known / unknown) emitting one unknown
    /// unit on each transition out of the unknown state, then the model's
    /// rules in learned order.
    fn encode_sentence(&self, text: &str) -> Vec<Unit> {
        let stream = normalize_whitespace(text);
        let space_id = self.model.space_id();
        let unk = self.model.special_tokens().unk;

        let mut out: Vec<Unit> = Vec::new();
        let mut i = 0;
        while i < stream.len() {
            while i < stream.len() && stream[i] == SPACE_SENTINEL {
                i += 1;
            }
            if i == stream.len() {
                break;
            }

            let mut word: Vec<Unit> = Vec::new();
            if let Some(id) = space_id {
                word.push(Unit::known(id));
            }
            let mut unknown = String::new();
            while i < stream.len() && stream[i] != SPACE_SENTINEL {
                match self.model.alphabet().id_of(stream[i]) {
                    Some(id) => {
                        if !unknown.is_empty() {
                            word.push(Unit {
                                id: unk,
                                literal: Some(std::mem::take(&mut unknown)),
                            });
                        }
                        word.push(Unit::known(id));
                    }
                    None => unknown.push(stream[i]),
                }
                i += 1;
            }
            if !unknown.is_empty() {
                word.push(Unit {
                    id: unk,
                    literal: Some(unknown),
                });
            }

            self.merge_word(&mut word);
            out.extend(word);
        }
        out
    }

    /// Applies the rule list to one word, via the cache when the word has
    /// no unknown units (their literals make cached ids insufficient).
    fn merge_word(&self, word: &mut Vec<Unit>) {
        if word.len() < 2 {
            return;
        }
        if word.iter().any(|u| u.literal.is_some()) {
            apply_rules(&self.model, word);
            return;
        }

        // The key is the id sequence itself, not a hash of it: two words
        // must never alias a cache entry, whatever the hash says.
        let ids: Vec<u32> = word.iter().map(|u| u.id).collect();
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(merged) = cache.get(&ids) {
                *word = merged.iter().copied().map(Unit::known).collect();
                return;
            }
        }

        apply_rules(&self.model, word);
        let merged: Vec<u32> = word.iter().map(|u| u.id).collect();
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(ids, merged);
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Clone for Encoder {
    fn clone(&self) -> Self {
        // The pool and cache are rebuilt; caches are never shared between
        // clones. Pool construction only fails on resource exhaustion.
        Encoder::with_cache_size(self.model.clone(), self.n_threads, self.cache_size)
            .expect("thread pool for cloned encoder")
    }
}

/// Every rule in learned order, each with the training scan: left to
/// right, non-overlapping, never re-examining a fresh replacement at the
/// same position. Unknown units carry a special id below the operand
/// range, so they never match and act as merge barriers.
fn apply_rules(model: &Model, word: &mut Vec<Unit>) {
    for rule in model.rules() {
        let len = word.len();
        if len < 2 {
            break;
        }
        let mut read = 0;
        let mut write = 0;
        while read < len {
            if read + 1 < len && word[read].id == rule.x && word[read + 1].id == rule.y {
                word[write] = Unit::known(rule.z);
                read += 2;
            } else {
                if write != read {
                    word.swap(write, read);
                }
                read += 1;
            }
            write += 1;
        }
        word.truncate(write);
    }
}

fn finish_decode(joined: &str) -> String {
    let replaced = joined.replace(SPACE_SENTINEL, " ");
    match replaced.strip_prefix(' ') {
        Some(stripped) => stripped.to_string(),
        None => replaced,
    }
}
