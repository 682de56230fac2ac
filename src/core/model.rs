//! Immutable model state produced by training.
//!
//! A [`Model`] snapshots the alphabet mapping, the ordered rule list, and
//! the special-token layout. Everything else — the recipe table mapping
//! every symbol id to its base character ids, and the rendered subword
//! string per id — is derived eagerly at construction and never mutated,
//! so any number of encoders can share one model concurrently.
//!
//! # Persistence
//!
//! Models serialize to a small versioned text format:
//!
//! ```text
//! SUBTOK_MODEL_V1
//! special <pad> <unk> <bos> <eos> <n_special>
//! chars <n>
//! <codepoint> <id>        (one per kept character, in id order)
//! rules <n>
//! <x> <y> <z>             (one per learned rule, in learned order)
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::core::alphabet::{Alphabet, SPACE_SENTINEL};
use crate::core::config::SpecialTokens;
use crate::core::error::{Error, Result};
use crate::core::trainer::Rule;

const MAGIC: &str = "SUBTOK_MODEL_V1";

/// Immutable output of training: alphabet, rules, special tokens, and the
/// derived recipe/subword tables.
#[derive(Debug, Clone)]
pub struct Model {
    alphabet: Alphabet,
    rules: Vec<Rule>,
    special: SpecialTokens,
    /// id -> flattened sequence of base alphabet ids.
    recipes: FxHashMap<u32, Vec<u32>>,
    /// id -> rendered text (specials render as placeholders).
    subwords: FxHashMap<u32, String>,
    subword2id: FxHashMap<String, u32>,
}

impl Model {
    pub(crate) fn new(alphabet: Alphabet, rules: Vec<Rule>, special: SpecialTokens) -> Model {
        let mut recipes: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        let mut subwords: FxHashMap<u32, String> = FxHashMap::default();

        for (ch, id) in alphabet.chars() {
            recipes.insert(id, vec![id]);
            subwords.insert(id, ch.to_string());
        }
        // Product ids strictly increase, so operand recipes always exist
        // by the time a rule is processed; the dependency graph is acyclic
        // by construction.
        for rule in &rules {
            let mut recipe = recipes
                .get(&rule.x)
                .unwrap_or_else(|| panic!("no recipe for rule operand {}", rule.x))
                .clone();
            recipe.extend_from_slice(
                recipes
                    .get(&rule.y)
                    .unwrap_or_else(|| panic!("no recipe for rule operand {}", rule.y)),
            );
            let text = format!(
                "{}{}",
                subwords[&rule.x].as_str(),
                subwords[&rule.y].as_str()
            );
            recipes.insert(rule.z, recipe);
            subwords.insert(rule.z, text);
        }
        for id in 0..special.n_special {
            if let Some(placeholder) = special.placeholder(id) {
                subwords.insert(id, placeholder);
            }
        }

        // On duplicate rendered text the lowest id wins.
        let mut subword2id: FxHashMap<String, u32> = FxHashMap::default();
        let mut ids: Vec<u32> = subwords.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            subword2id.entry(subwords[&id].clone()).or_insert(id);
        }

        Model {
            alphabet,
            rules,
            special,
            recipes,
            subwords,
            subword2id,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    /// Total vocabulary size: special tokens + alphabet + rules.
    pub fn vocab_size(&self) -> u32 {
        self.special.n_special + self.alphabet.len() as u32 + self.rules.len() as u32
    }

    /// Symbol id of the sentinel space, absent only in the degenerate
    /// empty-alphabet model.
    pub(crate) fn space_id(&self) -> Option<u32> {
        self.alphabet.id_of(SPACE_SENTINEL)
    }

    /// Base character ids a symbol ultimately decomposes into.
    ///
    /// # Panics
    ///
    /// Panics for ids without a recipe (special tokens or ids outside the
    /// vocabulary): every symbol id ever produced by training has one, so
    /// a miss is an internal-consistency violation, not a user error.
    pub fn recipe(&self, id: u32) -> &[u32] {
        self.recipes
            .get(&id)
            .unwrap_or_else(|| panic!("no recipe for symbol id {}", id))
    }

    /// Rendered text for any vocabulary id, placeholders included.
    pub fn id_to_subword(&self, id: u32) -> Option<&str> {
        self.subwords.get(&id).map(String::as_str)
    }

    pub fn subword_to_id(&self, subword: &str) -> Option<u32> {
        self.subword2id.get(subword).copied()
    }

    /// The full vocabulary in id order.
    pub fn vocab(&self) -> Vec<String> {
        (0..self.vocab_size())
            .map(|id| {
                self.subwords
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| panic!("no subword for vocabulary id {}", id))
            })
            .collect()
    }

    pub fn save_to<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "{}", MAGIC)?;
        writeln!(
            w,
            "special {} {} {} {} {}",
            self.special.pad, self.special.unk, self.special.bos, self.special.eos,
            self.special.n_special
        )?;

        let mut chars: Vec<(char, u32)> = self.alphabet.chars().collect();
        chars.sort_by_key(|&(_, id)| id);
        writeln!(w, "chars {}", chars.len())?;
        for (ch, id) in chars {
            writeln!(w, "{} {}", ch as u32, id)?;
        }

        writeln!(w, "rules {}", self.rules.len())?;
        for rule in &self.rules {
            writeln!(w, "{} {} {}", rule.x, rule.y, rule.z)?;
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save_to(BufWriter::new(File::create(path)?))
    }

    pub fn load_from<R: BufRead>(r: R) -> Result<Model> {
        let mut lines = r.lines();
        let mut next_line = |what: &str| -> Result<String> {
            lines
                .next()
                .ok_or_else(|| Error::ModelFormat(format!("missing {}", what)))?
                .map_err(Error::Io)
        };

        if next_line("magic line")? != MAGIC {
            return Err(Error::ModelFormat("bad magic line".into()));
        }

        let special_line = next_line("special token line")?;
        let fields = parse_fields(&special_line, "special", 5)?;
        let special = SpecialTokens {
            pad: fields[0],
            unk: fields[1],
            bos: fields[2],
            eos: fields[3],
            n_special: fields[4],
        };

        let n_chars = parse_fields(&next_line("chars header")?, "chars", 1)?[0];
        let mut entries = Vec::with_capacity(n_chars as usize);
        for i in 0..n_chars {
            let line = next_line("char entry")?;
            let fields = parse_pair(&line)?;
            let ch = char::from_u32(fields.0)
                .ok_or_else(|| Error::ModelFormat(format!("invalid code point {}", fields.0)))?;
            let expected = special.n_special + i;
            if fields.1 != expected {
                return Err(Error::ModelFormat(format!(
                    "char id {} out of sequence, expected {}",
                    fields.1, expected
                )));
            }
            entries.push((ch, fields.1));
        }
        let alphabet = Alphabet::from_entries(entries);

        let n_rules = parse_fields(&next_line("rules header")?, "rules", 1)?[0];
        let mut rules = Vec::with_capacity(n_rules as usize);
        for i in 0..n_rules {
            let line = next_line("rule entry")?;
            let fields = parse_triple(&line)?;
            let z = special.n_special + n_chars + i;
            let rule = Rule {
                x: fields.0,
                y: fields.1,
                z: fields.2,
            };
            if rule.z != z {
                return Err(Error::ModelFormat(format!(
                    "rule product {} out of sequence, expected {}",
                    rule.z, z
                )));
            }
            // Operands must be ids known when the rule was learned and
            // never special tokens.
            if rule.x < special.n_special || rule.y < special.n_special
                || rule.x >= rule.z || rule.y >= rule.z
            {
                return Err(Error::ModelFormat(format!(
                    "rule ({}, {}) -> {} references an invalid operand",
                    rule.x, rule.y, rule.z
                )));
            }
            rules.push(rule);
        }

        Ok(Model::new(alphabet, rules, special))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
        Model::load_from(BufReader::new(File::open(path)?))
    }
}

fn parse_fields(line: &str, keyword: &str, n: usize) -> Result<Vec<u32>> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some(keyword) {
        return Err(Error::ModelFormat(format!(
            "expected `{}` line, got {:?}",
            keyword, line
        )));
    }
    let fields: Vec<u32> = parts
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| Error::ModelFormat(format!("bad integer {:?}", p)))
        })
        .collect::<Result<_>>()?;
    if fields.len() != n {
        return Err(Error::ModelFormat(format!(
            "`{}` line carries {} fields, expected {}",
            keyword,
            fields.len(),
            n
        )));
    }
    Ok(fields)
}

fn parse_pair(line: &str) -> Result<(u32, u32)> {
    let fields: Vec<u32> = line
        .split_whitespace()
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| Error::ModelFormat(format!("bad integer {:?}", p)))
        })
        .collect::<Result<_>>()?;
    match fields[..] {
        [a, b] => Ok((a, b)),
        _ => Err(Error::ModelFormat(format!("expected two fields: {:?}", line))),
    }
}

fn parse_triple(line: &str) -> Result<(u32, u32, u32)> {
    let fields: Vec<u32> = line
        .split_whitespace()
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| Error::ModelFormat(format!("bad integer {:?}", p)))
        })
        .collect::<Result<_>>()?;
    match fields[..] {
        [a, b, c] => Ok((a, b, c)),
        _ => Err(Error::ModelFormat(format!(
            "expected three fields: {:?}",
            line
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TrainConfig;
    use crate::core::trainer::Trainer;

    fn small_model() -> Model {
        Trainer::new(TrainConfig::new(9))
            .unwrap()
            .train("baba baaab")
            .unwrap()
    }

    #[test]
    fn recipes_flatten_to_base_ids() {
        let model = small_model();
        for rule in model.rules() {
            let mut expected = model.recipe(rule.x).to_vec();
            expected.extend_from_slice(model.recipe(rule.y));
            assert_eq!(model.recipe(rule.z), &expected[..]);
            // Fully flattened: recipes contain only alphabet ids.
            for &id in model.recipe(rule.z) {
                assert!(model.alphabet().char_of(id).is_some());
            }
        }
    }

    #[test]
    #[should_panic(expected = "no recipe")]
    fn missing_recipe_is_a_contract_violation() {
        small_model().recipe(9999);
    }

    #[test]
    fn vocab_lists_every_id() {
        let model = small_model();
        let vocab = model.vocab();
        assert_eq!(vocab.len(), model.vocab_size() as usize);
        assert_eq!(vocab[1], "<UNK>");
        assert_eq!(model.subword_to_id("<UNK>"), Some(1));
        assert_eq!(model.subword_to_id(&vocab[4]), Some(4));
    }

    #[test]
    fn save_load_round_trip() {
        let model = small_model();
        let mut buf = Vec::new();
        model.save_to(&mut buf).unwrap();
        let loaded = Model::load_from(&buf[..]).unwrap();

        assert_eq!(loaded.rules(), model.rules());
        assert_eq!(loaded.special_tokens(), model.special_tokens());
        assert_eq!(loaded.vocab(), model.vocab());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let err = Model::load_from(&b"NOT_A_MODEL\n"[..]).unwrap_err();
        assert!(matches!(err, Error::ModelFormat(_)));
    }

    #[test]
    fn load_rejects_out_of_sequence_rule() {
        let model = small_model();
        let mut buf = Vec::new();
        model.save_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // Corrupt the first rule's product id.
        let corrupted = text.replacen(" 7\n", " 12\n", 1);
        assert_ne!(corrupted, text);
        let err = Model::load_from(corrupted.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ModelFormat(_)));
    }
}
