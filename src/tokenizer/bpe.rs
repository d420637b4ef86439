// src/tokenizer/bpe.rs

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tokenizer::byte_encoder::{text_of, text_of_lossy};
use crate::tokenizer::merges::MergeRules;
use crate::tokenizer::pre_tokenizer::CategorySplitter;
use crate::tokenizer::vocab::{BASE_VOCAB_SIZE, Symbol, Vocabulary};
use crate::tokenizer::word::merge_symbols;
use crate::tokenizer::{Error, Model, Result, Token};

/// Applies `merges` to one chunk's symbols, reproducing training order.
///
/// Each step merges every occurrence of the lowest-ranked pair present.
/// A merged pair can never re-form (the symbols of rule `k` all predate
/// the symbols any later rule produces), so this equals running every
/// rule in order over the chunk.
pub fn apply_merges(mut symbols: Vec<Symbol>, merges: &MergeRules) -> Vec<Symbol> {
    loop {
        let best = symbols
            .windows(2)
            .filter_map(|w| merges.rank(&(w[0], w[1])))
            .min();
        let Some(rank) = best else {
            return symbols;
        };
        let rule = merges.as_slice()[rank];
        symbols = merge_symbols(&symbols, rule.pair, rule.symbol);
    }
}

/// Encodes `text` with a bare rule set, without building a [`BPE`].
pub fn encode_with_rules(text: &str, merges: &MergeRules) -> Vec<Symbol> {
    let mut ret = Vec::with_capacity(text.len());
    for split in CategorySplitter.splits(text) {
        let symbols = split.as_bytes().iter().map(|&b| b as Symbol).collect();
        ret.extend(apply_merges(symbols, merges));
    }
    ret
}

/// Decodes `symbols` with a bare vocabulary.
pub fn decode_with_vocab(symbols: &[Symbol], vocab: &Vocabulary) -> Result<String> {
    text_of(&vocab.expand(symbols)?)
}

/// On-disk form: merges as an ordered list of `(a, b, produced)` triples.
#[derive(Serialize, Deserialize)]
struct Artifact {
    vocab: Vec<Vec<u8>>,
    merges: Vec<(Symbol, Symbol, Symbol)>,
}

/// A trained tokenizer: vocabulary plus ordered merge rules.
///
/// Immutable once built; share it across threads freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BPE {
    vocab: Vocabulary,
    merges: MergeRules,
}

impl Default for BPE {
    fn default() -> Self {
        Self {
            vocab: Vocabulary::new(),
            merges: MergeRules::new(),
        }
    }
}

impl BPE {
    /// Pairs a vocabulary with its merge rules, checking that entry
    /// `256 + k` is exactly what rule `k` produces.
    pub fn new(vocab: Vocabulary, merges: MergeRules) -> Result<Self> {
        if vocab.len() != BASE_VOCAB_SIZE + merges.len() {
            return Err(Error::InvalidArtifact(format!(
                "vocabulary has {} entries but {} merges imply {}",
                vocab.len(),
                merges.len(),
                BASE_VOCAB_SIZE + merges.len()
            )));
        }
        for rule in &merges {
            if vocab.children(rule.symbol) != Some(rule.pair) {
                return Err(Error::InvalidArtifact(format!(
                    "vocabulary entry {} is not built from ({}, {})",
                    rule.symbol, rule.pair.0, rule.pair.1
                )));
            }
        }
        Ok(Self { vocab, merges })
    }

    /// Rebuilds the vocabulary from merge rules alone.
    pub fn from_merges(merges: MergeRules) -> Result<Self> {
        let mut vocab = Vocabulary::new();
        for rule in &merges {
            vocab
                .push_merge(rule.pair.0, rule.pair.1)
                .map_err(|e| Error::InvalidArtifact(format!("merge {}: {e}", rule.symbol)))?;
        }
        Self::new(vocab, merges)
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn merges(&self) -> &MergeRules {
        &self.merges
    }

    pub fn encode(&self, text: &str) -> Vec<Symbol> {
        encode_with_rules(text, &self.merges)
    }

    /// Encodes several texts on the rayon pool; output order follows input.
    pub fn encode_batch<S>(&self, texts: &[S]) -> Vec<Vec<Symbol>>
    where
        S: AsRef<str> + Sync,
    {
        texts.par_iter().map(|t| self.encode(t.as_ref())).collect()
    }

    pub fn decode_bytes(&self, symbols: &[Symbol]) -> Result<Vec<u8>> {
        self.vocab.expand(symbols)
    }

    pub fn decode(&self, symbols: &[Symbol]) -> Result<String> {
        decode_with_vocab(symbols, &self.vocab)
    }

    /// Unknown symbols still fail; malformed UTF-8 becomes U+FFFD.
    pub fn decode_lossy(&self, symbols: &[Symbol]) -> Result<String> {
        Ok(text_of_lossy(&self.decode_bytes(symbols)?))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.artifact())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_artifact(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.artifact())?;
        writer.flush()?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_artifact(serde_json::from_reader(reader)?)
    }

    fn artifact(&self) -> Artifact {
        Artifact {
            vocab: self.vocab.iter().map(|(_, bytes)| bytes.to_vec()).collect(),
            merges: self
                .merges
                .iter()
                .map(|r| (r.pair.0, r.pair.1, r.symbol))
                .collect(),
        }
    }

    fn from_artifact(artifact: Artifact) -> Result<Self> {
        let mut merges = MergeRules::new();
        for (k, &(a, b, c)) in artifact.merges.iter().enumerate() {
            let expected = (BASE_VOCAB_SIZE + k) as Symbol;
            if c != expected {
                return Err(Error::InvalidArtifact(format!(
                    "merge #{k} produces {c}, expected {expected}"
                )));
            }
            merges.push((a, b))?;
        }
        let bpe = Self::from_merges(merges)?;

        if artifact.vocab.len() != bpe.vocab.len() {
            return Err(Error::InvalidArtifact(format!(
                "stored vocabulary has {} entries, merges rebuild {}",
                artifact.vocab.len(),
                bpe.vocab.len()
            )));
        }
        for ((id, rebuilt), stored) in bpe.vocab.iter().zip(&artifact.vocab) {
            if rebuilt != stored.as_slice() {
                return Err(Error::InvalidArtifact(format!(
                    "stored bytes of symbol {id} do not match its merge"
                )));
            }
        }
        Ok(bpe)
    }
}

impl Model for BPE {
    /// Symbols with the byte span each covers in `text`. A span may cut
    /// through a multi-byte character when merges did not join its bytes.
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for split in CategorySplitter.splits(text) {
            let symbols = split.as_bytes().iter().map(|&b| b as Symbol).collect();
            let mut start = split.offsets.0;
            for id in apply_merges(symbols, &self.merges) {
                // Every id here came from the vocabulary.
                let value = self.vocab.get(id).unwrap_or_default().to_vec();
                let end = start + value.len();
                tokens.push(Token::new(id, value, (start, end)));
                start = end;
            }
        }
        tokens
    }

    fn decode_bytes(&self, tokens: &[Symbol]) -> Result<Vec<u8>> {
        BPE::decode_bytes(self, tokens)
    }

    fn id_to_token(&self, id: Symbol) -> Option<Vec<u8>> {
        self.vocab.get(id).map(<[u8]>::to_vec)
    }

    fn token_to_id(&self, token: &[u8]) -> Option<Symbol> {
        self.vocab.token_to_id(token)
    }

    fn get_vocab_size(&self) -> usize {
        self.vocab.len()
    }
}
