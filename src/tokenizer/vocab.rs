// src/tokenizer/vocab.rs

use rustc_hash::FxHashMap as HashMap;

use crate::tokenizer::{Error, Result};

/// Identifier of a vocabulary entry. `0..256` are raw bytes, the rest are merges.
pub type Symbol = u32;

/// An ordered pair of adjacent symbols.
pub type Pair = (Symbol, Symbol);

pub const BASE_VOCAB_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Byte(u8),
    Merge(Symbol, Symbol),
}

/// Append-only symbol table.
///
/// Entries form a DAG whose leaves are the 256 base bytes. Children always
/// have smaller ids than their parent, so each entry's flattened byte
/// expansion is computed once, when it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    nodes: Vec<Node>,
    expansions: Vec<Vec<u8>>,
    bytes_to_id: HashMap<Vec<u8>, Symbol>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocabulary {
    /// The base vocabulary: one entry per byte value.
    pub fn new() -> Self {
        let mut vocab = Self {
            nodes: Vec::with_capacity(BASE_VOCAB_SIZE),
            expansions: Vec::with_capacity(BASE_VOCAB_SIZE),
            bytes_to_id: HashMap::default(),
        };
        for b in 0..=255u8 {
            vocab.nodes.push(Node::Byte(b));
            vocab.expansions.push(vec![b]);
            vocab.bytes_to_id.insert(vec![b], b as Symbol);
        }
        vocab
    }

    /// Appends the symbol expanding to `a` followed by `b` and returns its id.
    pub fn push_merge(&mut self, a: Symbol, b: Symbol) -> Result<Symbol> {
        let (left, right) = match (self.get(a), self.get(b)) {
            (Some(left), Some(right)) => (left, right),
            _ => {
                let symbol = if self.get(a).is_none() { a } else { b };
                return Err(Error::UnknownSymbol {
                    symbol,
                    vocab_size: self.len(),
                });
            }
        };
        let mut bytes = Vec::with_capacity(left.len() + right.len());
        bytes.extend_from_slice(left);
        bytes.extend_from_slice(right);

        let id = self.nodes.len() as Symbol;
        self.nodes.push(Node::Merge(a, b));
        // Distinct merges can spell the same bytes; the first id keeps the reverse entry.
        self.bytes_to_id.entry(bytes.clone()).or_insert(id);
        self.expansions.push(bytes);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flattened bytes of `symbol`, or `None` when out of range.
    pub fn get(&self, symbol: Symbol) -> Option<&[u8]> {
        self.expansions.get(symbol as usize).map(Vec::as_slice)
    }

    /// The two symbols a merged entry was built from; `None` for base bytes.
    pub fn children(&self, symbol: Symbol) -> Option<Pair> {
        match self.nodes.get(symbol as usize)? {
            Node::Byte(_) => None,
            Node::Merge(a, b) => Some((*a, *b)),
        }
    }

    pub fn token_to_id(&self, bytes: &[u8]) -> Option<Symbol> {
        self.bytes_to_id.get(bytes).copied()
    }

    /// All entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &[u8])> + '_ {
        self.expansions
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id as Symbol, bytes.as_slice()))
    }

    /// Concatenated expansion of `symbols`.
    pub fn expand(&self, symbols: &[Symbol]) -> Result<Vec<u8>> {
        let mut ret = Vec::with_capacity(symbols.len() * 2);
        for &symbol in symbols {
            let bytes = self.get(symbol).ok_or(Error::UnknownSymbol {
                symbol,
                vocab_size: self.len(),
            })?;
            ret.extend_from_slice(bytes);
        }
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_entries_are_single_bytes() {
        let vocab = Vocabulary::new();
        assert_eq!(vocab.len(), BASE_VOCAB_SIZE);
        for (id, bytes) in vocab.iter() {
            assert_eq!(bytes, &[id as u8]);
            assert_eq!(vocab.children(id), None);
        }
    }

    #[test]
    fn merged_entries_concatenate_children() {
        let mut vocab = Vocabulary::new();
        let ab = vocab.push_merge(b'a' as Symbol, b'b' as Symbol).unwrap();
        let abab = vocab.push_merge(ab, ab).unwrap();
        assert_eq!(ab, 256);
        assert_eq!(abab, 257);
        assert_eq!(vocab.get(abab), Some(&b"abab"[..]));
        assert_eq!(vocab.children(abab), Some((ab, ab)));
        assert_eq!(vocab.token_to_id(b"ab"), Some(ab));
    }

    #[test]
    fn push_merge_rejects_unknown_children() {
        let mut vocab = Vocabulary::new();
        let err = vocab.push_merge(1, 300).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownSymbol {
                symbol: 300,
                vocab_size: 256
            }
        ));
        assert_eq!(vocab.len(), 256);
    }

    #[test]
    fn expand_reports_out_of_range_ids() {
        let vocab = Vocabulary::new();
        assert_eq!(vocab.expand(&[104, 105]).unwrap(), b"hi");
        assert!(matches!(
            vocab.expand(&[104, 256]),
            Err(Error::UnknownSymbol { symbol: 256, .. })
        ));
    }
}
