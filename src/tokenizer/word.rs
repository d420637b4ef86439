// src/tokenizer/word.rs

use crate::tokenizer::vocab::{Pair, Symbol};

/// Replaces every non-overlapping occurrence of `pair`, scanning left to
/// right, with `new`. `x x x` merged on `(x, x)` gives `new x`.
pub fn merge_symbols<T: Copy + PartialEq>(symbols: &[T], pair: (T, T), new: T) -> Vec<T> {
    let mut out = Vec::with_capacity(symbols.len());
    let mut i = 0;
    while i < symbols.len() {
        if i + 1 < symbols.len() && symbols[i] == pair.0 && symbols[i + 1] == pair.1 {
            out.push(new);
            i += 2;
        } else {
            out.push(symbols[i]);
            i += 1;
        }
    }
    out
}

/// The symbol sequence of one pre-token chunk.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Word {
    symbols: Vec<Symbol>,
}

impl Word {
    pub fn new() -> Self {
        Self::default()
    }

    /// A word made of one base symbol per byte.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            symbols: bytes.iter().map(|&b| b as Symbol).collect(),
        }
    }

    pub fn add(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
    }

    pub fn get_symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn into_symbols(self) -> Vec<Symbol> {
        self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Merges `(a, b)` into `new_id` and returns the pair-count changes this
    /// caused within the word: `-1` for every adjacency that disappeared and
    /// `+1` for every one that appeared.
    pub fn merge(&mut self, a: Symbol, b: Symbol, new_id: Symbol) -> Vec<(Pair, i32)> {
        let mut changes = Vec::new();
        let mut new_symbols = Vec::with_capacity(self.symbols.len());
        let mut i = 0;

        while i < self.symbols.len() {
            if i + 1 < self.symbols.len() && self.symbols[i] == a && self.symbols[i + 1] == b {
                changes.push(((a, b), -1));

                if let Some(&prev) = new_symbols.last() {
                    changes.push(((prev, a), -1));
                    changes.push(((prev, new_id), 1));
                }
                if let Some(&next) = self.symbols.get(i + 2) {
                    changes.push(((b, next), -1));
                    changes.push(((new_id, next), 1));
                }

                new_symbols.push(new_id);
                i += 2;
            } else {
                new_symbols.push(self.symbols[i]);
                i += 1;
            }
        }
        self.symbols = new_symbols;

        changes
    }
}
