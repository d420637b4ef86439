// src/tokenizer/merges.rs

use rustc_hash::FxHashMap as HashMap;
use serde::{Deserialize, Serialize};

use crate::tokenizer::vocab::{BASE_VOCAB_SIZE, Pair, Symbol};
use crate::tokenizer::{Error, Result};

/// "Replace every adjacent `pair` with `symbol`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergeRule {
    pub pair: Pair,
    pub symbol: Symbol,
}

/// Merge rules in the order they were learned.
///
/// The `Vec` is the source of truth for order; the map only indexes it.
/// Rule `k` always produces symbol `256 + k`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeRules {
    rules: Vec<MergeRule>,
    ranks: HashMap<Pair, usize>,
}

impl MergeRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new rule for `pair` and returns the symbol it produces.
    pub fn push(&mut self, pair: Pair) -> Result<Symbol> {
        if self.ranks.contains_key(&pair) {
            return Err(Error::InvalidArtifact(format!(
                "pair ({}, {}) is already merged",
                pair.0, pair.1
            )));
        }
        let rank = self.rules.len();
        let symbol = (BASE_VOCAB_SIZE + rank) as Symbol;
        self.rules.push(MergeRule { pair, symbol });
        self.ranks.insert(pair, rank);
        Ok(symbol)
    }

    /// Rebuilds learned order from an unordered `pair -> symbol` mapping.
    ///
    /// The produced symbols must be exactly `256..256 + n`.
    pub fn from_unordered<I>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Pair, Symbol)>,
    {
        let mut rules: Vec<MergeRule> = rules
            .into_iter()
            .map(|(pair, symbol)| MergeRule { pair, symbol })
            .collect();
        rules.sort_unstable_by_key(|rule| rule.symbol);

        let mut merges = Self::new();
        for rule in rules {
            let expected = (BASE_VOCAB_SIZE + merges.len()) as Symbol;
            if rule.symbol != expected {
                return Err(Error::InvalidArtifact(format!(
                    "merge producing {} found where {} was expected",
                    rule.symbol, expected
                )));
            }
            merges.push(rule.pair)?;
        }
        Ok(merges)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Symbol produced by merging `pair`, if such a rule exists.
    pub fn get(&self, pair: &Pair) -> Option<Symbol> {
        self.ranks.get(pair).map(|&rank| self.rules[rank].symbol)
    }

    /// Position of the rule for `pair` in learned order.
    pub fn rank(&self, pair: &Pair) -> Option<usize> {
        self.ranks.get(pair).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MergeRule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[MergeRule] {
        &self.rules
    }
}

impl<'a> IntoIterator for &'a MergeRules {
    type Item = &'a MergeRule;
    type IntoIter = std::slice::Iter<'a, MergeRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_follow_rule_order() {
        let mut merges = MergeRules::new();
        assert_eq!(merges.push((97, 97)).unwrap(), 256);
        assert_eq!(merges.push((256, 256)).unwrap(), 257);
        assert_eq!(merges.rank(&(256, 256)), Some(1));
        assert_eq!(merges.get(&(97, 97)), Some(256));
        assert_eq!(merges.get(&(97, 98)), None);
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let mut merges = MergeRules::new();
        merges.push((1, 2)).unwrap();
        assert!(matches!(
            merges.push((1, 2)),
            Err(Error::InvalidArtifact(_))
        ));
        assert_eq!(merges.len(), 1);
    }

    #[test]
    fn order_is_recovered_from_unordered_mapping() {
        let mut unordered = std::collections::HashMap::new();
        unordered.insert((258, 32), 259);
        unordered.insert((104, 101), 256);
        unordered.insert((256, 108), 257);
        unordered.insert((257, 111), 258);

        let merges = MergeRules::from_unordered(unordered).unwrap();
        let pairs: Vec<Pair> = merges.iter().map(|r| r.pair).collect();
        assert_eq!(pairs, vec![(104, 101), (256, 108), (257, 111), (258, 32)]);
    }

    #[test]
    fn unordered_mapping_with_gap_is_rejected() {
        let unordered = vec![((1, 2), 256), ((3, 4), 258)];
        assert!(matches!(
            MergeRules::from_unordered(unordered),
            Err(Error::InvalidArtifact(_))
        ));
    }
}
