// src/tokenizer/bpe_trainer.rs

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use bstr::BStr;
use log::{debug, info, warn};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::{Deserialize, Serialize};

use crate::tokenizer::bpe::BPE;
use crate::tokenizer::byte_encoder::text_of;
use crate::tokenizer::merges::MergeRules;
use crate::tokenizer::parallelism::MaybeParallelRefIterator;
use crate::tokenizer::pre_tokenizer::CategorySplitter;
use crate::tokenizer::progress::{ProgressBar, ProgressStyle};
use crate::tokenizer::vocab::{BASE_VOCAB_SIZE, Pair, Symbol, Vocabulary};
use crate::tokenizer::word::Word;
use crate::tokenizer::{Error, Result, Trainer};

/// Heap entry for a candidate merge. Entries go stale as counts change and
/// are checked against the live count when popped.
#[derive(Debug, PartialEq, Eq)]
struct Merge {
    pair: Pair,
    count: i64,
}

impl PartialOrd for Merge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Merge {
    /// Highest count first; ties go to the lexicographically smallest pair.
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// Why a training run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The merge budget (`max_merges` or `vocab_size`) was reached.
    MaxMerges,
    /// No pair occurs at least `min_frequency` times; fewer merges were learned than requested.
    NoRepeatedPairs,
    /// Nothing was fed; the base vocabulary is returned.
    EmptyCorpus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub requested_merges: usize,
    pub merges_learned: usize,
    pub stop_reason: StopReason,
    /// Corpus bytes divided by symbols after the last merge.
    pub compression_ratio: f64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct TrainerOutput<M> {
    pub model: M,
    /// Final symbols of every corpus chunk, in corpus order.
    pub chunks: Vec<Vec<Symbol>>,
    pub report: TrainingReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    /// Upper bound on the number of merges learned.
    pub max_merges: usize,
    /// Optional bound on the final vocabulary size, base bytes included.
    pub vocab_size: Option<usize>,
    /// Pairs seen fewer times than this are never merged.
    pub min_frequency: u64,
    pub show_progress: bool,
    /// Count pairs on the rayon pool.
    pub parallel: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_merges: 256,
            vocab_size: None,
            min_frequency: 2,
            show_progress: false,
            parallel: true,
        }
    }
}

impl TrainerConfig {
    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_frequency < 2 {
            return Err(Error::Configuration(format!(
                "min_frequency must be at least 2, got {}",
                self.min_frequency
            )));
        }
        if let Some(vocab_size) = self.vocab_size {
            if vocab_size < BASE_VOCAB_SIZE {
                return Err(Error::Configuration(format!(
                    "vocab_size must be at least {BASE_VOCAB_SIZE}, got {vocab_size}"
                )));
            }
        }
        Ok(())
    }

    /// Number of merges allowed by the tighter of the two bounds.
    pub fn merge_budget(&self) -> usize {
        match self.vocab_size {
            Some(vocab_size) => self
                .max_merges
                .min(vocab_size.saturating_sub(BASE_VOCAB_SIZE)),
            None => self.max_merges,
        }
    }
}

#[derive(Debug, Default)]
pub struct BpeTrainerBuilder {
    config: TrainerConfig,
}

impl BpeTrainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: TrainerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn max_merges(mut self, max_merges: usize) -> Self {
        self.config.max_merges = max_merges;
        self
    }

    #[must_use]
    pub fn vocab_size(mut self, size: usize) -> Self {
        self.config.vocab_size = Some(size);
        self
    }

    #[must_use]
    pub fn min_frequency(mut self, frequency: u64) -> Self {
        self.config.min_frequency = frequency;
        self
    }

    #[must_use]
    pub fn show_progress(mut self, show: bool) -> Self {
        self.config.show_progress = show;
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    pub fn build(self) -> Result<BpeTrainer> {
        self.config.validate()?;
        Ok(BpeTrainer {
            config: self.config,
            word_ids: HashMap::default(),
            words: Vec::new(),
            counts: Vec::new(),
            chunk_order: Vec::new(),
        })
    }
}

/// Learns merge rules from fed text.
///
/// Identical chunks are stored once with an occurrence count; pair counts
/// are weighted by it, which gives the same result as counting every chunk
/// separately.
#[derive(Debug, Clone)]
pub struct BpeTrainer {
    config: TrainerConfig,
    word_ids: HashMap<Vec<u8>, usize>,
    /// Unique chunks, in first-seen order.
    words: Vec<Vec<u8>>,
    counts: Vec<u64>,
    /// Index into `words` for every chunk of the corpus.
    chunk_order: Vec<usize>,
}

impl Default for BpeTrainer {
    fn default() -> Self {
        Self {
            config: TrainerConfig::default(),
            word_ids: HashMap::default(),
            words: Vec::new(),
            counts: Vec::new(),
            chunk_order: Vec::new(),
        }
    }
}

impl BpeTrainer {
    pub fn builder() -> BpeTrainerBuilder {
        BpeTrainerBuilder::new()
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Number of chunks fed so far.
    pub fn chunk_count(&self) -> usize {
        self.chunk_order.len()
    }

    /// Number of distinct chunks fed so far.
    pub fn unique_chunk_count(&self) -> usize {
        self.words.len()
    }

    /// Feeds raw corpus bytes, which must be valid UTF-8.
    pub fn feed_bytes<I, B>(&mut self, iterator: I) -> Result<()>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        for sequence in iterator {
            let text = text_of(sequence.as_ref())?;
            self.add_sequence(&text);
        }
        Ok(())
    }

    /// Feeds `corpus` and trains on everything fed so far.
    pub fn train_from_text(&mut self, corpus: &str) -> Result<TrainerOutput<BPE>> {
        self.add_sequence(corpus);
        self.do_train()
    }

    fn add_sequence(&mut self, text: &str) {
        for split in CategorySplitter.splits(text) {
            let bytes = split.as_bytes();
            let id = match self.word_ids.get(bytes) {
                Some(&id) => {
                    self.counts[id] += 1;
                    id
                }
                None => {
                    let id = self.words.len();
                    self.word_ids.insert(bytes.to_vec(), id);
                    self.words.push(bytes.to_vec());
                    self.counts.push(1);
                    id
                }
            };
            self.chunk_order.push(id);
        }
    }

    fn setup_progress(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }
        let p = ProgressBar::new(len as u64);
        match ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {msg:<24!} {wide_bar} {pos:>7}/{len:<7} eta {eta}")
        {
            Ok(style) => p.set_style(style),
            Err(e) => warn!("invalid progress template: {e}"),
        }
        Some(p)
    }

    fn update_progress(&self, p: &Option<ProgressBar>, merges: usize, ratio: f64) {
        if let Some(p) = p {
            p.set_position(merges as u64);
            p.set_message(format!("compression {ratio:.3}x"));
        }
    }

    fn finalize_progress(&self, p: &Option<ProgressBar>, merges: usize) {
        if let Some(p) = p {
            p.set_length(merges as u64);
            p.set_position(merges as u64);
            p.finish();
        }
    }

    /// Weighted counts of every adjacent pair, and the words each pair occurs in.
    fn count_pairs(
        &self,
        words: &[Word],
    ) -> (HashMap<Pair, i64>, HashMap<Pair, HashSet<usize>>) {
        let counts = &self.counts;
        words
            .maybe_par_iter_cond(self.config.parallel)
            .enumerate()
            .map(|(i, word)| {
                let mut pair_counts_local: HashMap<Pair, i64> = HashMap::default();
                let mut where_to_update_local: HashMap<Pair, HashSet<usize>> =
                    HashMap::default();

                for window in word.get_symbols().windows(2) {
                    let cur_pair: Pair = (window[0], window[1]);
                    *pair_counts_local.entry(cur_pair).or_insert(0) += counts[i] as i64;
                    where_to_update_local.entry(cur_pair).or_default().insert(i);
                }

                (pair_counts_local, where_to_update_local)
            })
            .reduce(
                || (HashMap::default(), HashMap::default()),
                |(mut pair_counts_global, mut where_to_update_global), (pc_local, wtu_local)| {
                    for (k, v) in pc_local {
                        *pair_counts_global.entry(k).or_insert(0) += v;
                    }
                    for (k, v) in wtu_local {
                        where_to_update_global.entry(k).or_default().extend(v);
                    }
                    (pair_counts_global, where_to_update_global)
                },
            )
    }

    pub fn do_train(&self) -> Result<TrainerOutput<BPE>> {
        let start = Instant::now();
        let budget = self.config.merge_budget();
        let mut vocab = Vocabulary::new();
        let mut merges = MergeRules::new();

        if self.chunk_order.is_empty() {
            info!("empty corpus, returning the base vocabulary");
            return Ok(TrainerOutput {
                model: BPE::new(vocab, merges)?,
                chunks: Vec::new(),
                report: TrainingReport {
                    requested_merges: budget,
                    merges_learned: 0,
                    stop_reason: StopReason::EmptyCorpus,
                    compression_ratio: 1.0,
                    elapsed: start.elapsed(),
                },
            });
        }

        info!(
            "training on {} chunks ({} unique), up to {} merges",
            self.chunk_order.len(),
            self.words.len(),
            budget
        );

        let mut words: Vec<Word> = self.words.iter().map(|b| Word::from_bytes(b)).collect();
        let total_bytes: u64 = self
            .words
            .iter()
            .zip(&self.counts)
            .map(|(w, &c)| w.len() as u64 * c)
            .sum();
        let mut total_symbols = total_bytes;
        let ratio = |symbols: u64| {
            if symbols == 0 {
                1.0
            } else {
                total_bytes as f64 / symbols as f64
            }
        };

        let progress = self.setup_progress(budget);
        let (mut pair_counts, mut where_to_update) = self.count_pairs(&words);
        let mut queue: BinaryHeap<Merge> = pair_counts
            .iter()
            .map(|(&pair, &count)| Merge { pair, count })
            .collect();

        let min_frequency = self.config.min_frequency as i64;
        let mut stop_reason = StopReason::MaxMerges;

        while merges.len() < budget {
            let Some(top) = queue.pop() else {
                stop_reason = StopReason::NoRepeatedPairs;
                break;
            };
            if pair_counts.get(&top.pair).copied().unwrap_or(0) != top.count {
                continue;
            }
            // A rare pair is still merged when it is the last pair left in the
            // corpus, since that merge finishes collapsing it.
            if top.count < min_frequency && pair_counts.len() > 1 {
                stop_reason = StopReason::NoRepeatedPairs;
                break;
            }

            let (a, b) = top.pair;
            let new_id = merges.push(top.pair)?;
            vocab.push_merge(a, b)?;
            debug!(
                "merge #{}: ({a}, {b}) -> {new_id} {:?} seen {} times",
                merges.len(),
                vocab.get(new_id).map(BStr::new),
                top.count
            );

            // The pair can never re-form once merged, so its index entry is done.
            let indices = where_to_update.remove(&top.pair).unwrap_or_default();
            let mut touched: HashSet<Pair> = HashSet::default();
            for i in indices {
                let count = self.counts[i];
                let before = words[i].len();
                let changes = words[i].merge(a, b, new_id);
                total_symbols -= (before - words[i].len()) as u64 * count;

                for (pair, delta) in changes {
                    let entry = pair_counts.entry(pair).or_insert(0);
                    *entry += delta as i64 * count as i64;
                    if *entry <= 0 {
                        pair_counts.remove(&pair);
                    }
                    if delta > 0 {
                        where_to_update.entry(pair).or_default().insert(i);
                    }
                    touched.insert(pair);
                }
            }

            for pair in touched {
                if let Some(&count) = pair_counts.get(&pair) {
                    queue.push(Merge { pair, count });
                }
            }
            self.update_progress(&progress, merges.len(), ratio(total_symbols));
        }
        self.finalize_progress(&progress, merges.len());

        let report = TrainingReport {
            requested_merges: budget,
            merges_learned: merges.len(),
            stop_reason,
            compression_ratio: ratio(total_symbols),
            elapsed: start.elapsed(),
        };
        info!(
            "learned {} of {} merges ({:?}), compression {:.3}x in {:.2?}",
            report.merges_learned,
            report.requested_merges,
            report.stop_reason,
            report.compression_ratio,
            report.elapsed
        );

        let chunks = self
            .chunk_order
            .iter()
            .map(|&i| words[i].get_symbols().to_vec())
            .collect();

        Ok(TrainerOutput {
            model: BPE::new(vocab, merges)?,
            chunks,
            report,
        })
    }
}

impl Trainer for BpeTrainer {
    type Model = BPE;

    fn train(&self) -> Result<TrainerOutput<BPE>> {
        self.do_train()
    }

    fn feed<I, S>(&mut self, iterator: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for sequence in iterator {
            self.add_sequence(sequence.as_ref());
        }
        Ok(())
    }

    fn should_show_progress(&self) -> bool {
        self.config.show_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trainer(max_merges: usize) -> BpeTrainer {
        BpeTrainer::builder()
            .max_merges(max_merges)
            .build()
            .unwrap()
    }

    #[test]
    fn heap_prefers_count_then_smallest_pair() {
        let mut heap = BinaryHeap::new();
        heap.push(Merge { pair: (5, 1), count: 3 });
        heap.push(Merge { pair: (2, 9), count: 3 });
        heap.push(Merge { pair: (1, 1), count: 2 });
        heap.push(Merge { pair: (2, 3), count: 3 });
        assert_eq!(heap.pop().unwrap().pair, (2, 3));
        assert_eq!(heap.pop().unwrap().pair, (2, 9));
        assert_eq!(heap.pop().unwrap().pair, (5, 1));
        assert_eq!(heap.pop().unwrap().pair, (1, 1));
    }

    #[test]
    fn aaaa_learns_two_nested_merges() {
        let output = trainer(2).train_from_text("aaaa").unwrap();
        let merges: Vec<_> = output.model.merges().iter().copied().collect();
        assert_eq!(merges[0].pair, (97, 97));
        assert_eq!(merges[0].symbol, 256);
        assert_eq!(merges[1].pair, (256, 256));
        assert_eq!(merges[1].symbol, 257);
        assert_eq!(output.chunks, vec![vec![257]]);
        assert_eq!(output.report.stop_reason, StopReason::MaxMerges);
        assert_eq!(output.report.compression_ratio, 4.0);
    }

    #[test]
    fn stops_when_no_pair_repeats() {
        let output = trainer(10).train_from_text("abcd").unwrap();
        assert_eq!(output.report.merges_learned, 0);
        assert_eq!(output.report.stop_reason, StopReason::NoRepeatedPairs);
        assert_eq!(output.model.vocab().len(), BASE_VOCAB_SIZE);
    }

    #[test]
    fn last_remaining_pair_is_merged_even_if_rare() {
        let output = trainer(10).train_from_text("ab").unwrap();
        assert_eq!(output.report.merges_learned, 1);
        assert_eq!(output.report.stop_reason, StopReason::NoRepeatedPairs);
        assert_eq!(output.chunks, vec![vec![256]]);
    }

    #[test]
    fn empty_corpus_is_not_an_error() {
        let output = trainer(10).train_from_text("").unwrap();
        assert_eq!(output.report.stop_reason, StopReason::EmptyCorpus);
        assert!(output.chunks.is_empty());
        assert!(output.model.merges().is_empty());
    }

    #[test]
    fn pair_counts_cross_chunks_but_not_boundaries() {
        // "ab" occurs once in each of three chunks; "b" + " " never forms a pair
        let output = trainer(1).train_from_text("ab ab ab").unwrap();
        let rule = output.model.merges().iter().next().copied().unwrap();
        assert_eq!(rule.pair, (b'a' as Symbol, b'b' as Symbol));
        assert_eq!(
            output.chunks,
            vec![vec![256], vec![32, 256], vec![32, 256]]
        );
    }

    #[test]
    fn incremental_counts_match_a_full_recount() {
        let mut t = trainer(40);
        t.feed(["the cat sat on the mat; the hat that sat there was the cat's"])
            .unwrap();
        let output = t.train().unwrap();

        // Re-derive each merge naively from the initial chunks.
        let mut chunks: Vec<Vec<Symbol>> = CategorySplitter
            .splits("the cat sat on the mat; the hat that sat there was the cat's")
            .iter()
            .map(|s| s.as_bytes().iter().map(|&b| b as Symbol).collect())
            .collect();
        for rule in output.model.merges() {
            let mut counts: HashMap<Pair, i64> = HashMap::default();
            for chunk in &chunks {
                for w in chunk.windows(2) {
                    *counts.entry((w[0], w[1])).or_insert(0) += 1;
                }
            }
            let best = counts
                .iter()
                .max_by(|x, y| x.1.cmp(y.1).then_with(|| y.0.cmp(x.0)))
                .map(|(&p, _)| p)
                .unwrap();
            assert_eq!(best, rule.pair);
            for chunk in chunks.iter_mut() {
                *chunk = crate::tokenizer::word::merge_symbols(chunk, rule.pair, rule.symbol);
            }
        }
        assert_eq!(chunks, output.chunks);
    }

    #[test]
    fn vocab_size_bounds_the_budget() {
        let output = BpeTrainer::builder()
            .max_merges(100)
            .vocab_size(257)
            .build()
            .unwrap()
            .train_from_text("aaaa aaaa")
            .unwrap();
        assert_eq!(output.report.requested_merges, 1);
        assert_eq!(output.model.vocab().len(), 257);
    }

    #[test]
    fn serial_and_parallel_training_agree() {
        let corpus = "lorem ipsum dolor sit amet, consectetur adipiscing elit 1234 1234";
        let serial = BpeTrainer::builder()
            .max_merges(30)
            .parallel(false)
            .build()
            .unwrap()
            .train_from_text(corpus)
            .unwrap();
        let parallel = BpeTrainer::builder()
            .max_merges(30)
            .parallel(true)
            .build()
            .unwrap()
            .train_from_text(corpus)
            .unwrap();
        assert_eq!(serial.model, parallel.model);
        assert_eq!(serial.chunks, parallel.chunks);
    }

    #[test]
    fn feed_bytes_rejects_malformed_corpus() {
        let mut t = trainer(1);
        assert!(matches!(
            t.feed_bytes([&b"ok"[..], &b"\xC3("[..]]),
            Err(Error::InvalidEncoding(_))
        ));
    }

    #[test]
    fn feeding_deduplicates_chunks() {
        let mut t = trainer(1);
        t.feed(["to be or not to be"]).unwrap();
        assert_eq!(t.chunk_count(), 6);
        // "to", " be", " or", " not", " to"
        assert_eq!(t.unique_chunk_count(), 5);
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            BpeTrainer::builder().min_frequency(1).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BpeTrainer::builder().vocab_size(100).build(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            TrainerConfig::from_json(r#"{"max_merges": -3}"#),
            Err(Error::Configuration(_))
        ));
        let config = TrainerConfig::from_json(r#"{"max_merges": 12}"#).unwrap();
        assert_eq!(config.max_merges, 12);
        assert_eq!(config.min_frequency, 2);
        assert!(BpeTrainerBuilder::from_config(config).build().is_ok());
    }
}
