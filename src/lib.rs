//! Byte-level BPE tokenizer.
//!
//! Learns merge rules from a corpus ([`BpeTrainer`]), then encodes text to
//! symbol ids and decodes them back ([`BPE`]). Text is first cut along
//! Unicode category boundaries ([`CategorySplitter`]) and merges never
//! cross those boundaries.
//!
//! ```
//! use bpe_tokenizer::BpeTrainer;
//!
//! let mut trainer = BpeTrainer::builder().max_merges(2).build()?;
//! let output = trainer.train_from_text("aaaa")?;
//! let bpe = output.model;
//! assert_eq!(bpe.encode("aaaa"), vec![257]);
//! assert_eq!(bpe.decode(&[257])?, "aaaa");
//! # Ok::<(), bpe_tokenizer::Error>(())
//! ```

pub mod tokenizer;

pub use tokenizer::{
    BPE, BpeTrainer, BpeTrainerBuilder, CategorySplitter, Error, MergeRule, MergeRules, Model,
    Pair, Result, StopReason, Symbol, Token, Trainer, TrainerConfig, TrainerOutput,
    TrainingReport, Vocabulary,
};
