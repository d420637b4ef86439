// src/tokenizer/mod.rs

pub mod bpe;
pub mod bpe_trainer;
pub mod byte_encoder;
pub mod merges;
pub mod parallelism;
pub mod pre_tokenizer;
pub mod progress;
pub mod result;
pub mod vocab;
pub mod word;

pub use bpe::{BPE, apply_merges, decode_with_vocab, encode_with_rules};
pub use bpe_trainer::{
    BpeTrainer, BpeTrainerBuilder, StopReason, TrainerConfig, TrainerOutput, TrainingReport,
};
pub use byte_encoder::{bytes_of, text_of, text_of_lossy};
pub use merges::{MergeRule, MergeRules};
pub use pre_tokenizer::{CategorySplitter, PreTokenizedString, PreTokenizer, Split, split};
pub use result::{Error, Result};
pub use vocab::{BASE_VOCAB_SIZE, Pair, Symbol, Vocabulary};
pub use word::{Word, merge_symbols};

/// A trained tokenizer model.
pub trait Model: Send + Sync {
    /// Splits `text` into tokens carrying their byte spans.
    fn tokenize(&self, text: &str) -> Vec<Token>;

    fn decode_bytes(&self, tokens: &[Symbol]) -> Result<Vec<u8>>;

    fn id_to_token(&self, id: Symbol) -> Option<Vec<u8>>;

    fn token_to_id(&self, token: &[u8]) -> Option<Symbol>;

    fn get_vocab_size(&self) -> usize;
}

/// A single token with its id, bytes, and `(start, end)` byte offsets in the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub id: Symbol,
    pub value: Vec<u8>,
    pub offsets: (usize, usize),
}

impl Token {
    pub fn new(id: Symbol, value: Vec<u8>, offsets: (usize, usize)) -> Self {
        Token { id, value, offsets }
    }
}

/// Something that learns a [`Model`] from fed text.
pub trait Trainer {
    type Model: Model;

    /// Trains on everything fed so far.
    fn train(&self) -> Result<TrainerOutput<Self::Model>>;

    /// Feeds training sequences. Chunks never span two sequences.
    fn feed<I, S>(&mut self, iterator: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>;

    fn should_show_progress(&self) -> bool;
}
