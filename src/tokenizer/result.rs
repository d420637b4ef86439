// src/tokenizer/result.rs

use crate::tokenizer::vocab::Symbol;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bytes that are not well-formed UTF-8, on decode or when reading corpus text.
    #[error("invalid UTF-8 encoding: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),

    #[error("unknown symbol {symbol} (vocabulary size {vocab_size})")]
    UnknownSymbol { symbol: Symbol, vocab_size: usize },

    #[error("configuration error: {0}")]
    Configuration(String),

    /// A loaded vocabulary/merge artifact violates one of its invariants.
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
