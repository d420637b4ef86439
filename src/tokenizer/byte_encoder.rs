// src/tokenizer/byte_encoder.rs

use bstr::ByteSlice;

use crate::tokenizer::Result;

/// Returns the canonical UTF-8 bytes of `text`.
pub fn bytes_of(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Inverse of [`bytes_of`]. Fails with `InvalidEncoding` on malformed UTF-8.
pub fn text_of(bytes: &[u8]) -> Result<String> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

/// Like [`text_of`], but malformed sequences become U+FFFD.
pub fn text_of_lossy(bytes: &[u8]) -> String {
    bytes.to_str_lossy().into_owned()
}
