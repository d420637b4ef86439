// src/tokenizer/pre_tokenizer.rs
//
// Category splitting: text is cut into chunks along Unicode category
// boundaries before any merge is counted or applied, so a learned symbol
// never spans a letter run and a digit run, or a word and its punctuation.

use std::sync::LazyLock;

use regex::Regex;

/// Alternatives are tried left to right at each position:
///   1. one optional whitespace/separator char followed by a letter run
///   2. one optional whitespace/separator char followed by a digit run
///   3. a run of whitespace/separator chars
///   4. any single other char
// The pattern is static, so failing to compile it is a programming error.
pub static RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s\p{Z}]?\p{L}+|[\s\p{Z}]?\p{N}+|[\s\p{Z}]+|(?s:.)").unwrap()
});

/// One pre-token chunk: a slice of the original text and its byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    pub text: &'a str,
    pub offsets: (usize, usize),
}

impl<'a> Split<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.text.as_bytes()
    }
}

pub struct PreTokenizedString<'a> {
    original: &'a str,
    splits: Vec<Split<'a>>,
}

impl<'a> PreTokenizedString<'a> {
    /// Starts with a single split covering the whole input (none if empty).
    pub fn new(text: &'a str) -> Self {
        let splits = if text.is_empty() {
            vec![]
        } else {
            vec![Split {
                text,
                offsets: (0, text.len()),
            }]
        };
        Self {
            original: text,
            splits,
        }
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    pub fn get_splits(&self) -> &[Split<'a>] {
        &self.splits
    }

    pub fn take_splits(self) -> Vec<Split<'a>> {
        self.splits
    }

    /// Re-splits every current split on `pattern`. Text between two matches
    /// is kept as its own split, so no input is ever dropped.
    pub fn split(&mut self, pattern: &Regex) {
        let old_splits = std::mem::take(&mut self.splits);
        let mut new_splits = Vec::with_capacity(old_splits.len() * 2);

        for split in old_splits {
            let base = split.offsets.0;
            let text = split.text;
            let mut last_end = 0;
            for mat in pattern.find_iter(text) {
                let (start, end) = (mat.start(), mat.end());
                if last_end < start {
                    new_splits.push(Split {
                        text: &text[last_end..start],
                        offsets: (base + last_end, base + start),
                    });
                }
                if start < end {
                    new_splits.push(Split {
                        text: &text[start..end],
                        offsets: (base + start, base + end),
                    });
                }
                last_end = end;
            }
            if last_end < text.len() {
                new_splits.push(Split {
                    text: &text[last_end..],
                    offsets: (base + last_end, base + text.len()),
                });
            }
        }
        self.splits = new_splits;
    }
}

pub trait PreTokenizer {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString<'_>);
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CategorySplitter;

impl CategorySplitter {
    pub fn new() -> Self {
        CategorySplitter
    }

    pub fn splits<'a>(&self, text: &'a str) -> Vec<Split<'a>> {
        let mut pretokenized = PreTokenizedString::new(text);
        self.pre_tokenize(&mut pretokenized);
        pretokenized.take_splits()
    }
}

impl PreTokenizer for CategorySplitter {
    fn pre_tokenize(&self, pretokenized: &mut PreTokenizedString<'_>) {
        pretokenized.split(&RE);
    }
}

/// Splits `text` into category-bounded chunks, left to right.
pub fn split(text: &str) -> Vec<&str> {
    CategorySplitter
        .splits(text)
        .into_iter()
        .map(|s| s.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attaches_single_leading_space_to_words() {
        assert_eq!(split("How are you?"), vec!["How", " are", " you", "?"]);
    }

    #[test]
    fn separates_letters_digits_and_symbols() {
        assert_eq!(split("w0rks!"), vec!["w", "0", "rks", "!"]);
        assert_eq!(split("abc 123"), vec!["abc", " 123"]);
    }

    #[test]
    fn whitespace_runs_do_not_melt_into_words() {
        assert_eq!(split("a   the"), vec!["a", "   ", "the"]);
        assert_eq!(split("line\n\nnext"), vec!["line", "\n\n", "next"]);
        assert_eq!(split("end \n"), vec!["end", " \n"]);
    }

    #[test]
    fn punctuation_is_taken_one_char_at_a_time() {
        assert_eq!(split("?!."), vec!["?", "!", "."]);
        assert_eq!(split(" ,x"), vec![" ", ",", "x"]);
    }

    #[test]
    fn empty_and_whitespace_only() {
        assert!(split("").is_empty());
        assert_eq!(split(" \t "), vec![" \t "]);
    }

    #[test]
    fn offsets_cover_input() {
        let text = "naïve café, 42 🌍🌍";
        let splits = CategorySplitter.splits(text);
        let mut pos = 0;
        for s in &splits {
            assert_eq!(s.offsets.0, pos);
            assert_eq!(&text[s.offsets.0..s.offsets.1], s.text);
            pos = s.offsets.1;
        }
        assert_eq!(pos, text.len());
        assert_eq!(splits.iter().map(|s| s.text).collect::<String>(), text);
    }

    #[test]
    fn split_keeps_gaps_between_matches() {
        let digits = Regex::new(r"\d+").unwrap();
        let mut pretokenized = PreTokenizedString::new("ab12cd");
        pretokenized.split(&digits);
        let texts: Vec<_> = pretokenized.get_splits().iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["ab", "12", "cd"]);
        assert_eq!(pretokenized.original(), "ab12cd");
    }
}
