//! Sentence Chunker
//!
//! Splits long text into pieces that fit the completion service's input
//! budget. Splits only on sentence boundaries (". "), so a sentence wider
//! than the budget ends up alone in an oversized chunk.

use crate::tokenizer::TokenCounter;

const SENTENCE_BOUNDARY: &str = ". ";

/// Lazy iterator over the chunks of a text
///
/// Chunks are contiguous slices of the input; concatenating them yields the
/// input exactly. Cloning the iterator restarts from the same position.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    max_tokens: usize,
    counter: TokenCounter,
}

impl<'a> Chunks<'a> {
    pub fn new(text: &'a str, max_tokens: usize, counter: TokenCounter) -> Self {
        Self {
            rest: text,
            max_tokens,
            counter,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let mut end = 0;
        let mut tokens = 0;

        for sentence in self.rest.split_inclusive(SENTENCE_BOUNDARY) {
            let sentence_tokens = self.counter.count(sentence);
            if end > 0 && tokens + sentence_tokens > self.max_tokens {
                break;
            }
            end += sentence.len();
            tokens += sentence_tokens;
        }

        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Split `text` into chunks of at most `max_tokens` (estimated) each
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    Chunks::new(text, max_tokens, TokenCounter::new())
        .map(str::to_string)
        .collect()
}
