//! Token Counter - chunk sizing estimate
//!
//! Deterministic approximation of how many tokens a text costs the
//! completion service. Only used to size chunks, never for billing.

/// Character-ratio token estimator
///
/// No vocabulary file; English prose averages a little under four
/// characters per token on Claude's tokenizer.
#[derive(Debug, Clone, Copy)]
pub struct TokenCounter {
    chars_per_token: f32,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        Self {
            chars_per_token: 3.8,
        }
    }

    /// Estimated tokens in `text`; same input, same count
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        let chars = text.chars().count() as f32;
        let estimate = (chars / self.chars_per_token).ceil() * Self::density(text);
        estimate.ceil() as usize
    }

    /// Correction for text that tokenizes denser or sparser than prose
    fn density(text: &str) -> f32 {
        let len = text.len().max(1) as f32;
        let mut factor = 1.0f32;

        // Rendered search hits: quotes, braces and URLs split finely
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            factor *= 1.2;
        }
        if text.contains("://") {
            factor *= 1.1;
        }

        let digits = text.bytes().filter(u8::is_ascii_digit).count() as f32;
        if digits / len > 0.3 {
            factor *= 0.9;
        }

        factor
    }

    /// Format token count for log lines
    pub fn format_tokens(tokens: usize) -> String {
        if tokens >= 1_000_000 {
            format!("{:.1}M", tokens as f64 / 1_000_000.0)
        } else if tokens >= 1_000 {
            format!("{:.1}K", tokens as f64 / 1_000.0)
        } else {
            tokens.to_string()
        }
    }
}
