use crate::tokenizer::TokenCoder;

/// Splits text into order-preserving blocks of at most `max_tokens` tokens.
///
/// The full text is encoded once and sliced into contiguous token windows;
/// each window is decoded back to text independently. Decoding a window and
/// re-encoding it can, in rare cases, yield slightly more tokens than the
/// window held (byte sequences merge differently at window edges). That
/// expansion is a known limitation and is not corrected here.
#[derive(Debug, Clone)]
pub struct Chunker {
    coder: TokenCoder,
}

impl Chunker {
    pub fn new(coder: TokenCoder) -> Self {
        Self { coder }
    }

    /// Lazily yields the text blocks of `text`. Empty input yields nothing.
    pub fn split(&self, text: &str, max_tokens: usize) -> impl Iterator<Item = String> + '_ {
        let tokens = self.coder.encode(text);
        let mut start = 0usize;

        std::iter::from_fn(move || {
            if max_tokens == 0 {
                return None;
            }
            while start < tokens.len() {
                let end = usize::min(start + max_tokens, tokens.len());

                // A window boundary can land inside a multi-byte character.
                // Back the cut off until the window decodes; the shed tokens
                // open the next window.
                let mut cut = end;
                while cut > start {
                    if let Ok(block) = self.coder.decode(&tokens[start..cut]) {
                        start = cut;
                        return Some(block);
                    }
                    cut -= 1;
                }

                // A lone token that never decodes; drop it rather than loop.
                tracing::debug!("Skipping undecodable token at position {}", start);
                start += 1;
            }
            None
        })
    }
}
