use std::sync::Arc;

use tiktoken_rs::{r50k_base, CoreBPE, Rank};

use crate::core::errors::ApiError;

/// Byte-pair tokenizer used for all length accounting and chunk splitting.
///
/// Counts are deterministic within a process; they are not required to match
/// any external system's accounting, only to be consistent everywhere a token
/// budget is enforced.
#[derive(Clone)]
pub struct TokenCoder {
    bpe: Arc<CoreBPE>,
}

impl TokenCoder {
    pub fn new() -> Result<Self, ApiError> {
        let bpe = r50k_base().map_err(ApiError::internal)?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    pub fn encode(&self, text: &str) -> Vec<Rank> {
        self.bpe.encode_ordinary(text)
    }

    pub fn decode(&self, tokens: &[Rank]) -> Result<String, ApiError> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(ApiError::internal)
    }
}

impl std::fmt::Debug for TokenCoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCoder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_ascii() {
        let coder = TokenCoder::new().expect("tokenizer loads");
        let text = "Paris is the capital of France.";
        let tokens = coder.encode(text);
        assert_eq!(coder.decode(&tokens).expect("decodes"), text);
    }

    #[test]
    fn count_matches_encoding_length() {
        let coder = TokenCoder::new().expect("tokenizer loads");
        let text = "counting tokens should be stable";
        assert_eq!(coder.count(text), coder.encode(text).len());
    }

    #[test]
    fn empty_text_has_zero_tokens() {
        let coder = TokenCoder::new().expect("tokenizer loads");
        assert_eq!(coder.count(""), 0);
    }
}
