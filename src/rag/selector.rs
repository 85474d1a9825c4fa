use std::sync::Arc;

use crate::llm::LlmProvider;
use crate::tokenizer::TokenCoder;

/// Two-stage chunk filter: model-judged relevance followed by token-budget
/// truncation. Both stages preserve the original chunk order.
#[derive(Clone)]
pub struct RelevanceSelector {
    llm: Arc<dyn LlmProvider>,
    coder: TokenCoder,
    affirmative_tokens: Vec<String>,
}

impl RelevanceSelector {
    pub fn new(llm: Arc<dyn LlmProvider>, coder: TokenCoder, affirmative_tokens: Vec<String>) -> Self {
        Self {
            llm,
            coder,
            affirmative_tokens,
        }
    }

    /// Ask the model a strict yes/no question per chunk and keep the
    /// affirmatively judged ones. If nothing passes, the first chunk is kept
    /// unconditionally so the source still contributes to the answer. Model
    /// failures count as "not relevant".
    pub async fn relevant_chunks(
        &self,
        question: &str,
        chunks: &[String],
        model: &str,
    ) -> Vec<String> {
        let mut relevant = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let prompt = relevance_prompt(question, i, chunk);
            match self.llm.generate(&prompt, model).await {
                Ok(response) if self.is_affirmative(&response) => relevant.push(chunk.clone()),
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!("Relevance check failed for chunk {}: {}", i + 1, err);
                }
            }
        }

        if relevant.is_empty() {
            if let Some(first) = chunks.first() {
                relevant.push(first.clone());
            }
        }
        relevant
    }

    /// Number of leading items whose cumulative token count stays within
    /// `max_tokens`. Walks in order and stops at the first overflow; the
    /// result is always a prefix length, never a reordering.
    pub fn budget_prefix_len<'a, I>(&self, texts: I, max_tokens: usize) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut total = 0usize;
        let mut kept = 0usize;
        for text in texts {
            let tokens = self.coder.count(text);
            if total + tokens > max_tokens {
                break;
            }
            total += tokens;
            kept += 1;
        }
        kept
    }

    /// Budget-truncate a chunk sequence, keeping the longest prefix that
    /// fits.
    pub fn within_budget(&self, chunks: Vec<String>, max_tokens: usize) -> Vec<String> {
        let keep = self.budget_prefix_len(chunks.iter().map(String::as_str), max_tokens);
        let mut chunks = chunks;
        chunks.truncate(keep);
        chunks
    }

    fn is_affirmative(&self, response: &str) -> bool {
        let normalized = response.trim().to_lowercase();
        self.affirmative_tokens
            .iter()
            .any(|token| normalized.starts_with(token.as_str()))
    }
}

fn relevance_prompt(question: &str, index: usize, chunk: &str) -> String {
    format!(
        "System: You are a helper.\n\
         Question: {}\n\n\
         Section #{}:\n{}\n\n\
         Is this section RELEVANT to answering the question? \
         Answer only with 'yes' or 'no'.",
        question,
        index + 1,
        chunk
    )
}
