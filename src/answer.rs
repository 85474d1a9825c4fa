use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::conversations::{ConversationStore, LogEntry};
use crate::core::config::AppConfig;
use crate::core::errors::ApiError;
use crate::extractor::{ContentExtractor, NO_CONTENT_SENTINEL};
use crate::llm::LlmProvider;
use crate::rag::{Chunker, IndexStore, RelevanceSelector};
use crate::search::WebSearchProvider;
use crate::tokenizer::TokenCoder;
use crate::tts::TtsService;

pub const SELECT_SOURCE_MESSAGE: &str = "Please select at least one source.";
pub const NO_RELEVANT_CONTENT_MESSAGE: &str = "No relevant content found.";
pub const MISSING_INPUT_MESSAGE: &str = "Please select a skill level and enter a question.";
pub const NO_EXTRACTED_CONTENT_MESSAGE: &str = "No extracted content available.";
pub const NO_INFORMATION_SENTENCE: &str = "The sources contain no information on this question.";

/// Coarse answer-style parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompetenceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CompetenceLevel {
    pub fn style_instruction(self) -> &'static str {
        match self {
            CompetenceLevel::Beginner => "answer briefly and simply",
            CompetenceLevel::Intermediate => "answer in a balanced manner at a moderate level",
            CompetenceLevel::Advanced => "explain in detail at an advanced level",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub conversation_id: String,
    pub competence_level: Option<CompetenceLevel>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub selected_extractions: Vec<String>,
    pub selected_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub response: String,
    pub per_source_answers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

impl AskOutcome {
    fn terminal(message: &str) -> Self {
        Self {
            response: message.to_string(),
            per_source_answers: Vec::new(),
            audio_file: None,
        }
    }
}

/// Composes multi-source answers: per-source prompting with citation
/// discipline, a synthesis pass, and the fallback ladder (local corpus,
/// then web search, then the model's own knowledge) when no local content
/// exists.
#[derive(Clone)]
pub struct AnswerService {
    llm: Arc<dyn LlmProvider>,
    search: Arc<dyn WebSearchProvider>,
    index: Arc<IndexStore>,
    extractor: ContentExtractor,
    selector: RelevanceSelector,
    chunker: Chunker,
    coder: TokenCoder,
    conversations: ConversationStore,
    tts: Arc<TtsService>,
    config: AppConfig,
}

impl AnswerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn WebSearchProvider>,
        index: Arc<IndexStore>,
        extractor: ContentExtractor,
        selector: RelevanceSelector,
        chunker: Chunker,
        coder: TokenCoder,
        conversations: ConversationStore,
        tts: Arc<TtsService>,
        config: AppConfig,
    ) -> Self {
        Self {
            llm,
            search,
            index,
            extractor,
            selector,
            chunker,
            coder,
            conversations,
            tts,
            config,
        }
    }

    /// Answer a question over the user's selected sources: retrieve each
    /// source's chunks from the index, filter and budget-select them, prompt
    /// once per source, then synthesize one cited overview.
    pub async fn ask(&self, request: AskRequest) -> Result<AskOutcome, ApiError> {
        if request.selected_extractions.is_empty() {
            return Ok(AskOutcome::terminal(SELECT_SOURCE_MESSAGE));
        }
        let question = request.question.trim();
        let Some(competence) = request.competence_level else {
            return Ok(AskOutcome::terminal(MISSING_INPUT_MESSAGE));
        };
        if question.is_empty() {
            return Ok(AskOutcome::terminal(MISSING_INPUT_MESSAGE));
        }

        let model = request
            .selected_model
            .clone()
            .unwrap_or_else(|| self.config.ollama.chat_model.clone());

        // Retrieval and relevance filtering, source by source, in the order
        // the user selected.
        let mut candidates: Vec<(String, String)> = Vec::new();
        for source in &request.selected_extractions {
            let mut chunks = self.index.query_by_source(source).await;
            chunks.truncate(self.config.rag.blocks_per_source);
            let relevant = self
                .selector
                .relevant_chunks(question, &chunks, &model)
                .await;
            candidates.extend(relevant.into_iter().map(|c| (source.clone(), c)));
        }

        let keep = self.selector.budget_prefix_len(
            candidates.iter().map(|(_, chunk)| chunk.as_str()),
            self.config.rag.token_budget,
        );
        candidates.truncate(keep);

        // Per-source answering over the surviving chunks.
        let mut fragments = Vec::new();
        for (source, content) in group_by_source(candidates) {
            if content.trim().is_empty() {
                continue;
            }
            let prompt = per_source_prompt(competence, &source, &content, question);
            let answer = self.generate_text(&prompt, &model).await;
            fragments.push(format!("**Answer for {}:**\n{}", source, answer.trim()));
        }

        if fragments.is_empty() {
            return Ok(AskOutcome::terminal(NO_RELEVANT_CONTENT_MESSAGE));
        }

        let final_answer = self
            .generate_text(&synthesis_prompt(&fragments), &model)
            .await;

        let audio_file = self.dispatch_side_effects(&request, question, &final_answer);

        Ok(AskOutcome {
            response: final_answer,
            per_source_answers: fragments,
            audio_file,
        })
    }

    /// The no-index entry point: answer over freshly extracted content, or
    /// walk the fallback ladder when there is none.
    pub async fn answer_from_extracted(
        &self,
        competence: Option<CompetenceLevel>,
        sources: &BTreeMap<String, String>,
        had_urls: bool,
        had_files: bool,
        question: &str,
        model: &str,
    ) -> String {
        let question = question.trim();
        let Some(competence) = competence else {
            return MISSING_INPUT_MESSAGE.to_string();
        };
        if question.is_empty() {
            return MISSING_INPUT_MESSAGE.to_string();
        }

        let no_content = sources
            .values()
            .all(|text| text.trim().is_empty() || text.trim() == NO_CONTENT_SENTINEL);

        if no_content {
            if had_urls || had_files {
                return NO_EXTRACTED_CONTENT_MESSAGE.to_string();
            }
            if !self.search.check_connectivity().await {
                tracing::debug!("No internet connection; using internal model knowledge");
                return self
                    .generate_text(&format!("Question: {}", question), model)
                    .await;
            }
            let web_contents = self.usable_web_content(question).await;
            if web_contents.is_empty() {
                tracing::debug!("Web search returned no usable content; using internal model knowledge");
                return self
                    .generate_text(&format!("Question: {}", question), model)
                    .await;
            }
            return self.combined_web_answer(&web_contents, question, model).await;
        }

        self.answer_over_blocks(competence, sources, question, model)
            .await
    }

    /// Answer over extracted contents in one prompt: chunk each source,
    /// filter for relevance, budget-select, and pin the exact
    /// no-information sentence.
    async fn answer_over_blocks(
        &self,
        competence: CompetenceLevel,
        sources: &BTreeMap<String, String>,
        question: &str,
        model: &str,
    ) -> String {
        let mut all_relevant: Vec<String> = Vec::new();
        for (name, text) in sources {
            if text.trim().is_empty() || text.trim() == NO_CONTENT_SENTINEL {
                continue;
            }
            let headed = format!("### Source: {}\n{}", name, text);
            let chunks: Vec<String> = self
                .chunker
                .split(&headed, self.config.rag.ask_chunk_tokens)
                .collect();
            let relevant = self.selector.relevant_chunks(question, &chunks, model).await;
            all_relevant.extend(relevant);
        }

        let selected = self
            .selector
            .within_budget(all_relevant, self.config.rag.token_budget);
        let combined = selected.join("\n\n---\n\n");

        let prompt = contexts_prompt(competence, &combined, question);
        let response = self.generate_text(&prompt, model).await;
        if response.contains(NO_INFORMATION_SENTENCE) {
            NO_INFORMATION_SENTENCE.to_string()
        } else {
            response.trim().to_string()
        }
    }

    /// Web results 2..=N+1, reduced to readable text, keeping only pieces
    /// longer than the configured minimum.
    async fn usable_web_content(&self, question: &str) -> Vec<String> {
        let results = match self.search.search(question, 10).await {
            Ok(results) => results,
            Err(err) => {
                tracing::debug!("Web search failed: {}", err);
                return Vec::new();
            }
        };

        let mut contents = Vec::new();
        for result in results
            .iter()
            .skip(1)
            .take(self.config.search.max_results)
        {
            let content = self.extractor.readable_content(&result.url).await;
            if content.len() > self.config.search.min_content_len {
                contents.push(content);
            } else {
                tracing::debug!("Content from {} is too short or empty", result.url);
            }
        }
        contents
    }

    /// Aggregate web findings into one answer, summarizing any oversized
    /// piece first.
    async fn combined_web_answer(
        &self,
        web_contents: &[String],
        question: &str,
        model: &str,
    ) -> String {
        let threshold = self.config.search.summarize_threshold_tokens;
        let mut pieces = Vec::with_capacity(web_contents.len());
        for content in web_contents {
            if self.coder.count(content) > threshold {
                pieces.push(self.summarise(content, model).await);
            } else {
                pieces.push(content.clone());
            }
        }

        let combined = pieces.join("\n\n---\n\n");
        let prompt = format!(
            "System: You are an intelligent assistant. Please summarize the following \
             information and then answer the question.\n\n\
             Information:\n{}\n\n\
             Question: {}",
            combined, question
        );
        self.generate_text(&prompt, model).await
    }

    pub async fn summarise(&self, text: &str, model: &str) -> String {
        let prompt = format!("Summarize the following text in a few sentences:\n\n{}", text);
        self.generate_text(&prompt, model).await
    }

    /// Every model invocation is a single bounded attempt; an `Err` that
    /// still surfaces becomes inline text so composition can continue.
    async fn generate_text(&self, prompt: &str, model: &str) -> String {
        match self.llm.generate(prompt, model).await {
            Ok(text) => text,
            Err(err) => format!("Error in the model request: {}", err),
        }
    }

    /// TTS rendering and the log append run as background tasks; their
    /// outcome never changes the returned answer.
    fn dispatch_side_effects(
        &self,
        request: &AskRequest,
        question: &str,
        final_answer: &str,
    ) -> Option<String> {
        let conv_dir = match self
            .conversations
            .conversation_dir(&request.conversation_id)
        {
            Ok(dir) => dir,
            Err(err) => {
                tracing::warn!("Skipping conversation side effects: {}", err);
                return None;
            }
        };

        let audio_file = self.tts.prepare();
        if let Some(name) = &audio_file {
            let tts = Arc::clone(&self.tts);
            let answer = final_answer.to_string();
            let out_path = conv_dir.join(name);
            tokio::spawn(async move {
                tts.render_to(&answer, &out_path).await;
            });
        }

        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            question: question.to_string(),
            answer: final_answer.to_string(),
            audio_file: audio_file.clone(),
            extractions: request.selected_extractions.clone(),
        };
        let conversations = self.conversations.clone();
        let conv_id = request.conversation_id.clone();
        tokio::spawn(async move {
            if let Err(err) = conversations.append(&conv_id, entry) {
                tracing::warn!("Failed to append conversation log: {}", err);
            }
        });

        audio_file
    }
}

/// Collapse `(source, chunk)` pairs into `(source, joined content)` while
/// preserving order; pairs of one source arrive contiguously.
fn group_by_source(candidates: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut grouped: Vec<(String, String)> = Vec::new();
    for (source, chunk) in candidates {
        match grouped.last_mut() {
            Some((current, content)) if *current == source => {
                content.push_str("\n\n");
                content.push_str(&chunk);
            }
            _ => grouped.push((source, chunk)),
        }
    }
    grouped
}

fn per_source_prompt(
    competence: CompetenceLevel,
    source: &str,
    content: &str,
    question: &str,
) -> String {
    format!(
        "System: You are an intelligent assistant. {}. \
         Only use the following source content, and at the end, cite the source as \
         (Source: {}).\n\n\
         Source:\n{}\n\n\
         Question: {}\n\
         Answer:",
        competence.style_instruction(),
        source,
        content,
        question
    )
}

fn synthesis_prompt(fragments: &[String]) -> String {
    format!(
        "System: Summarize all of the following answers for each source into an overall \
         view, and cite the sources as (Source: ...). If there are overlaps, summarize \
         them; otherwise, distinguish them clearly.\n\n\
         Responses per source:\n\n{}\n\n\
         Overall response:",
        fragments.join("\n\n---\n\n")
    )
}

fn contexts_prompt(competence: CompetenceLevel, combined: &str, question: &str) -> String {
    format!(
        "System: You are an intelligent assistant. {}. \
         Answer based solely on the following contexts. \
         If there is no answer in the sources, answer exactly: '{}'\n\n\
         Contexts:\n{}\n\n\
         Question: {}\n\
         Answer:",
        competence.style_instruction(),
        NO_INFORMATION_SENTENCE,
        combined,
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_instructions_scale_with_competence() {
        assert_eq!(
            CompetenceLevel::Beginner.style_instruction(),
            "answer briefly and simply"
        );
        assert!(CompetenceLevel::Advanced
            .style_instruction()
            .contains("in detail"));
    }

    #[test]
    fn competence_parses_from_request_json() {
        let request: AskRequest = serde_json::from_str(
            r#"{
                "conversation_id": "c1",
                "competence_level": "Beginner",
                "question": "Why?",
                "selected_extractions": ["extraction_a.txt"]
            }"#,
        )
        .expect("request parses");
        assert_eq!(request.competence_level, Some(CompetenceLevel::Beginner));
        assert!(request.selected_model.is_none());
    }

    #[test]
    fn per_source_prompt_carries_citation_instruction() {
        let prompt = per_source_prompt(
            CompetenceLevel::Beginner,
            "extraction_a.txt",
            "Paris is the capital of France.",
            "What is the capital of France?",
        );
        assert!(prompt.contains("(Source: extraction_a.txt)"));
        assert!(prompt.contains("answer briefly and simply"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn synthesis_prompt_contains_all_fragments() {
        let fragments = vec![
            "**Answer for a.txt:**\nAlpha.".to_string(),
            "**Answer for b.txt:**\nBeta.".to_string(),
        ];
        let prompt = synthesis_prompt(&fragments);
        assert!(prompt.contains("Alpha."));
        assert!(prompt.contains("Beta."));
        assert!(prompt.contains("(Source: ...)"));
    }

    #[test]
    fn contexts_prompt_pins_no_information_sentence() {
        let prompt = contexts_prompt(CompetenceLevel::Intermediate, "ctx", "Q?");
        assert!(prompt.contains(NO_INFORMATION_SENTENCE));
    }

    #[test]
    fn grouping_preserves_source_order_and_joins_chunks() {
        let grouped = group_by_source(vec![
            ("a.txt".to_string(), "one".to_string()),
            ("a.txt".to_string(), "two".to_string()),
            ("b.txt".to_string(), "three".to_string()),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "a.txt");
        assert_eq!(grouped[0].1, "one\n\ntwo");
        assert_eq!(grouped[1].1, "three");
    }
}
