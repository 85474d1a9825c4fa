use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::answer::AnswerService;
use crate::conversations::ConversationStore;
use crate::core::config::{AppConfig, AppPaths};
use crate::extractor::ContentExtractor;
use crate::llm::{LlmProvider, OllamaProvider};
use crate::rag::{Chunker, IndexStore, RelevanceSelector};
use crate::search::{DdgSearch, WebSearchProvider};
use crate::sources::SourceStore;
use crate::tokenizer::TokenCoder;
use crate::tts::TtsService;

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub llm: Arc<dyn LlmProvider>,
    pub index: Arc<IndexStore>,
    pub sources: SourceStore,
    pub conversations: ConversationStore,
    pub extractor: ContentExtractor,
    pub chunker: Chunker,
    pub answers: AnswerService,
    #[allow(dead_code)]
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = Arc::new(AppPaths::new());
        let config = AppConfig::load(&paths);

        let coder = TokenCoder::new()?;
        let chunker = Chunker::new(coder.clone());

        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaProvider::new(&config.ollama));
        let search: Arc<dyn WebSearchProvider> = Arc::new(DdgSearch::new(&config.search));
        let extractor = ContentExtractor::new(&config.search);

        let index = Arc::new(IndexStore::new(&paths));
        index.load().await;

        let sources = SourceStore::new(&paths);
        let conversations = ConversationStore::new(&paths);
        let selector = RelevanceSelector::new(
            Arc::clone(&llm),
            coder.clone(),
            config.rag.affirmative_tokens.clone(),
        );
        let tts = Arc::new(TtsService::new(&config.tts));

        let answers = AnswerService::new(
            Arc::clone(&llm),
            search,
            Arc::clone(&index),
            extractor.clone(),
            selector,
            chunker.clone(),
            coder,
            conversations.clone(),
            tts,
            config.clone(),
        );

        Ok(Arc::new(AppState {
            paths,
            config,
            llm,
            index,
            sources,
            conversations,
            extractor,
            chunker,
            answers,
            started_at: Utc::now(),
        }))
    }
}
