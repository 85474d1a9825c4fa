use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

/// Typed application configuration, loaded from `config.yml`.
///
/// Every field carries a default so a missing file or a partial file is
/// always usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ollama: OllamaConfig,
    pub rag: RagConfig,
    pub search: SearchConfig,
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    pub base_url: String,
    /// Default chat model when a request does not name one.
    pub chat_model: String,
    /// Embedding model; also filtered out of the model listing.
    pub embed_model: String,
    pub generate_timeout_secs: u64,
    pub embed_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2:latest".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            generate_timeout_secs: 60,
            embed_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Total token budget for context assembled into one prompt.
    pub token_budget: usize,
    /// Chunk size used when (re)building the vector index.
    pub index_chunk_tokens: usize,
    /// Chunk size used when answering over raw extracted content.
    pub ask_chunk_tokens: usize,
    /// Maximum chunks per source fed into a per-source prompt.
    pub blocks_per_source: usize,
    /// Responses whose lowercased text starts with one of these count as
    /// an affirmative relevance judgment.
    pub affirmative_tokens: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            token_budget: 131_072,
            index_chunk_tokens: 1024,
            ask_chunk_tokens: 4096,
            blocks_per_source: 5,
            affirmative_tokens: vec!["yes".to_string(), "ja".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// How many usable web results to aggregate in the fallback ladder.
    pub max_results: usize,
    /// Extracted page text shorter than this is discarded as unusable.
    pub min_content_len: usize,
    /// Web content longer than this many tokens is summarized before use.
    pub summarize_threshold_tokens: usize,
    pub fetch_timeout_secs: u64,
    pub connectivity_timeout_secs: u64,
    pub connectivity_probe_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            min_content_len: 100,
            summarize_threshold_tokens: 1000,
            fetch_timeout_secs: 10,
            connectivity_timeout_secs: 5,
            connectivity_probe_url: "https://www.google.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub enabled: bool,
    /// External synthesis command; resolved on PATH at call time.
    pub command: String,
    pub voice: String,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "edge-tts".to_string(),
            voice: "en-GB-ThomasNeural".to_string(),
            timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load(paths: &AppPaths) -> Self {
        let path = config_path(paths);
        match fs::read_to_string(&path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("Invalid config at {}: {}; using defaults", path.display(), err);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

fn config_path(paths: &AppPaths) -> PathBuf {
    if let Ok(path) = env::var("MENTORA_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    let user_config = paths.user_data_dir.join("config.yml");
    if user_config.exists() {
        return user_config;
    }

    paths.project_root.join("config.yml")
}
