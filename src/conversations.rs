use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;
use crate::sources::sanitize_name;

/// One question/answer exchange. Entries are append-only; the pipeline
/// never mutates or removes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    pub extractions: Vec<String>,
}

/// Per-conversation directories holding an append-only `log.json` plus any
/// generated audio artifacts.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    root: PathBuf,
}

impl ConversationStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            root: paths.conversations_dir.clone(),
        }
    }

    /// Directory for one conversation, created on first use.
    pub fn conversation_dir(&self, conv_id: &str) -> Result<PathBuf, ApiError> {
        let dir = self.root.join(sanitize_name(conv_id)?);
        fs::create_dir_all(&dir)
            .map_err(|e| ApiError::internal(format!("Failed to create conversation dir: {}", e)))?;
        Ok(dir)
    }

    pub fn append(&self, conv_id: &str, entry: LogEntry) -> Result<(), ApiError> {
        let log_path = self.conversation_dir(conv_id)?.join("log.json");

        let mut log: Vec<LogEntry> = match fs::read_to_string(&log_path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(ApiError::internal)?,
            Err(_) => Vec::new(),
        };
        log.push(entry);

        let json = serde_json::to_string_pretty(&log).map_err(ApiError::internal)?;
        fs::write(&log_path, json)
            .map_err(|e| ApiError::internal(format!("Failed to write conversation log: {}", e)))
    }

    pub fn read_log(&self, conv_id: &str) -> Result<Vec<LogEntry>, ApiError> {
        let log_path = self.root.join(sanitize_name(conv_id)?).join("log.json");
        match fs::read_to_string(&log_path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(ApiError::internal),
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Resolve a generated audio artifact for serving.
    pub fn audio_path(&self, conv_id: &str, filename: &str) -> Result<PathBuf, ApiError> {
        let path = self
            .root
            .join(sanitize_name(conv_id)?)
            .join(sanitize_name(filename)?);
        if !path.is_file() {
            return Err(ApiError::NotFound("Not found".to_string()));
        }
        Ok(path)
    }
}
