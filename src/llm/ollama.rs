use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::config::settings::OllamaConfig;
use crate::core::errors::ApiError;

use super::provider::LlmProvider;
use super::types::ProviderModel;

pub const TIMEOUT_MESSAGE: &str = "The model request timed out. Please try again.";

/// Ollama-backed language model.
///
/// Completions shell out to the `ollama run` CLI with the prompt on stdin;
/// embeddings and health checks go through the HTTP API. Completion failures
/// degrade to inline error text so batch composition can proceed with
/// whatever fragments succeeded.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    binary: PathBuf,
    embed_model: String,
    generate_timeout: Duration,
    embed_timeout: Duration,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            binary: find_ollama_binary(),
            embed_model: config.embed_model.clone(),
            generate_timeout: Duration::from_secs(config.generate_timeout_secs),
            embed_timeout: Duration::from_secs(config.embed_timeout_secs),
            client: Client::new(),
        }
    }

    async fn run_cli(&self, args: &[&str], stdin: Option<&str>) -> Result<std::process::Output, std::io::Error> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.write_all(b"\n").await?;
            drop(pipe);
        }
        child.wait_with_output().await
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ApiError> {
        let output = self
            .run_cli(&["list"], None)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to run ollama list: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApiError::Internal(stderr.trim().to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_model_listing(&stdout, &self.embed_model))
    }

    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ApiError> {
        let result = tokio::time::timeout(
            self.generate_timeout,
            self.run_cli(&["run", model], Some(prompt)),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    Ok(strip_ansi_codes(&stdout).trim().to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    tracing::debug!("Model error: {}", stderr.trim());
                    Ok(format!("Error in the model request: {}", stderr.trim()))
                }
            }
            Ok(Err(err)) => {
                tracing::debug!("Unexpected error during model request: {}", err);
                Ok(format!("An unexpected error has occurred: {}", err))
            }
            Err(_) => {
                tracing::debug!("Model request timed out after {:?}", self.generate_timeout);
                Ok(TIMEOUT_MESSAGE.to_string())
            }
        }
    }

    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .timeout(self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!("Ollama embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let mut embeddings = Vec::new();
        if let Some(rows) = payload["embeddings"].as_array() {
            for row in rows {
                if let Some(vals) = row.as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "Embedding count mismatch: sent {}, received {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

fn find_ollama_binary() -> PathBuf {
    which::which("ollama").unwrap_or_else(|_| PathBuf::from("ollama"))
}

/// Strip ANSI escape sequences the CLI emits for progress spinners.
pub(crate) fn strip_ansi_codes(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| Regex::new("\u{1b}\\[[0-9;?]*[A-Za-z]").expect("valid regex"));
    re.replace_all(text, "").into_owned()
}

/// Parse the tabular `ollama list` output into model ids, dropping the
/// header row and the embedding model.
pub(crate) fn parse_model_listing(stdout: &str, embed_model: &str) -> Vec<ProviderModel> {
    let embed_prefix = embed_model.split(':').next().unwrap_or(embed_model);
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.starts_with(embed_prefix))
        .map(|name| ProviderModel {
            id: name.to_string(),
            name: name.to_string(),
        })
        .collect()
}
