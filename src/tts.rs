use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use uuid::Uuid;

use crate::core::config::settings::TtsConfig;

/// Best-effort text-to-speech through an external CLI (edge-tts by
/// default). Synthesis failures only cost the audio artifact, never the
/// answer.
#[derive(Debug, Clone)]
pub struct TtsService {
    enabled: bool,
    command: String,
    voice: String,
    timeout: Duration,
}

impl TtsService {
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            enabled: config.enabled && !config.command.is_empty(),
            command: config.command.clone(),
            voice: config.voice.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Check availability and reserve an output filename. Returns `None`
    /// when synthesis is disabled or the external command is missing, so
    /// callers can skip dispatching a render task entirely.
    pub fn prepare(&self) -> Option<String> {
        if !self.enabled || which::which(&self.command).is_err() {
            return None;
        }
        Some(format!("{}.mp3", Uuid::new_v4().simple()))
    }

    /// Render `text` into an mp3 inside `out_dir` and return the generated
    /// filename, or `None` when synthesis is disabled or fails.
    pub async fn synthesize(&self, text: &str, out_dir: &Path) -> Option<String> {
        let filename = self.prepare()?;
        if self.render_to(text, &out_dir.join(&filename)).await {
            Some(filename)
        } else {
            None
        }
    }

    /// Render `text` to a concrete output path. Returns whether an audio
    /// file was produced.
    pub async fn render_to(&self, text: &str, out_path: &Path) -> bool {
        let binary = match which::which(&self.command) {
            Ok(binary) => binary,
            Err(_) => return false,
        };

        let spoken = clean_text_for_speech(text);
        if spoken.is_empty() {
            return false;
        }

        let mut cmd = Command::new(binary);
        cmd.arg("--voice")
            .arg(&self.voice)
            .arg("--text")
            .arg(&spoken)
            .arg("--write-media")
            .arg(out_path);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => true,
            Ok(Ok(output)) => {
                tracing::debug!(
                    "TTS command failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Ok(Err(err)) => {
                tracing::debug!("TTS command could not run: {}", err);
                false
            }
            Err(_) => {
                tracing::debug!("TTS command timed out after {:?}", self.timeout);
                false
            }
        }
    }
}

/// Strip markdown and markup so the synthesized speech reads naturally.
pub(crate) fn clean_text_for_speech(text: &str) -> String {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        [
            (r"\*\*([^*]+)\*\*", "$1"),
            (r"\*([^*]+)\*", "$1"),
            (r"__([^_]+)__", "$1"),
            (r"_([^_]+)_", "$1"),
            (r"`([^`]+)`", "$1"),
            (r"\[([^\]]+)\]\([^)]+\)", "$1"),
            (r"<[^>]+>", ""),
            (r"[#>\-]", ""),
            (r"[•●‣→⇒]", ""),
            (r"\s+", " "),
        ]
        .into_iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
        .collect()
    });

    let mut cleaned = text.to_string();
    for (re, replacement) in rules {
        cleaned = re.replace_all(&cleaned, *replacement).into_owned();
    }
    cleaned.trim().to_string()
}
