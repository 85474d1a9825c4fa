use async_trait::async_trait;

use crate::core::errors::ApiError;

use super::types::ProviderModel;

/// The language-model capability the pipeline consumes.
///
/// Relevance judging and answer composition treat the model as a black box
/// behind this trait so tests can inject deterministic stubs. Production
/// implementations should degrade to inline error text (timeouts, non-zero
/// exits) rather than returning `Err`; callers convert any `Err` that does
/// surface into the same kind of inline string.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "ollama").
    fn name(&self) -> &str;

    /// Check if the provider is reachable.
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// List available chat models.
    async fn list_models(&self) -> Result<Vec<ProviderModel>, ApiError>;

    /// Single-shot completion for one prompt, bounded by the provider's
    /// configured timeout.
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, ApiError>;

    /// Generate embeddings; output order matches input order.
    async fn embed(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>, ApiError>;
}
