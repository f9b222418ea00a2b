//! Core traits for the external collaborators of the resolver.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Requested shape of an LLM completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Request for a single chat-style text completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Instructions for the model.
    pub system_prompt: String,
    /// The user turn; also the default cache key.
    pub user_prompt: String,
    /// The model to use (provider-specific).
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional structured response format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Overrides the user prompt as the memoization key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl CompletionRequest {
    pub fn new(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.into(),
            temperature,
            response_format: None,
            cache_key: None,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// The key the completion is memoized under.
    pub fn effective_cache_key(&self) -> &str {
        self.cache_key.as_deref().unwrap_or(&self.user_prompt)
    }
}

/// One candidate row as reported by a terminology provider.
///
/// Fields are optional because providers omit them or send values that do
/// not parse; filtering happens in the ranking stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub score: Option<f64>,
    pub rank: Option<u32>,
    pub source: Option<String>,
}

/// Trait for clients that produce text completions.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run a completion and return the raw message content.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}

/// Trait for embedding clients that can generate embeddings.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed every text, preserving input order and length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of the vectors this client produces.
    fn dimension(&self) -> usize;

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}

/// Trait for terminology services that return code candidates for a term.
#[async_trait]
pub trait TerminologyClient: Send + Sync {
    /// Search for up to `max_entries` candidates.
    ///
    /// `Ok(vec![])` means the provider answered with zero rows; transport and
    /// payload errors are `Err`.
    async fn search(&self, term: &str, max_entries: usize) -> Result<Vec<RawCandidate>>;

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_defaults_to_user_prompt() {
        let request = CompletionRequest::new("sys", "user text", "gpt-4o-mini", 0.1);
        assert_eq!(request.effective_cache_key(), "user text");

        let request = request.with_cache_key("custom");
        assert_eq!(request.effective_cache_key(), "custom");
    }
}
