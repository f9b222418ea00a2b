//! Completion service with optional memoization.

use std::sync::Arc;
use tracing::{debug, error};

use crate::error::{ResolveError, Result};
use crate::services::CompletionCache;
use crate::traits::{CompletionClient, CompletionRequest};

/// Wraps a [`CompletionClient`], reading through an optional [`CompletionCache`].
#[derive(Clone)]
pub struct LlmService {
    client: Arc<dyn CompletionClient>,
    cache: Option<CompletionCache>,
}

impl LlmService {
    /// A service that always calls the client.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client, cache: None }
    }

    pub fn with_cache(mut self, cache: CompletionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&CompletionCache> {
        self.cache.as_ref()
    }

    /// Run a completion, serving it from the cache when possible.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if request.user_prompt.trim().is_empty() {
            return Err(ResolveError::InvalidInput(
                "Prompt text cannot be empty.".to_string(),
            ));
        }

        let key = request.effective_cache_key();
        if let Some(content) = self.cache.as_ref().and_then(|c| c.get(key)) {
            return Ok(content);
        }

        debug!(
            "Calling {} model {} ({} chars of prompt)",
            self.client.provider_name(),
            request.model,
            request.system_prompt.len() + request.user_prompt.len()
        );
        let content = self.client.complete(request).await.map_err(|e| {
            error!("Completion request failed: {}", e);
            ResolveError::Network(e)
        })?;

        if let Some(cache) = &self.cache {
            cache.put(key, &content, cache.current_version());
        }
        Ok(content)
    }
}
