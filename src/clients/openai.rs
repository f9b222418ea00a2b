//! OpenAI client for embeddings and chat completions.
//!
//! Embeddings default to text-embedding-3-small (1536 dimensions).

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::traits::{CompletionClient, CompletionRequest, EmbeddingClient, ResponseFormat};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// OpenAI API embedding request.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// OpenAI API embedding response.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// OpenAI API chat completion request.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
}

/// OpenAI API chat completion response.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// OpenAI client.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    embedding_dimension: usize,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }

    /// Point the client at a compatible API.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_embedding_model(mut self, model: String, dimension: usize) -> Self {
        self.embedding_model = model;
        self.embedding_dimension = dimension;
        self
    }

    /// Reuse a configured HTTP client (timeouts, pooling).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let api_response: EmbeddingsResponse =
            self.post("embeddings", &request).await?.json().await?;

        // Sort by index to ensure correct order
        let mut data = api_response.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(anyhow!(
                "OpenAI returned {} embeddings for {} inputs",
                data.len(),
                texts.len()
            ));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.embedding_dimension
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request.response_format.map(|format| ResponseFormatBody {
                kind: match format {
                    ResponseFormat::Text => "text",
                    ResponseFormat::JsonObject => "json_object",
                },
            }),
        };

        let api_response: ChatResponse = self.post("chat/completions", &body).await?.json().await?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No completion returned from OpenAI"))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let client = OpenAiClient::new("test".to_string());
        assert_eq!(EmbeddingClient::dimension(&client), 1536);
        assert_eq!(client.base_url, "https://api.openai.com/v1");

        let client = client
            .with_base_url("http://localhost:8080/v1/".to_string())
            .with_embedding_model("text-embedding-3-large".to_string(), 3072);
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(EmbeddingClient::dimension(&client), 3072);
    }

    #[test]
    fn test_chat_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.1,
            response_format: Some(ResponseFormatBody { kind: "json_object" }),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
