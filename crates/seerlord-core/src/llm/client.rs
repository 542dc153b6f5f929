//! OpenRouter-compatible LLM client
//!
//! Async HTTP client for chat completions and embeddings, behind the
//! `ChatModel` and `Embedder` traits so every consumer in the kernel can be
//! driven by a stub in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::{
    ChatOptions, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmResponse,
    Message,
};

/// OpenRouter API base URL
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Chat-completion capability consumed by the router, the evolution engine,
/// and every graph node that talks to a model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a conversation to the model and return its reply.
    async fn complete(&self, messages: Vec<Message>, options: ChatOptions) -> Result<LlmResponse>;
}

/// Embedding capability consumed by the skill and memory stores.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// HTTP client for an OpenRouter-compatible API
#[derive(Clone)]
pub struct LlmClient {
    http_client: HttpClient,
    config: LlmConfig,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("default_model", &self.config.default_model)
            .finish()
    }
}

impl LlmClient {
    /// Create a new client with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            config,
            api_key: api_key.into(),
            base_url: OPENROUTER_BASE_URL.to_string(),
        })
    }

    /// Override the base URL (for self-hosted gateways and tests)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Get the default model from configuration
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn map_transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::LLMTimeout(self.config.timeout_secs)
        } else {
            Error::NetworkError(err)
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, messages: Vec<Message>, options: ChatOptions) -> Result<LlmResponse> {
        let model = options
            .model
            .unwrap_or_else(|| self.config.default_model.clone());

        let mut request = ChatRequest::new(&model, messages)
            .with_temperature(options.temperature.unwrap_or(self.config.temperature))
            .with_max_tokens(options.max_tokens.unwrap_or(self.config.max_tokens));
        if options.json_output {
            request = request.with_json_output();
        }

        debug!(model = %model, json = options.json_output, "Sending chat completion request");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LLMError(format!("HTTP {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response.json().await.map_err(Error::NetworkError)?;

        LlmResponse::from_chat_response(chat_response)
            .ok_or_else(|| Error::LLMError("Response contained no choices".to_string()))
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::EmbeddingFailed("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest::batch(&self.config.embedding_model, texts.to_vec());

        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::EmbeddingFailed(format!("HTTP {}: {}", status, body)));
        }

        let embedding_response: EmbeddingResponse =
            response.json().await.map_err(Error::NetworkError)?;

        let mut data = embedding_response.data;
        if data.len() != texts.len() {
            return Err(Error::EmbeddingFailed(format!(
                "Requested {} embeddings, received {}",
                texts.len(),
                data.len()
            )));
        }

        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
