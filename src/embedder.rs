//! Embedding provider seam and its OpenAI-compatible client.

use std::{future::Future, time::Duration};

use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Largest number of inputs sent in one embeddings request.
pub const MAX_INPUTS_PER_REQUEST: usize = 512;

/// Turns text into fixed-length vectors.
///
/// `embed_many` returns exactly one vector per input, in input order.
pub trait EmbeddingProvider {
    fn embed_many(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    fn embed_one(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<f32>>> + Send;
}

/// Async embeddings client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing OpenAI API key".into()));
        }
        if model.trim().is_empty() {
            return Err(Error::Config("missing embedding model name".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| Error::Config("invalid OpenAI API key".into()))?,
        );
        headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            batch_size: MAX_INPUTS_PER_REQUEST,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Embedding(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }

        let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
            Error::Embedding(format!("failed to parse embedding response: {e}"))
        })?;
        parsed.into_vectors(inputs.len())
    }
}

impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for page in texts.chunks(self.batch_size) {
            let inputs: Vec<&str> = page.iter().map(String::as_str).collect();
            vectors.extend(self.request(&inputs).await?);
            tracing::debug!(
                embedded = vectors.len(),
                total = texts.len(),
                "embedding progress"
            );
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response".into()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        if self.data.len() != expected {
            return Err(Error::Embedding(format!(
                "provider returned {} embeddings for {} inputs",
                self.data.len(),
                expected
            )));
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}
