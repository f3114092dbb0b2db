//! Language model seam and its OpenAI chat client.

use std::{future::Future, time::Duration};

use reqwest::{
    Client,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

const SYSTEM_PROMPT: &str = "You answer questions using only the context \
    you are given. If the context does not contain the answer, say that you \
    don't know instead of making one up.";

/// Produces an answer to a question grounded in a block of context.
pub trait LanguageModel {
    fn complete(
        &self,
        context: &str,
        question: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Build the user message: the whole context block, then the question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following context to answer the question at the end.\n\n\
         {context}\n\nQuestion: {question}\nHelpful answer:"
    )
}

/// Chat-completions client for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OpenAiChat {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("missing OpenAI API key".into()));
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
            endpoint: format!(
                "{}/chat/completions",
                base_url.trim_end_matches('/')
            ),
            model,
            temperature: 0.0,
        })
    }
}

impl LanguageModel for OpenAiChat {
    async fn complete(&self, context: &str, question: &str) -> Result<String> {
        let prompt = build_prompt(context, question);
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Completion(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Completion(format!(
                "chat request failed ({status}): {text}"
            )));
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            Error::Completion(format!("failed to parse chat response: {e}"))
        })?;
        parsed.into_answer()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_answer(self) -> Result<String> {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| {
                Error::Completion("chat response has no answer text".into())
            })
    }
}
