//! Remote model access
//!
//! [`ModelClient`] builds generation and refinement requests, streams the
//! response through a [`ModelTransport`], forwards the explanation as it
//! arrives and parses the final payload. Transports only move text; all
//! schema and parsing concerns live here.

pub mod schema;
pub mod stream;

#[cfg(feature = "gemini")]
pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use crate::{ModelConfig, Result, RoundRecord, Snippet};
use self::stream::{ExplanationStream, GeneratedPayload};

#[cfg(feature = "gemini")]
pub use gemini::GeminiTransport;

/// Raw response text as it arrives from the service
pub type TextStream = BoxStream<'static, Result<String>>;

/// One piece of request content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Base64 payload with its MIME type
    InlineData { mime_type: String, data: String },
}

/// A single structured-generation request
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: String,
    /// Content parts, in order
    pub parts: Vec<Part>,
    pub response_schema: Value,
}

/// Moves a request to the remote service and streams back response text.
///
/// Implementations classify their failures: credential problems as
/// [`crate::Error::Credential`], everything else as [`crate::Error::Transport`].
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<TextStream>;
}

/// Result of one refinement request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub snippet: Snippet,
    pub explanation: String,
}

#[derive(Clone)]
pub struct ModelClient {
    transport: Arc<dyn ModelTransport>,
    generation_model: String,
    refinement_model: String,
}

impl ModelClient {
    pub fn new(transport: Arc<dyn ModelTransport>, config: &ModelConfig) -> Self {
        Self {
            transport,
            generation_model: config.generation_model.clone(),
            refinement_model: config.refinement_model.clone(),
        }
    }

    /// Generate a snippet from a prompt. `on_chunk` receives the explanation
    /// as it streams in; the chunks concatenate to the final explanation.
    pub async fn generate<F>(&self, prompt: &str, on_chunk: F) -> Result<Snippet>
    where
        F: FnMut(&str),
    {
        let request = GenerateRequest {
            model: self.generation_model.clone(),
            system_instruction: schema::GENERATION_SYSTEM_PROMPT.to_string(),
            parts: vec![Part::Text(prompt.to_string())],
            response_schema: schema::response_schema(),
        };
        let payload = self.stream_payload(&request, on_chunk).await?;
        Ok(payload.snippet)
    }

    /// Ask for one targeted fix of `snippet`, given a base64 JPEG of its
    /// render and the explanations of earlier rounds.
    pub async fn refine<F>(
        &self,
        snippet: &Snippet,
        screenshot: &str,
        history: &[RoundRecord],
        on_chunk: F,
    ) -> Result<Refinement>
    where
        F: FnMut(&str),
    {
        let request = GenerateRequest {
            model: self.refinement_model.clone(),
            system_instruction: schema::REFINEMENT_SYSTEM_PROMPT.to_string(),
            parts: vec![
                Part::Text(schema::current_code_text(snippet)),
                Part::Text(schema::history_text(history)),
                Part::InlineData {
                    mime_type: schema::SCREENSHOT_MIME.to_string(),
                    data: screenshot.to_string(),
                },
                Part::Text(schema::REFINEMENT_INSTRUCTION.to_string()),
            ],
            response_schema: schema::response_schema(),
        };
        let payload = self.stream_payload(&request, on_chunk).await?;
        Ok(Refinement {
            snippet: payload.snippet,
            explanation: payload.explanation,
        })
    }

    async fn stream_payload<F>(&self, request: &GenerateRequest, mut on_chunk: F) -> Result<GeneratedPayload>
    where
        F: FnMut(&str),
    {
        log::debug!("opening stream to {} ({} parts)", request.model, request.parts.len());
        let mut response = self.transport.open_stream(request).await?;
        let mut explanation = ExplanationStream::new();

        while let Some(chunk) = response.next().await {
            let chunk = chunk?;
            if let Some(revealed) = explanation.push(&chunk) {
                on_chunk(&revealed);
            }
        }

        log::debug!("stream from {} closed after {} bytes", request.model, explanation.buffer().len());
        let (payload, rest) = explanation.finish()?;
        if let Some(rest) = rest {
            on_chunk(&rest);
        }
        Ok(payload)
    }
}
