//! Transport for the Gemini `streamGenerateContent` endpoint
//!
//! Requests are posted with `alt=sse`; the response is a server-sent event
//! stream whose `data:` lines each carry a partial `GenerateContentResponse`.
//! Text parts of the first candidate are forwarded in order.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{GenerateRequest, ModelTransport, Part, TextStream};
use crate::{Error, ModelConfig, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: [WireContent<'a>; 1],
    system_instruction: WireSystem<'a>,
    generation_config: WireGenerationConfig<'a>,
}

#[derive(Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: WireBlob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct WireSystem<'a> {
    parts: [WirePart<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a Value,
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &'a GenerateRequest) -> Self {
        let parts = request
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::Text { text: text.as_str() },
                Part::InlineData { mime_type, data } => WirePart::Inline {
                    inline_data: WireBlob {
                        mime_type: mime_type.as_str(),
                        data: data.as_str(),
                    },
                },
            })
            .collect();
        Self {
            contents: [WireContent { role: "user", parts }],
            system_instruction: WireSystem {
                parts: [WirePart::Text {
                    text: request.system_instruction.as_str(),
                }],
            },
            generation_config: WireGenerationConfig {
                response_mime_type: "application/json",
                response_schema: &request.response_schema,
            },
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<Value>,
}

impl StreamChunk {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

impl WireError {
    fn key_invalid(&self) -> bool {
        self.message.contains("API key not valid")
            || self
                .details
                .iter()
                .any(|d| d.get("reason").and_then(Value::as_str) == Some("API_KEY_INVALID"))
    }
}

/// Map a failed HTTP response to the error taxonomy.
pub(crate) fn classify_status(status: u16, body: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    classify(status, parsed.as_ref(), body)
}

fn classify(status: u16, err: Option<&WireError>, body: &str) -> Error {
    let message = match err {
        Some(err) if !err.message.is_empty() => err.message.clone(),
        _ => body.trim().chars().take(200).collect(),
    };
    let key_invalid = err.map(WireError::key_invalid).unwrap_or(false) || body.contains("API_KEY_INVALID");

    if status == 401 || status == 403 || (status == 400 && key_invalid) {
        Error::rejected_credential(&message)
    } else {
        Error::Transport(format!("status {}: {}", status, message))
    }
}

/// Splits a byte stream into SSE lines and decodes their `data:` payloads.
/// Bytes are buffered until a newline so multi-byte characters and JSON
/// documents may straddle network chunks.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(item) = decode_line(&String::from_utf8_lossy(&line)) {
                out.push(item);
            }
        }
        out
    }

    /// Decode a final line that arrived without a trailing newline.
    pub(crate) fn finish(&mut self) -> Vec<Result<String>> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn decode_line(line: &str) -> Option<Result<String>> {
    let data = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(StreamChunk {
            error: Some(err), ..
        }) => Some(Err(classify(err.code.unwrap_or(500), Some(&err), data))),
        Ok(chunk) => {
            let text = chunk.text();
            if text.is_empty() {
                None
            } else {
                Some(Ok(text))
            }
        }
        Err(e) => Some(Err(Error::Transport(format!("malformed stream event: {}", e)))),
    }
}

/// HTTP transport for the Gemini API
#[derive(Clone)]
pub struct GeminiTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiTransport {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Url::parse(&config.endpoint).map_err(|e| {
            Error::InvalidSetting(format!("model endpoint {:?}: {}", config.endpoint, e))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn stream_url(&self, model: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/models/{}:streamGenerateContent",
            self.endpoint, model
        ))
        .map_err(|e| Error::InvalidSetting(format!("model {:?}: {}", model, e)))?;
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let api_key = self.api_key.as_deref().ok_or_else(Error::missing_credential)?;
        let url = self.stream_url(&request.model)?;

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&WireRequest::from_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("model request to {} failed with {}", request.model, status);
            return Err(classify_status(status.as_u16(), &body));
        }

        Ok(decode_sse(response))
    }
}

fn decode_sse(response: reqwest::Response) -> TextStream {
    let state = (
        response.bytes_stream().boxed(),
        SseDecoder::default(),
        VecDeque::new(),
        false,
    );
    stream::unfold(state, |(mut bytes, mut decoder, mut queue, mut done)| async move {
        loop {
            if let Some(item) = queue.pop_front() {
                return Some((item, (bytes, decoder, queue, done)));
            }
            if done {
                return None;
            }
            match bytes.next().await {
                Some(Ok(chunk)) => queue.extend(decoder.feed(&chunk)),
                Some(Err(e)) => {
                    queue.push_back(Err(Error::from(e)));
                    done = true;
                }
                None => {
                    queue.extend(decoder.finish());
                    done = true;
                }
            }
        }
    })
    .boxed()
}
