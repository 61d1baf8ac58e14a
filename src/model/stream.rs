//! Incremental decoding of structured model responses
//!
//! The model streams a single JSON object. While it is still incomplete we
//! pull out whatever prefix of the `explanation` string is already decodable
//! and hand back only the newly revealed tail. Once the stream ends the whole
//! buffer is parsed, and any tail of the explanation that was not yet
//! revealed is flushed once.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::{Error, Result, Snippet};

fn explanation_key() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""explanation"\s*:\s*""#).expect("static regex"))
}

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("static regex")
    })
}

/// The fully parsed response object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeneratedPayload {
    #[serde(flatten)]
    pub snippet: Snippet,
    pub explanation: String,
}

/// Strip a markdown code fence around the JSON body, if there is one.
pub fn strip_code_fence(text: &str) -> &str {
    match code_fence().captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str(),
        None => text.trim(),
    }
}

/// Parse a complete response buffer.
pub fn parse_payload(raw: &str) -> Result<GeneratedPayload> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        log::error!("failed to parse model response ({}): {}", e, raw);
        Error::Parsing {
            message: e.to_string(),
            raw: raw.to_string(),
        }
    })
}

/// Accumulates response text and tracks how much of the explanation has been
/// surfaced.
#[derive(Debug, Default)]
pub struct ExplanationStream {
    buffer: String,
    /// Byte offset just past the opening quote of the explanation value
    value_start: Option<usize>,
    emitted: String,
}

impl ExplanationStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of response text. Returns the part of the explanation
    /// revealed by this chunk, if any.
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        let current = self.partial_explanation()?;
        self.advance(current)
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Everything surfaced so far.
    pub fn emitted(&self) -> &str {
        &self.emitted
    }

    /// Parse the complete buffer. Also returns the unrevealed tail of the
    /// explanation, if the stream ended before all of it was surfaced.
    pub fn finish(mut self) -> Result<(GeneratedPayload, Option<String>)> {
        let payload = parse_payload(&self.buffer)?;
        let flush = self.advance(payload.explanation.clone());
        if !payload.explanation.starts_with(self.emitted.as_str()) {
            log::warn!("streamed explanation diverged from the final payload");
        }
        Ok((payload, flush))
    }

    fn advance(&mut self, current: String) -> Option<String> {
        if current.len() > self.emitted.len() && current.starts_with(self.emitted.as_str()) {
            let tail = current[self.emitted.len()..].to_string();
            self.emitted = current;
            Some(tail)
        } else {
            None
        }
    }

    fn partial_explanation(&mut self) -> Option<String> {
        let start = match self.value_start {
            Some(s) => s,
            None => {
                let s = explanation_key().find(&self.buffer)?.end();
                self.value_start = Some(s);
                s
            }
        };
        let rest = &self.buffer[start..];

        // Longest run of complete characters and escape pairs before the
        // closing quote. A trailing lone backslash is left out.
        let mut end = rest.len();
        let mut chars = rest.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    end = i;
                    break;
                }
                '\\' => {
                    if chars.next().is_none() {
                        end = i;
                        break;
                    }
                }
                _ => {}
            }
        }

        // Incomplete \u escapes and raw control characters fail here and are
        // retried on the next chunk.
        serde_json::from_str::<String>(&format!("\"{}\"", &rest[..end])).ok()
    }
}
