//! Preview documents
//!
//! A snippet is previewed as a minimal standalone page: the style in the head
//! after a fixed dark baseline, the markup in the body, and the script last.
//! Backends that need isolation place that page in a sandboxed iframe via
//! [`PreviewDocument::host_page`].

use crate::Snippet;

/// Sandbox flags for the preview frame: scripts and modal dialogs run,
/// navigation and top-level access stay blocked.
pub const SANDBOX_FLAGS: &str = "allow-scripts allow-modals allow-same-origin";

/// Element id of the preview frame inside the host page.
pub const PREVIEW_FRAME_ID: &str = "preview";

/// Page background, also used when rasterizing screenshots.
pub const PREVIEW_BACKGROUND: &str = "#111827";

const BASELINE_STYLE: &str = r#"body {
  font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
  background-color: #111827;
  color: #d1d5db;
  display: flex;
  justify-content: center;
  align-items: center;
  min-height: 100vh;
  margin: 0;
  padding: 1rem;
  box-sizing: border-box;
}"#;

/// The standalone document for one snippet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewDocument {
    html: String,
}

impl PreviewDocument {
    pub fn from_snippet(snippet: &Snippet) -> Self {
        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{}\n{}\n</style>\n</head>\n<body>\n{}\n<script>{}</script>\n</body>\n</html>\n",
            BASELINE_STYLE, snippet.style, snippet.markup, snippet.script
        );
        Self { html }
    }

    pub fn as_html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// A page that embeds this document in a sandboxed, full-size iframe.
    pub fn host_page(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><style>html,body{{margin:0;height:100%;background:{bg};}}iframe{{border:0;width:100%;height:100%;display:block;}}</style></head>\n<body><iframe id=\"{id}\" title=\"Preview\" sandbox=\"{flags}\" srcdoc=\"{doc}\"></iframe></body>\n</html>\n",
            bg = PREVIEW_BACKGROUND,
            id = PREVIEW_FRAME_ID,
            flags = SANDBOX_FLAGS,
            doc = escape_attribute(&self.html)
        )
    }
}

impl From<&Snippet> for PreviewDocument {
    fn from(snippet: &Snippet) -> Self {
        Self::from_snippet(snippet)
    }
}

fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
