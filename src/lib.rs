//! Snippet Studio
//!
//! Turns natural-language descriptions into self-contained HTML/CSS/JS
//! component snippets and then refines them by letting a vision-capable model
//! look at screenshots of its own render.
//!
//! # Architecture
//!
//! - [`model::ModelClient`] streams structured responses from the remote model
//!   and surfaces the `explanation` field incrementally
//! - [`surface::RenderSurface`] hosts a snippet in an isolated, script-enabled
//!   preview and reports when it has loaded
//! - [`surface::ScreenshotCapturer`] turns a loaded preview into a JPEG
//! - [`improve::ImprovementLoop`] drives render, capture and refine for a
//!   bounded number of rounds
//! - [`studio::Studio`] owns the working snippet and the transcript, and guards
//!   both flows with a single [`session::SessionGate`]
//!
//! # Example
//!
//! ```no_run
//! use snippet_studio::{ModelConfig, StudioConfig};
//! use snippet_studio::studio::{Studio, SubmitOutcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StudioConfig {
//!     model: ModelConfig::from_env(),
//!     ..Default::default()
//! };
//! let mut studio = Studio::with_gemini(config)?;
//! if let SubmitOutcome::Generated { .. } = studio.submit("a red button").await {
//!     println!("{}", studio.snippet().markup);
//! }
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod error;
pub use error::{Error, Result, API_KEY_VAR};

pub mod document;
pub mod improve;
pub mod model;
pub mod session;
pub mod studio;
pub mod surface;
pub mod transcript;

// Headless Chrome render surface
#[cfg(feature = "cdp")]
pub mod cdp;

pub use document::PreviewDocument;
pub use improve::{ImprovementLoop, LoopState, SessionReport};
pub use model::{ModelClient, ModelTransport, Refinement};
pub use session::{SessionGate, SessionKind, SessionProgress, SessionToken};
pub use studio::{Studio, SubmitOutcome};
pub use surface::{RasterCapturer, RenderSurface, ScreenshotCapturer};
pub use transcript::{Author, Entry, EntryContent, EntryState, Transcript, TranscriptEvent};

/// A generated component: markup, styles and script.
///
/// All three parts are always present, possibly empty. A snippet is replaced
/// as a whole; nothing patches individual fields. The wire names follow the
/// response schema (`html`, `css`, `js`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    #[serde(rename = "html")]
    pub markup: String,
    #[serde(rename = "css")]
    pub style: String,
    #[serde(rename = "js")]
    pub script: String,
}

impl Snippet {
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    /// Content shown before anything has been generated.
    pub fn placeholder() -> Self {
        Self::new(
            "<!-- Your component will appear here -->",
            "/* ...along with its styles */",
            "// ...and any necessary JavaScript.",
        )
    }

    /// Short content hash, handy for logs and file names.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.markup, &self.style, &self.script] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(&hasher.finalize()[..6])
    }
}

/// One completed improvement round, kept for the rest of the session so the
/// model can avoid repeating itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRecord {
    pub explanation: String,
    /// Base64 JPEG payload, without a data-URL prefix
    pub screenshot: String,
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Number of improvement rounds per session, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct StepBudget(u8);

impl StepBudget {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(steps: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&steps) {
            Ok(Self(steps))
        } else {
            Err(Error::InvalidSetting(format!(
                "step count must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                steps
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for StepBudget {
    fn default() -> Self {
        Self(3)
    }
}

/// Remote model service configuration
///
/// ```
/// let cfg = snippet_studio::ModelConfig::default();
/// assert!(cfg.api_key.is_none());
/// assert_eq!(cfg.generation_model, "gemini-2.5-flash");
/// ```
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the generative language API
    pub endpoint: String,
    /// Model used for the initial, text-only generation
    pub generation_model: String,
    /// Multimodal model used for screenshot-driven refinement
    pub refinement_model: String,
    /// Service credential. `None` is reported as a configuration error on the
    /// first request.
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            generation_model: "gemini-2.5-flash".to_string(),
            refinement_model: "gemini-2.5-pro".to_string(),
            api_key: None,
        }
    }
}

impl ModelConfig {
    /// Defaults plus the credential from `API_KEY` (or `GEMINI_API_KEY`).
    /// Call once at startup.
    pub fn from_env() -> Self {
        let api_key = [API_KEY_VAR, "GEMINI_API_KEY"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());
        if api_key.is_none() {
            log::warn!("{} is not set; model requests will fail until it is", API_KEY_VAR);
        }
        Self {
            api_key,
            ..Default::default()
        }
    }
}

/// Timing of one improvement step
#[derive(Debug, Clone, Copy)]
pub struct ImproveConfig {
    /// How long to wait for the preview load signal
    pub load_timeout_ms: u64,
    /// Extra delay after load so late layout and paint can finish
    pub settle_delay_ms: u64,
}

impl Default for ImproveConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 5000,
            settle_delay_ms: 200,
        }
    }
}

/// User-adjustable controls
///
/// ```
/// let settings = snippet_studio::StudioSettings::default();
/// assert!(!settings.auto_improve);
/// assert_eq!(settings.steps.get(), 3);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StudioSettings {
    /// Start an improvement session after every successful generation
    pub auto_improve: bool,
    pub steps: StepBudget,
}

/// Top-level configuration for a [`studio::Studio`]
#[derive(Debug, Clone, Default)]
pub struct StudioConfig {
    pub model: ModelConfig,
    pub improve: ImproveConfig,
    pub viewport: Viewport,
    pub settings: StudioSettings,
}
