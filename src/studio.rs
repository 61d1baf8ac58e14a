//! The orchestrator
//!
//! [`Studio`] owns the working snippet, the transcript, the user settings and
//! the session gate. Initial generation and improvement sessions both run
//! through it, so every exit path of either flow goes through the same gate
//! and the same error narration.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::document::PreviewDocument;
use crate::improve::{ImprovementLoop, SessionReport};
use crate::model::{ModelClient, ModelTransport};
use crate::session::{SessionGate, SessionKind, SessionToken};
use crate::surface::{RasterCapturer, RenderSurface, ScreenshotCapturer};
use crate::transcript::{Author, EntryContent, EntryState, Transcript, TranscriptEvent};
use crate::{Error, ImproveConfig, Result, Snippet, StepBudget, StudioConfig, StudioSettings};

/// How a prompt submission ended. Submissions never return an error; failures
/// have already been narrated in the transcript.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Another flow holds the session; nothing was recorded
    Rejected { busy: SessionKind },
    /// The snippet was replaced. Carries the report of the improvement
    /// session that followed, when auto-improve is on.
    Generated { improvement: Option<SessionReport> },
    Failed(Error),
}

pub struct Studio {
    client: ModelClient,
    capturer: Box<dyn ScreenshotCapturer>,
    surface: Option<Box<dyn RenderSurface>>,
    snippet: Snippet,
    transcript: Transcript,
    settings: StudioSettings,
    improve: ImproveConfig,
    gate: SessionGate,
    /// Fingerprint of the snippet last handed to the surface
    presented: Option<String>,
}

impl Studio {
    pub fn new(transport: Arc<dyn ModelTransport>, config: StudioConfig) -> Self {
        Self {
            client: ModelClient::new(transport, &config.model),
            capturer: Box::new(RasterCapturer::new()),
            surface: None,
            snippet: Snippet::placeholder(),
            transcript: Transcript::greeting(),
            settings: config.settings,
            improve: config.improve,
            gate: SessionGate::new(),
            presented: None,
        }
    }

    /// Studio backed by the Gemini API.
    #[cfg(feature = "gemini")]
    pub fn with_gemini(config: StudioConfig) -> Result<Self> {
        let transport = crate::model::GeminiTransport::new(&config.model)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn with_capturer(mut self, capturer: Box<dyn ScreenshotCapturer>) -> Self {
        self.capturer = capturer;
        self
    }

    /// Attach the preview. The working snippet is presented on the next flow.
    pub fn attach_surface(&mut self, surface: Box<dyn RenderSurface>) {
        self.surface = Some(surface);
        self.presented = None;
    }

    pub fn detach_surface(&mut self) -> Option<Box<dyn RenderSurface>> {
        self.presented = None;
        self.surface.take()
    }

    /// Route every transcript mutation to the returned channel.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TranscriptEvent> {
        let (transcript, rx) = std::mem::take(&mut self.transcript).with_observer();
        self.transcript = transcript;
        rx
    }

    pub fn set_auto_improve(&mut self, enabled: bool) {
        self.settings.auto_improve = enabled;
    }

    pub fn set_steps(&mut self, steps: u8) -> Result<()> {
        self.settings.steps = StepBudget::new(steps)?;
        Ok(())
    }

    pub fn settings(&self) -> StudioSettings {
        self.settings
    }

    pub fn snippet(&self) -> &Snippet {
        &self.snippet
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Handle to the busy state, for display surfaces that disable their
    /// controls while a flow runs.
    pub fn gate(&self) -> SessionGate {
        self.gate.clone()
    }

    /// Replace the working snippet outside of any flow, e.g. with one saved
    /// earlier.
    pub async fn load_snippet(&mut self, snippet: Snippet) -> Result<()> {
        let _token = self.gate.try_acquire(SessionKind::Loading)?;
        self.snippet = snippet;
        self.sync_surface().await;
        Ok(())
    }

    /// Generate a new snippet from `prompt`, then run an improvement session
    /// on it if auto-improve is on.
    pub async fn submit(&mut self, prompt: &str) -> SubmitOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return SubmitOutcome::Failed(Error::InvalidSetting("prompt is empty".into()));
        }
        let mut token = match self.gate.try_acquire(SessionKind::Generating) {
            Ok(token) => token,
            Err(Error::Busy(busy)) => {
                log::info!("prompt rejected, {} in progress", busy);
                return SubmitOutcome::Rejected { busy };
            }
            Err(e) => return SubmitOutcome::Failed(e),
        };

        self.transcript.push(Author::User, EntryContent::text(prompt));
        self.transcript.begin_stream();

        let transcript = &mut self.transcript;
        let generated = self
            .client
            .generate(prompt, |chunk| {
                transcript.append_chunk(chunk);
            })
            .await;

        let snippet = match generated {
            Ok(snippet) => snippet,
            Err(e) => {
                log::error!("generation failed: {}", e);
                self.transcript
                    .replace_last(EntryContent::text(e.user_message()), EntryState::Final);
                return SubmitOutcome::Failed(e);
            }
        };

        self.transcript.finish_stream();
        self.snippet = snippet;
        log::info!("generated snippet {}", self.snippet.fingerprint());
        self.sync_surface().await;

        let improvement = if self.settings.auto_improve {
            token.hand_off(SessionKind::Improving);
            Some(self.run_session(&token).await)
        } else {
            None
        };
        SubmitOutcome::Generated { improvement }
    }

    /// Run an improvement session on the working snippet. Fails only when the
    /// session cannot start; step failures end up in the report.
    pub async fn improve(&mut self) -> Result<SessionReport> {
        let token = self.gate.try_acquire(SessionKind::Improving)?;
        Ok(self.run_session(&token).await)
    }

    async fn run_session(&mut self, token: &SessionToken) -> SessionReport {
        let report = ImprovementLoop::new(
            token,
            &self.client,
            &*self.capturer,
            self.surface.as_deref_mut(),
            &mut self.snippet,
            &mut self.transcript,
            self.improve,
        )
        .run(self.settings.steps)
        .await;

        // the loop renders on its own terms
        self.presented = None;
        report
    }

    /// Show the working snippet. Display only: a failure here is logged, and
    /// an improvement step renders again before it captures anything.
    async fn sync_surface(&mut self) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let fingerprint = self.snippet.fingerprint();
        if self.presented.as_deref() == Some(fingerprint.as_str()) {
            return;
        }
        match surface.present(&PreviewDocument::from_snippet(&self.snippet)).await {
            Ok(()) => self.presented = Some(fingerprint),
            Err(e) => log::warn!("failed to present snippet {}: {}", fingerprint, e),
        }
    }
}
