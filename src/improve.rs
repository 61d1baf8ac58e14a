//! The screenshot-driven improvement loop
//!
//! One session runs up to N steps. Every step renders the working snippet,
//! waits for the preview to load, captures it, asks the refinement model for a
//! single fix and applies the returned snippet. The first failure ends the
//! session; snippets applied by earlier steps stay in place.
//!
//! A loop only runs under a [`SessionToken`], so it cannot bypass the gate.

use std::time::Duration;

use crate::document::PreviewDocument;
use crate::model::ModelClient;
use crate::session::{SessionProgress, SessionToken};
use crate::surface::{strip_data_url, RenderSurface, ScreenshotCapturer};
use crate::transcript::{Author, EntryContent, EntryState, Transcript};
use crate::{Error, ImproveConfig, Result, RoundRecord, Snippet, StepBudget};

const NO_SURFACE: &str = "Render surface is not available for screenshot.";
const CONTENT_INACCESSIBLE: &str = "Cannot access the preview's content for screenshot.";
const RENDER_FAILED: &str = "Could not render the preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running { step: u8, of: u8 },
    Completed,
    /// Ended early; `step` is the step that failed
    Failed { step: u8 },
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Completed | LoopState::Failed { .. })
    }
}

/// Outcome of one improvement session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: LoopState,
    pub planned: u8,
    pub completed: u8,
    /// Rounds applied during this session, oldest first
    pub history: Vec<RoundRecord>,
}

pub fn summary_line(completed: u8, planned: u8) -> String {
    format!(
        "Auto-improvement complete! I made {} of {} planned enhancements.",
        completed, planned
    )
}

/// Borrows everything a session mutates for the duration of one run.
pub struct ImprovementLoop<'a> {
    token: &'a SessionToken,
    client: &'a ModelClient,
    capturer: &'a dyn ScreenshotCapturer,
    surface: Option<&'a mut (dyn RenderSurface + 'static)>,
    snippet: &'a mut Snippet,
    transcript: &'a mut Transcript,
    config: ImproveConfig,
    state: LoopState,
    progress: SessionProgress,
    history: Vec<RoundRecord>,
}

impl<'a> ImprovementLoop<'a> {
    pub fn new(
        token: &'a SessionToken,
        client: &'a ModelClient,
        capturer: &'a dyn ScreenshotCapturer,
        surface: Option<&'a mut (dyn RenderSurface + 'static)>,
        snippet: &'a mut Snippet,
        transcript: &'a mut Transcript,
        config: ImproveConfig,
    ) -> Self {
        Self {
            token,
            client,
            capturer,
            surface,
            snippet,
            transcript,
            config,
            state: LoopState::Idle,
            progress: SessionProgress::default(),
            history: Vec::new(),
        }
    }

    /// Run one session of up to `budget` steps and close it with the summary
    /// narration.
    pub async fn run(mut self, budget: StepBudget) -> SessionReport {
        let total = budget.get();
        self.progress = SessionProgress::start(total);
        self.history.clear();
        log::info!(
            "improvement session started under {}: {} steps on snippet {}",
            self.token.kind(),
            total,
            self.snippet.fingerprint()
        );

        for step in 1..=total {
            self.state = LoopState::Running { step, of: total };
            self.progress.current = step;

            match self.step(step, total).await {
                Ok(()) => {
                    self.progress.completed += 1;
                    log::info!("step {}/{} applied, snippet {}", step, total, self.snippet.fingerprint());
                }
                Err(e) => {
                    log::warn!("improvement step {}/{} failed: {}", step, total, e);
                    self.transcript.replace_last(
                        EntryContent::Text(format!(
                            "Sorry, an error occurred during improvement step {}: {}",
                            step, e
                        )),
                        EntryState::Final,
                    );
                    self.state = LoopState::Failed { step };
                    break;
                }
            }
        }

        if !self.state.is_terminal() {
            self.state = LoopState::Completed;
            // the last applied snippet has not been shown yet
            if let Some(surface) = self.surface.as_deref_mut() {
                if let Err(e) = render(&mut *surface, &*self.snippet).await {
                    log::warn!("failed to show refined snippet: {}", e);
                }
            }
        }
        self.transcript.push(
            Author::Assistant,
            EntryContent::Text(summary_line(self.progress.completed, total)),
        );
        log::info!(
            "improvement session ended {:?} after {} of {} steps",
            self.state,
            self.progress.completed,
            total
        );

        SessionReport {
            state: self.state,
            planned: total,
            completed: self.progress.completed,
            history: self.history,
        }
    }

    async fn step(&mut self, step: u8, total: u8) -> Result<()> {
        self.transcript.push_pending(EntryContent::Progress { step, total });

        let surface = self
            .surface
            .as_deref_mut()
            .ok_or_else(|| Error::Environment(NO_SURFACE.to_string()))?;

        // the capture must show the code that goes out with it
        render(&mut *surface, &*self.snippet).await?;

        let bound = Duration::from_millis(self.config.load_timeout_ms);
        match tokio::time::timeout(bound, surface.wait_loaded()).await {
            Ok(loaded) => loaded?,
            Err(_) => return Err(Error::RenderTimeout(self.config.load_timeout_ms)),
        }
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        if !surface.content_accessible().await {
            return Err(Error::Environment(CONTENT_INACCESSIBLE.to_string()));
        }

        let data_url = self.capturer.capture(&mut *surface).await?;
        let screenshot = strip_data_url(&data_url)?;
        log::debug!("step {} captured {} base64 bytes", step, screenshot.len());

        self.transcript.replace_last(
            EntryContent::View {
                step,
                total,
                screenshot: screenshot.clone(),
            },
            EntryState::Final,
        );
        self.transcript.begin_stream();

        let transcript = &mut *self.transcript;
        let refinement = self
            .client
            .refine(&*self.snippet, &screenshot, &self.history, |chunk| {
                transcript.append_chunk(chunk);
            })
            .await?;
        self.transcript.finish_stream();

        // Apply as a unit
        *self.snippet = refinement.snippet;
        self.history.push(RoundRecord {
            explanation: refinement.explanation,
            screenshot,
        });
        Ok(())
    }
}

async fn render(surface: &mut dyn RenderSurface, snippet: &Snippet) -> Result<()> {
    surface
        .present(&PreviewDocument::from_snippet(snippet))
        .await
        .map_err(|e| match e {
            Error::Environment(_) => e,
            other => Error::Environment(format!("{}: {}", RENDER_FAILED, other)),
        })
}
