//! Headless Chrome render surface
//!
//! `headless_chrome` is blocking, so a dedicated worker thread owns the
//! browser and its tab and executes commands sent from async callers. Each
//! command carries a oneshot channel for its reply.
//!
//! Every presented document is wrapped in a host page whose sandboxed
//! `<iframe id="preview">` holds the snippet. The load signal is the frame
//! document reaching `readyState == "complete"`, and screenshots are taken of
//! the frame element only.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use tokio::sync::oneshot;

use crate::document::{PreviewDocument, PREVIEW_FRAME_ID};
use crate::surface::{ImageFormat, RasterOptions, RenderSurface};
use crate::{Error, ImproveConfig, Result, Viewport};

const FRAME_READY_JS: &str = r#"(function(){
    try {
        var f = document.getElementById('preview');
        return !!(f && f.contentDocument && f.contentDocument.readyState === 'complete');
    } catch (e) { return false; }
})()"#;

const FRAME_ACCESSIBLE_JS: &str = r#"(function(){
    try {
        var f = document.getElementById('preview');
        return !!(f && f.contentDocument && f.contentDocument.body);
    } catch (e) { return false; }
})()"#;

/// Chrome surface configuration
///
/// ```
/// let cfg = snippet_studio::cdp::CdpConfig::default();
/// assert_eq!(cfg.viewport.width, 1280);
/// assert!(cfg.max_wait_ms > cfg.poll_interval_ms);
/// ```
#[derive(Debug, Clone)]
pub struct CdpConfig {
    pub viewport: Viewport,
    /// How often the worker checks the frame's ready state
    pub poll_interval_ms: u64,
    /// Upper bound the worker itself spends on one load wait. The wait also
    /// ends as soon as the caller stops listening for the reply.
    pub max_wait_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            poll_interval_ms: 50,
            max_wait_ms: ImproveConfig::default().load_timeout_ms,
        }
    }
}

enum Command {
    Present(String, oneshot::Sender<Result<()>>),
    WaitLoaded(oneshot::Sender<Result<()>>),
    Accessible(oneshot::Sender<bool>),
    Rasterize(RasterOptions, oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<()>),
}

/// Owns the browser on the worker thread
struct Worker {
    _browser: Browser,
    tab: Arc<Tab>,
    config: CdpConfig,
}

impl Worker {
    fn launch(config: CdpConfig) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .build()
            .map_err(|e| Error::Environment(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::Environment(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::Environment(format!("Failed to create tab: {}", e)))?;

        Ok(Self {
            _browser: browser,
            tab,
            config,
        })
    }

    fn present(&self, host_page: &str) -> Result<()> {
        let url = format!(
            "data:text/html;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(host_page)
        );
        self.tab
            .navigate_to(&url)
            .map_err(|e| Error::Environment(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Environment(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }

    fn wait_loaded(&self, abandoned: impl Fn() -> bool) -> Result<()> {
        poll_until_ready(
            Duration::from_millis(self.config.poll_interval_ms),
            Duration::from_millis(self.config.max_wait_ms),
            abandoned,
            || self.eval_bool(FRAME_READY_JS),
        )
    }

    fn eval_bool(&self, script: &str) -> Result<bool> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::Environment(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn rasterize(&self, options: &RasterOptions) -> Result<Vec<u8>> {
        let paint = format!(
            "document.body.style.background = {};",
            serde_json::Value::from(options.background.as_str())
        );
        self.tab
            .evaluate(&paint, false)
            .map_err(|e| Error::Capture(format!("Failed to set background: {}", e)))?;

        let format = match options.format {
            ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
            ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
        };
        let frame = self
            .tab
            .find_element(&format!("#{}", PREVIEW_FRAME_ID))
            .map_err(|e| Error::Capture(format!("Preview frame not found: {}", e)))?;
        frame
            .capture_screenshot(format)
            .map_err(|e| Error::Capture(format!("Screenshot failed: {}", e)))
    }
}

/// Poll `ready` until it holds. Gives up at `max_wait`, or early once
/// `abandoned` reports that nobody waits for the answer any more, so a
/// timed-out wait does not hold up the commands queued behind it.
fn poll_until_ready(
    interval: Duration,
    max_wait: Duration,
    abandoned: impl Fn() -> bool,
    mut ready: impl FnMut() -> Result<bool>,
) -> Result<()> {
    let deadline = Instant::now() + max_wait;
    loop {
        if ready()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::RenderTimeout(max_wait.as_millis() as u64));
        }
        if abandoned() {
            log::debug!("load wait abandoned by caller");
            return Err(Error::Environment("Load wait abandoned".into()));
        }
        thread::sleep(interval);
    }
}

/// Render surface backed by a headless Chrome tab on a worker thread.
pub struct CdpSurface {
    cmd_tx: Sender<Command>,
}

impl CdpSurface {
    /// Launch Chrome on a new worker thread and wait until it is ready.
    pub async fn launch(config: CdpConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let worker = match Worker::launch(config) {
                Ok(w) => w,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Present(page, resp) => {
                        let _ = resp.send(worker.present(&page));
                    }
                    Command::WaitLoaded(resp) => {
                        let result = worker.wait_loaded(|| resp.is_closed());
                        let _ = resp.send(result);
                    }
                    Command::Accessible(resp) => {
                        let accessible = worker.eval_bool(FRAME_ACCESSIBLE_JS).unwrap_or_else(|e| {
                            log::warn!("accessibility probe failed: {}", e);
                            false
                        });
                        let _ = resp.send(accessible);
                    }
                    Command::Rasterize(options, resp) => {
                        let _ = resp.send(worker.rasterize(&options));
                    }
                    Command::Close(resp) => {
                        drop(worker);
                        let _ = resp.send(());
                        return;
                    }
                }
            }
            log::debug!("preview worker exiting, all handles dropped");
        });

        init_rx
            .await
            .map_err(|e| Error::Environment(format!("Worker init canceled: {}", e)))??;
        log::info!("headless Chrome preview surface ready");

        Ok(Self { cmd_tx })
    }

    async fn request<T>(&self, what: &str, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::Environment("Preview browser has shut down".into()))?;
        rx.await
            .map_err(|e| Error::Environment(format!("{} canceled: {}", what, e)))
    }

    /// Shut down the worker and the browser.
    pub async fn close(self) -> Result<()> {
        self.request("Close", Command::Close).await
    }
}

#[async_trait]
impl RenderSurface for CdpSurface {
    async fn present(&mut self, document: &PreviewDocument) -> Result<()> {
        let page = document.host_page();
        self.request("Present", |tx| Command::Present(page, tx)).await?
    }

    async fn wait_loaded(&mut self) -> Result<()> {
        self.request("WaitLoaded", Command::WaitLoaded).await?
    }

    async fn content_accessible(&mut self) -> bool {
        self.request("Accessible", Command::Accessible)
            .await
            .unwrap_or(false)
    }

    async fn rasterize(&mut self, options: &RasterOptions) -> Result<Vec<u8>> {
        let options = options.clone();
        self.request("Rasterize", |tx| Command::Rasterize(options, tx))
            .await?
    }
}
