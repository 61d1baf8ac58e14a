//! Scripted doubles shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use snippet_studio::model::{GenerateRequest, TextStream};
use snippet_studio::surface::{jpeg_data_url, strip_data_url, RasterOptions};
use snippet_studio::{
    Error, ModelTransport, PreviewDocument, RenderSurface, Result, SessionGate, SessionKind, Snippet,
};

/// JSON body the model would stream for `snippet`.
pub fn payload(snippet: &Snippet, explanation: &str) -> String {
    serde_json::json!({
        "html": snippet.markup,
        "css": snippet.style,
        "js": snippet.script,
        "explanation": explanation,
    })
    .to_string()
}

/// Split `text` into chunks of `size` characters.
pub fn chunked(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

pub enum Reply {
    Stream(Vec<String>),
    /// The request itself fails
    Refuse(Error),
    /// Some chunks arrive, then the connection breaks
    Broken(Vec<String>, Error),
}

impl Reply {
    pub fn ok(snippet: &Snippet, explanation: &str) -> Self {
        Reply::Stream(chunked(&payload(snippet, explanation), 7))
    }

    pub fn raw(text: &str) -> Self {
        Reply::Stream(chunked(text, 5))
    }
}

/// Hands out one scripted reply per request and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn open_stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Stream(chunks)) => Ok(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Some(Reply::Refuse(err)) => Err(err),
            Some(Reply::Broken(chunks, err)) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::once(async move { Err(err) }))
                .boxed()),
            None => Err(Error::Transport("no scripted reply left".into())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LoadBehavior {
    Ready,
    Never,
    After(Duration),
}

struct SurfaceState {
    load: LoadBehavior,
    accessible: bool,
    presented: Vec<String>,
    presents: VecDeque<Result<()>>,
    rasters: VecDeque<Result<Vec<u8>>>,
    rasterize_calls: usize,
    loaded_at: Vec<Instant>,
    rasterized_at: Vec<Instant>,
    gate: Option<SessionGate>,
    holders: Vec<Option<SessionKind>>,
}

/// In-memory render surface. Clones share state, so a test can keep a handle
/// after boxing one into a studio.
#[derive(Clone)]
pub struct FakeSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl FakeSurface {
    pub fn new(load: LoadBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                load,
                accessible: true,
                presented: Vec::new(),
                presents: VecDeque::new(),
                rasters: VecDeque::new(),
                rasterize_calls: 0,
                loaded_at: Vec::new(),
                rasterized_at: Vec::new(),
                gate: None,
                holders: Vec::new(),
            })),
        }
    }

    pub fn ready() -> Self {
        Self::new(LoadBehavior::Ready)
    }

    pub fn set_accessible(&self, accessible: bool) {
        self.state.lock().unwrap().accessible = accessible;
    }

    /// Queue the result of the next rasterize call. Unscripted calls return
    /// `frame-<n>`, n counting from 1.
    pub fn push_raster(&self, result: Result<Vec<u8>>) {
        self.state.lock().unwrap().rasters.push_back(result);
    }

    /// Queue the result of the next present call. Unscripted calls succeed.
    pub fn push_present(&self, result: Result<()>) {
        self.state.lock().unwrap().presents.push_back(result);
    }

    /// Record who holds `gate` on every present call.
    pub fn watch_gate(&self, gate: SessionGate) {
        self.state.lock().unwrap().gate = Some(gate);
    }

    pub fn gate_holders(&self) -> Vec<Option<SessionKind>> {
        self.state.lock().unwrap().holders.clone()
    }

    /// Virtual instants at which each load wait finished
    pub fn loaded_at(&self) -> Vec<Instant> {
        self.state.lock().unwrap().loaded_at.clone()
    }

    /// Virtual instants of each rasterize call
    pub fn rasterized_at(&self) -> Vec<Instant> {
        self.state.lock().unwrap().rasterized_at.clone()
    }

    /// Documents successfully presented, oldest first
    pub fn presented(&self) -> Vec<String> {
        self.state.lock().unwrap().presented.clone()
    }

    pub fn rasterize_calls(&self) -> usize {
        self.state.lock().unwrap().rasterize_calls
    }
}

/// Base64 payload the loop records for unscripted rasterize call `n`.
pub fn frame_payload(n: usize) -> String {
    strip_data_url(&jpeg_data_url(format!("frame-{}", n).as_bytes())).unwrap()
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn present(&mut self, document: &PreviewDocument) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let holder = state.gate.as_ref().map(|g| g.current());
        if let Some(holder) = holder {
            state.holders.push(holder);
        }
        state.presents.pop_front().unwrap_or(Ok(()))?;
        state.presented.push(document.as_html().to_string());
        Ok(())
    }

    async fn wait_loaded(&mut self) -> Result<()> {
        let load = self.state.lock().unwrap().load;
        match load {
            LoadBehavior::Ready => {}
            LoadBehavior::Never => std::future::pending::<()>().await,
            LoadBehavior::After(delay) => tokio::time::sleep(delay).await,
        }
        self.state.lock().unwrap().loaded_at.push(Instant::now());
        Ok(())
    }

    async fn content_accessible(&mut self) -> bool {
        self.state.lock().unwrap().accessible
    }

    async fn rasterize(&mut self, _options: &RasterOptions) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.rasterize_calls += 1;
        state.rasterized_at.push(Instant::now());
        let n = state.rasterize_calls;
        state
            .rasters
            .pop_front()
            .unwrap_or_else(|| Ok(format!("frame-{}", n).into_bytes()))
    }
}
