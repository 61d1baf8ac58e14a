//! Chat transcript
//!
//! An ordered, append-only log of narration entries. Each entry carries an
//! explicit state so that at most one entry is ever the target of streamed
//! text:
//!
//! - `Pending`: transient progress narration, replaced rather than appended to
//! - `Streaming`: the active stream target, grows chunk by chunk
//! - `Final`: frozen
//!
//! Appending any entry freezes the current stream target. Display surfaces
//! subscribe with [`Transcript::with_observer`] and receive every mutation in
//! order.

use tokio::sync::mpsc;

/// Opening line shown before the first request.
pub const GREETING: &str =
    "Hello! I'm your AI frontend assistant. Describe a component you'd like me to build.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Streaming,
    Final,
}

/// Renderable body of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryContent {
    Text(String),
    /// "Auto-improving... (Step i/N)" spinner
    Progress { step: u8, total: u8 },
    /// The screenshot the model is about to inspect, base64 JPEG payload
    View {
        step: u8,
        total: u8,
        screenshot: String,
    },
}

impl EntryContent {
    pub fn text(s: impl Into<String>) -> Self {
        EntryContent::Text(s.into())
    }

    /// Plain-text rendering for terminal display.
    pub fn describe(&self) -> String {
        match self {
            EntryContent::Text(s) => s.clone(),
            EntryContent::Progress { step, total } => {
                format!("Auto-improving... (Step {}/{})", step, total)
            }
            EntryContent::View { step, total, .. } => format!(
                "Here's my current view (Step {}/{}). Analyzing for improvements...",
                step, total
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub author: Author,
    pub content: EntryContent,
    pub state: EntryState,
}

/// Mutation notifications, in the order they were applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Appended { index: usize, entry: Entry },
    Replaced { index: usize, entry: Entry },
    Chunk { index: usize, text: String },
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    observer: Option<mpsc::UnboundedSender<TranscriptEvent>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transcript that opens with the assistant greeting.
    pub fn greeting() -> Self {
        let mut t = Self::new();
        t.push(Author::Assistant, EntryContent::text(GREETING));
        t
    }

    /// Attach an observer channel and return its receiving end.
    pub fn with_observer(mut self) -> (Self, mpsc::UnboundedReceiver<TranscriptEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        (self, rx)
    }

    fn notify(&mut self, event: TranscriptEvent) {
        if let Some(tx) = &self.observer {
            if tx.send(event).is_err() {
                // receiver gone; stop notifying
                self.observer = None;
            }
        }
    }

    fn freeze_stream_target(&mut self) {
        if let Some(last) = self.entries.last_mut() {
            if last.state == EntryState::Streaming {
                last.state = EntryState::Final;
            }
        }
    }

    fn append(&mut self, entry: Entry) -> usize {
        self.freeze_stream_target();
        self.entries.push(entry.clone());
        let index = self.entries.len() - 1;
        self.notify(TranscriptEvent::Appended { index, entry });
        index
    }

    /// Append a final entry.
    pub fn push(&mut self, author: Author, content: EntryContent) -> usize {
        self.append(Entry {
            author,
            content,
            state: EntryState::Final,
        })
    }

    /// Append a transient assistant entry that the next step supersedes.
    pub fn push_pending(&mut self, content: EntryContent) -> usize {
        self.append(Entry {
            author: Author::Assistant,
            content,
            state: EntryState::Pending,
        })
    }

    /// Append an empty assistant entry and make it the stream target.
    pub fn begin_stream(&mut self) -> usize {
        self.append(Entry {
            author: Author::Assistant,
            content: EntryContent::Text(String::new()),
            state: EntryState::Streaming,
        })
    }

    /// Append `chunk` to the active stream target. Returns `false` and drops
    /// the chunk when no entry is streaming.
    pub fn append_chunk(&mut self, chunk: &str) -> bool {
        let index = match self.stream_target() {
            Some(i) => i,
            None => {
                log::debug!("dropping {} bytes of stream text with no target", chunk.len());
                return false;
            }
        };
        if let EntryContent::Text(s) = &mut self.entries[index].content {
            s.push_str(chunk);
        }
        self.notify(TranscriptEvent::Chunk {
            index,
            text: chunk.to_string(),
        });
        true
    }

    /// Freeze the active stream target, if any.
    pub fn finish_stream(&mut self) {
        self.freeze_stream_target();
    }

    /// Replace the most recent entry, or append when the transcript is empty.
    pub fn replace_last(&mut self, content: EntryContent, state: EntryState) -> usize {
        let Some(index) = self.entries.len().checked_sub(1) else {
            return self.append(Entry {
                author: Author::Assistant,
                content,
                state,
            });
        };
        let entry = Entry {
            author: Author::Assistant,
            content,
            state,
        };
        self.entries[index] = entry.clone();
        self.notify(TranscriptEvent::Replaced { index, entry });
        index
    }

    /// Index of the entry currently receiving streamed text.
    pub fn stream_target(&self) -> Option<usize> {
        // only the last entry can be streaming; anything appended after it freezes it
        match self.entries.last() {
            Some(e) if e.state == EntryState::Streaming => Some(self.entries.len() - 1),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
