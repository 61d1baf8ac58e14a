//! Single-flight session ownership
//!
//! Initial generation and the improvement loop both mutate the working
//! snippet and drive the render surface, so only one of them may run at a
//! time. A flow acquires a [`SessionToken`] from the shared [`SessionGate`]
//! when it starts; the token releases the gate when dropped, on every exit
//! path.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result};

/// Which flow currently owns the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Initial generation request is streaming
    Generating,
    /// An improvement session is running
    Improving,
    /// A saved snippet is replacing the working one
    Loading,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Generating => f.write_str("generation"),
            SessionKind::Improving => f.write_str("auto-improvement"),
            SessionKind::Loading => f.write_str("snippet loading"),
        }
    }
}

/// Shared busy state. Cloning yields another handle to the same gate, so a
/// display surface can keep one to disable its controls.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    active: Arc<Mutex<Option<SessionKind>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<SessionKind>> {
        // The slot holds a plain enum, a poisoned lock still has a valid value.
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Acquire the gate for `kind`, or fail with [`Error::Busy`] naming the
    /// flow that holds it.
    pub fn try_acquire(&self, kind: SessionKind) -> Result<SessionToken> {
        let mut slot = self.slot();
        if let Some(current) = *slot {
            return Err(Error::Busy(current));
        }
        *slot = Some(kind);
        log::debug!("session acquired for {}", kind);
        Ok(SessionToken {
            gate: self.clone(),
            kind,
        })
    }

    /// The flow holding the gate, if any.
    pub fn current(&self) -> Option<SessionKind> {
        *self.slot()
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }
}

/// Proof of session ownership. Dropping it frees the gate.
#[derive(Debug)]
pub struct SessionToken {
    gate: SessionGate,
    kind: SessionKind,
}

impl SessionToken {
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Pass ownership to another flow without releasing the gate in between.
    pub fn hand_off(&mut self, kind: SessionKind) {
        *self.gate.slot() = Some(kind);
        log::debug!("session handed from {} to {}", self.kind, kind);
        self.kind = kind;
    }
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        *self.gate.slot() = None;
        log::debug!("session released by {}", self.kind);
    }
}

/// Counters for one improvement session. Reset at the start of every session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionProgress {
    /// Requested step budget
    pub planned: u8,
    /// Steps whose result was applied
    pub completed: u8,
    /// 1-based index of the step in flight, 0 before the first step
    pub current: u8,
}

impl SessionProgress {
    pub fn start(planned: u8) -> Self {
        Self {
            planned,
            completed: 0,
            current: 0,
        }
    }
}
