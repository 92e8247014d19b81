//! Video stream lifecycle state.
//!
//! The session listens for transitions into `Playing` to (re)run setup, and
//! the sampling loop reads the current state on every tick.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// Camera not started yet.
    Idle,
    Playing,
    Paused,
    Ended,
}

/// Clone-safe handle to the shared stream state.
#[derive(Clone)]
pub struct StreamControl {
    tx: Arc<watch::Sender<StreamState>>,
}

impl Default for StreamControl {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StreamState::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> StreamState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.tx.subscribe()
    }

    /// Start or restart playback. Returns false if already playing.
    pub fn play(&self) -> bool {
        self.transition(|s| s != StreamState::Playing, StreamState::Playing)
    }

    /// Pause a playing stream.
    pub fn pause(&self) -> bool {
        self.transition(|s| s == StreamState::Playing, StreamState::Paused)
    }

    /// End the stream. The sampling loop is stopped until the next `play`.
    pub fn end(&self) -> bool {
        self.transition(|s| s != StreamState::Ended, StreamState::Ended)
    }

    fn transition(&self, allowed: impl Fn(StreamState) -> bool, next: StreamState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if allowed(*state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(state = ?next, "stream state changed");
        }
        changed
    }
}
