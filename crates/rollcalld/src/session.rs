//! Attendance session orchestration.
//!
//! A session owns the roster, the attendance tracker and the sampling loop.
//! Every time the stream enters `Playing` it re-enrolls the roster and
//! restarts the loop; `Ended` stops the loop. Tracker state lives for the
//! whole process so a final report can always be written.

use crate::engine::{EngineError, RecognitionEngine};
use crate::sampler::{MarkEvent, Overlay, Sampler, SamplerContext, SamplerStats};
use crate::stream::{StreamControl, StreamState};
use rollcall_core::report::{self, ReportError};
use rollcall_core::{AttendanceTracker, EnrollError, GalleryMatcher, Roster};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    Initializing,
    LoadingModels,
    StartingCamera,
    WaitingForStream,
    LearningFaces,
    Ready { learned: usize, excluded: usize },
    Stopped,
    SetupFailed { error: String },
    NoIdentitiesLearned,
}

impl SessionPhase {
    /// User-facing status line.
    pub fn message(&self) -> &'static str {
        match self {
            SessionPhase::Initializing => "Initializing Webcam...",
            SessionPhase::LoadingModels => "Loading AI Models...",
            SessionPhase::StartingCamera => "Starting Webcam...",
            SessionPhase::WaitingForStream => "Waiting for video...",
            SessionPhase::LearningFaces => "Learning Student Faces...",
            SessionPhase::Ready { .. } => "Ready!",
            SessionPhase::Stopped => "Stopped.",
            SessionPhase::SetupFailed { .. } => "Error: Could not load models or start webcam.",
            SessionPhase::NoIdentitiesLearned => "Error: No student faces learned.",
        }
    }

    /// Terminal phases never start a sampling loop again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::SetupFailed { .. } | SessionPhase::NoIdentitiesLearned
        )
    }
}

#[derive(Error, Debug)]
pub enum SetupFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
}

impl SetupFailure {
    fn phase(&self) -> SessionPhase {
        match self {
            SetupFailure::Engine(e) => SessionPhase::SetupFailed {
                error: e.to_string(),
            },
            SetupFailure::Enroll(EnrollError::NoIdentitiesLearned) => {
                SessionPhase::NoIdentitiesLearned
            }
        }
    }
}

/// State readable from the D-Bus surface while the session runs.
pub struct SessionShared {
    pub roster: Arc<Roster>,
    pub tracker: Arc<AttendanceTracker>,
    pub stream: StreamControl,
    pub stats: Arc<SamplerStats>,
    pub report_dir: PathBuf,
    phase: watch::Sender<SessionPhase>,
    overlay: Arc<watch::Sender<Overlay>>,
}

impl SessionShared {
    pub fn new(roster: Roster, report_dir: PathBuf) -> Self {
        let tracker = AttendanceTracker::new(&roster);
        let (phase, _) = watch::channel(SessionPhase::Initializing);
        let (overlay, _) = watch::channel(Overlay::default());
        Self {
            roster: Arc::new(roster),
            tracker: Arc::new(tracker),
            stream: StreamControl::new(),
            stats: Arc::new(SamplerStats::default()),
            report_dir,
            phase,
            overlay: Arc::new(overlay),
        }
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        match &phase {
            SessionPhase::SetupFailed { error } => {
                tracing::error!(error = %error, "{}", phase.message())
            }
            SessionPhase::NoIdentitiesLearned => tracing::error!("{}", phase.message()),
            _ => tracing::info!(phase = ?phase, "{}", phase.message()),
        }
        self.phase.send_replace(phase);
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn overlay(&self) -> Overlay {
        self.overlay.borrow().clone()
    }

    pub fn status(&self) -> serde_json::Value {
        let phase = self.phase();
        let snapshot = self.tracker.snapshot();
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "phase": phase,
            "message": phase.message(),
            "stream": self.stream.state(),
            "present": snapshot.present_count(),
            "total": snapshot.entries.len(),
            "tracker_version": snapshot.version,
            "sampling": self.stats.snapshot(),
        })
    }

    pub fn export_csv(&self) -> Result<String, ReportError> {
        report::render_csv(&self.tracker.snapshot())
    }

    pub fn save_report(&self) -> Result<PathBuf, ReportError> {
        report::save_report(&self.report_dir, &self.export_csv()?)
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub threshold: f32,
    /// Overlay size; `None` uses the engine's frame size.
    pub display: Option<(u32, u32)>,
    pub interval: Duration,
}

pub struct Session<E> {
    engine: Arc<E>,
    shared: Arc<SessionShared>,
    settings: SessionSettings,
    sampler: Sampler,
    marks: Option<mpsc::UnboundedSender<MarkEvent>>,
}

impl<E: RecognitionEngine> Session<E> {
    pub fn new(engine: Arc<E>, shared: Arc<SessionShared>, settings: SessionSettings) -> Self {
        let sampler = Sampler::new(settings.interval);
        Self {
            engine,
            shared,
            settings,
            sampler,
            marks: None,
        }
    }

    /// Forward absent-to-present transitions to `tx`.
    pub fn with_marks(mut self, tx: mpsc::UnboundedSender<MarkEvent>) -> Self {
        self.marks = Some(tx);
        self
    }

    /// Re-enroll the roster and (re)start the sampling loop.
    ///
    /// The previous loop keeps running during enrollment and is replaced
    /// once the new gallery is ready. On failure no loop is left running.
    pub async fn on_play(&mut self) -> Result<(), SetupFailure> {
        self.shared.set_phase(SessionPhase::LearningFaces);

        let enrollment = match self.engine.enroll(Arc::clone(&self.shared.roster)).await {
            Ok(enrollment) => enrollment,
            Err(e) => {
                self.sampler.stop().await;
                return Err(e.into());
            }
        };

        for excluded in &enrollment.excluded {
            tracing::warn!(name = %excluded.name, reason = %excluded.reason, "identity excluded");
        }
        let excluded = enrollment.excluded.len();

        let gallery = match enrollment.into_gallery() {
            Ok(gallery) => gallery,
            Err(e) => {
                self.sampler.stop().await;
                return Err(e.into());
            }
        };
        let learned = gallery.len();

        let display = self.settings.display.or_else(|| self.engine.frame_size());
        let ctx = SamplerContext {
            engine: Arc::clone(&self.engine),
            matcher: Arc::new(GalleryMatcher::euclidean(gallery, self.settings.threshold)),
            tracker: Arc::clone(&self.shared.tracker),
            stream: self.shared.stream.clone(),
            display,
            overlay: Arc::clone(&self.shared.overlay),
            marks: self.marks.clone(),
            stats: Arc::clone(&self.shared.stats),
        };
        self.sampler.start(ctx).await;

        self.shared
            .set_phase(SessionPhase::Ready { learned, excluded });
        Ok(())
    }

    /// Follow stream transitions until `shutdown` resolves, then tear down.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut states = self.shared.stream.subscribe();
        let mut current = *states.borrow_and_update();

        loop {
            match current {
                StreamState::Playing => {
                    let outcome = tokio::select! {
                        result = self.on_play() => PlayOutcome::Finished(result),
                        _ = &mut shutdown => PlayOutcome::Shutdown,
                        changed = states.changed() => PlayOutcome::Superseded(changed.is_ok()),
                    };
                    match outcome {
                        PlayOutcome::Finished(Ok(())) => {}
                        PlayOutcome::Finished(Err(e)) => {
                            self.shared.set_phase(e.phase());
                            break;
                        }
                        PlayOutcome::Shutdown => {
                            tracing::info!("shutdown requested during enrollment");
                            self.teardown().await;
                            return;
                        }
                        PlayOutcome::Superseded(true) => {
                            current = *states.borrow_and_update();
                            tracing::info!(state = ?current, "enrollment superseded by stream change");
                            continue;
                        }
                        PlayOutcome::Superseded(false) => break,
                    }
                }
                StreamState::Ended => {
                    self.sampler.stop().await;
                    self.shared.set_phase(SessionPhase::Stopped);
                }
                StreamState::Idle => self.shared.set_phase(SessionPhase::WaitingForStream),
                StreamState::Paused => {}
            }

            tokio::select! {
                _ = &mut shutdown => {
                    self.teardown().await;
                    return;
                }
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    current = *states.borrow_and_update();
                }
            }
        }

        // Terminal: listener detached, nothing left to do until shutdown.
        drop(states);
        shutdown.await;
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if self.sampler.is_running() {
            self.sampler.stop().await;
        }
        if !self.shared.phase().is_terminal() {
            self.shared.set_phase(SessionPhase::Stopped);
        }
        tracing::info!(
            present = self.shared.tracker.snapshot().present_count(),
            "session torn down"
        );
    }
}

enum PlayOutcome {
    Finished(Result<(), SetupFailure>),
    Shutdown,
    /// A newer stream state arrived; `false` if the stream control is gone.
    Superseded(bool),
}
