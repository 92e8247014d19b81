//! Periodic sampling loop.
//!
//! Each tick captures the current frame through the engine, matches every
//! detected face against the gallery and forwards the results to the
//! attendance tracker. Detection is awaited inline, so a slow pass delays
//! the next tick instead of overlapping it; missed ticks are skipped.

use crate::engine::{FrameDetections, RecognitionEngine};
use crate::stream::{StreamControl, StreamState};
use chrono::{DateTime, Local};
use rollcall_core::{AttendanceTracker, BoundingBox, GalleryMatcher, Transition};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// One labeled box in display coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// `"<label> (<distance>)"`.
    pub label: String,
}

/// Boxes from the most recent processed tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Overlay {
    pub tick: u64,
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<OverlayBox>,
}

/// Emitted once per absent-to-present transition.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkEvent {
    pub name: String,
    pub at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct SamplerStats {
    processed: AtomicU64,
    idle: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplerCounters {
    pub processed: u64,
    pub idle: u64,
    pub failed: u64,
}

impl SamplerStats {
    pub fn snapshot(&self) -> SamplerCounters {
        SamplerCounters {
            processed: self.processed.load(Ordering::Relaxed),
            idle: self.idle.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything one loop instance reads and writes.
pub struct SamplerContext<E> {
    pub engine: Arc<E>,
    pub matcher: Arc<GalleryMatcher>,
    pub tracker: Arc<AttendanceTracker>,
    pub stream: StreamControl,
    /// Overlay coordinate space; `None` keeps frame coordinates.
    pub display: Option<(u32, u32)>,
    pub overlay: Arc<watch::Sender<Overlay>>,
    pub marks: Option<mpsc::UnboundedSender<MarkEvent>>,
    pub stats: Arc<SamplerStats>,
}

struct Running {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Owner of at most one running sampling loop.
pub struct Sampler {
    interval: Duration,
    running: Option<Running>,
}

impl Sampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Start a new loop, stopping any previous one first.
    pub async fn start<E: RecognitionEngine>(&mut self, ctx: SamplerContext<E>) {
        self.stop().await;

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(sample_loop(ctx, self.interval, Arc::clone(&shutdown)));
        self.running = Some(Running { shutdown, handle });

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "sampling loop started");
    }

    /// Stop the loop and wait for it to exit. No tick runs after this returns.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.notify_one();
        match running.handle.await {
            Ok(()) => tracing::info!("sampling loop stopped"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!(error = %e, "sampling loop panicked"),
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
        }
    }
}

async fn sample_loop<E: RecognitionEngine>(
    ctx: SamplerContext<E>,
    period: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }

        if ctx.stream.state() != StreamState::Playing {
            ctx.stats.idle.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let detected = tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            result = ctx.engine.detect() => result,
        };

        match detected {
            Ok(frame) => {
                let tick = ctx.stats.processed.fetch_add(1, Ordering::Relaxed) + 1;
                let overlay = process_frame(&ctx, tick, frame);
                ctx.overlay.send_replace(overlay);
            }
            Err(e) => {
                ctx.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "sampling tick failed");
            }
        }
    }
}

/// Match every detection in arrival order and apply it to the tracker.
fn process_frame<E>(ctx: &SamplerContext<E>, tick: u64, frame: FrameDetections) -> Overlay {
    let source = (frame.width, frame.height);
    let (width, height) = ctx.display.unwrap_or(source);

    let mut boxes = Vec::with_capacity(frame.detections.len());
    for detection in frame.detections {
        let result = ctx.matcher.find_best_match(&detection.embedding);

        if let Transition::Marked(at) = ctx.tracker.apply(&result) {
            let name = result.identity().unwrap_or_default().to_string();
            tracing::debug!(name = %name, distance = result.distance, "match produced a present mark");
            if let Some(marks) = &ctx.marks {
                let _ = marks.send(MarkEvent { name, at });
            }
        }

        boxes.push(OverlayBox {
            bbox: detection.bbox.rescale(source, (width, height)),
            label: result.to_string(),
        });
    }

    tracing::trace!(tick, faces = boxes.len(), "tick processed");

    Overlay {
        tick,
        width,
        height,
        boxes,
    }
}
