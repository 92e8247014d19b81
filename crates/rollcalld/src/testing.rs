//! Scripted engine and fixtures shared by the daemon tests.

use crate::engine::{EngineError, FrameDetections, RecognitionEngine};
use rollcall_core::enrollment::Enrollment;
use rollcall_core::{
    BoundingBox, Detection, Embedding, Gallery, GalleryMatcher, Identity, LabeledEmbedding, Roster,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type DetectScript = Box<dyn Fn(usize) -> Result<FrameDetections, EngineError> + Send + Sync>;
type EnrollScript = Box<dyn Fn(usize) -> Enrollment + Send + Sync>;

pub struct StubEngine {
    detect_script: DetectScript,
    enroll_script: EnrollScript,
    delay: Duration,
    stall_enroll: bool,
    calls: AtomicUsize,
    enrolls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubEngine {
    /// Engine whose n-th detect call returns `script(n)`. Enrollment learns
    /// every identity in the fixture gallery.
    pub fn new(
        script: impl Fn(usize) -> Result<FrameDetections, EngineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            detect_script: Box::new(script),
            enroll_script: Box::new(|_| Enrollment {
                learned: gallery_entries(),
                excluded: Vec::new(),
            }),
            delay: Duration::ZERO,
            stall_enroll: false,
            calls: AtomicUsize::new(0),
            enrolls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_enrollment(mut self, script: impl Fn(usize) -> Enrollment + Send + Sync + 'static) -> Self {
        self.enroll_script = Box::new(script);
        self
    }

    /// Enrollment that never completes, like a hung helper.
    pub fn with_stalled_enrollment(mut self) -> Self {
        self.stall_enroll = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn enrolls(&self) -> usize {
        self.enrolls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RecognitionEngine for StubEngine {
    async fn enroll(&self, _roster: Arc<Roster>) -> Result<Enrollment, EngineError> {
        let n = self.enrolls.fetch_add(1, Ordering::SeqCst);
        if self.stall_enroll {
            std::future::pending::<()>().await;
        }
        Ok((self.enroll_script)(n))
    }

    async fn detect(&self) -> Result<FrameDetections, EngineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.detect_script)(n)
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        Some((100, 100))
    }
}

/// Counts a detect call as in flight until completed or cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn roster(names: &[&str]) -> Roster {
    Roster::new(
        names
            .iter()
            .map(|n| Identity::new(*n, format!("{n}.png")))
            .collect(),
    )
    .unwrap()
}

/// Reference embeddings: A at the origin, B one unit away.
pub fn gallery_entries() -> Vec<LabeledEmbedding> {
    vec![
        LabeledEmbedding {
            label: "A".into(),
            embedding: embedding_for("A"),
        },
        LabeledEmbedding {
            label: "B".into(),
            embedding: embedding_for("B"),
        },
    ]
}

pub fn gallery_matcher() -> GalleryMatcher {
    GalleryMatcher::euclidean(Gallery::new(gallery_entries()).unwrap(), 0.6)
}

fn embedding_for(who: &str) -> Embedding {
    match who {
        "A" => Embedding::new(vec![0.0, 0.0]),
        "B" => Embedding::new(vec![1.0, 0.0]),
        _ => Embedding::new(vec![5.0, 5.0]),
    }
}

/// A 10x10 face at (10, 10) whose embedding matches `who`, or nobody.
pub fn detection(who: &str) -> Detection {
    Detection {
        bbox: BoundingBox {
            x: 10.0,
            y: 10.0,
            width: 10.0,
            height: 10.0,
            confidence: 0.9,
        },
        embedding: embedding_for(who),
    }
}

/// A 100x100 frame with the given detections.
pub fn frame(detections: Vec<Detection>) -> FrameDetections {
    FrameDetections {
        width: 100,
        height: 100,
        detections,
    }
}
