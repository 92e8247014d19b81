use rollcall_core::enrollment::{self, Enrollment};
use rollcall_core::{BackendError, Detection, FaceBackend, Roster};
use rollcall_hw::{Camera, CameraError, CaptureSession};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("engine setup failed: {0}")]
    Setup(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// All faces found in one captured frame, in frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct FrameDetections {
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
}

/// The recognition side of a session: enrollment and per-frame detection.
///
/// [`EngineHandle`] is the production implementation; tests substitute
/// scripted engines.
pub trait RecognitionEngine: Send + Sync + 'static {
    fn enroll(
        &self,
        roster: Arc<Roster>,
    ) -> impl Future<Output = Result<Enrollment, EngineError>> + Send;

    /// Capture the current frame and detect every face in it.
    fn detect(&self) -> impl Future<Output = Result<FrameDetections, EngineError>> + Send;

    /// Native frame dimensions, if known.
    fn frame_size(&self) -> Option<(u32, u32)>;
}

/// Camera and capture parameters for [`spawn_engine`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    pub warmup_frames: usize,
}

/// Messages sent from the session to the engine thread.
enum EngineRequest {
    Enroll {
        roster: Arc<Roster>,
        reply: oneshot::Sender<Enrollment>,
    },
    Detect {
        reply: oneshot::Sender<Result<FrameDetections, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    frame_size: (u32, u32),
}

impl RecognitionEngine for EngineHandle {
    async fn enroll(&self, roster: Arc<Roster>) -> Result<Enrollment, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                roster,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn detect(&self) -> Result<FrameDetections, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    fn frame_size(&self) -> Option<(u32, u32)> {
        Some(self.frame_size)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread opens the camera, starts streaming and discards warmup
/// frames before reporting ready; any failure there is returned from this
/// function. The backend must already have its models loaded. The thread
/// exits, releasing camera and backend, once every handle is dropped.
pub async fn spawn_engine<B>(settings: EngineSettings, mut backend: B) -> Result<EngineHandle, EngineError>
where
    B: FaceBackend + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(u32, u32), EngineError>>();
    let device = settings.camera_device.clone();

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let camera = match Camera::open(
                &settings.camera_device,
                settings.capture_width,
                settings.capture_height,
            ) {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            let mut capture = match camera.start_capture() {
                Ok(capture) => capture,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };

            tracing::debug!(format = ?camera.pixel_format(), "capture format negotiated");

            if settings.warmup_frames > 0 {
                tracing::info!(count = settings.warmup_frames, "discarding warmup frames");
                capture.discard(settings.warmup_frames);
            }

            if ready_tx.send(Ok((camera.width, camera.height))).is_err() {
                return;
            }

            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll { roster, reply } => {
                        let result = enrollment::enroll(&roster, &mut backend);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Detect { reply } => {
                        let result = run_detect(&mut capture, &mut backend);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| EngineError::Setup(format!("failed to spawn engine thread: {e}")))?;

    let frame_size = ready_rx
        .await
        .map_err(|_| EngineError::Setup("engine thread exited during startup".into()))??;

    tracing::info!(
        device = %device,
        width = frame_size.0,
        height = frame_size.1,
        "camera streaming"
    );

    Ok(EngineHandle { tx, frame_size })
}

/// Capture one frame and detect faces in it. Dark frames skip the backend.
fn run_detect<B: FaceBackend>(
    capture: &mut CaptureSession<'_>,
    backend: &mut B,
) -> Result<FrameDetections, EngineError> {
    let frame = capture.next_frame()?;
    let (width, height) = frame.dimensions();

    if frame.is_dark {
        tracing::trace!(seq = frame.sequence, "dark frame; no detection");
        return Ok(FrameDetections {
            width,
            height,
            detections: Vec::new(),
        });
    }

    let detections = backend.detect_all(&frame.data, width, height)?;
    tracing::trace!(seq = frame.sequence, faces = detections.len(), "frame processed");

    Ok(FrameDetections {
        width,
        height,
        detections,
    })
}
