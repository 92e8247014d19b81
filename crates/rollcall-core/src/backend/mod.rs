//! The external face recognition capability.
//!
//! Detection and embedding extraction happen outside this crate. The
//! pipeline only needs the narrow [`FaceBackend`] interface, which keeps
//! matching, enrollment and tracking testable against stub backends.

pub mod helper;

pub use helper::{HelperBackend, HelperChannel};

use crate::types::Detection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to start recognition helper {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("helper I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed helper message: {0}")]
    Protocol(String),
    #[error("helper closed its output stream")]
    Closed,
    #[error("helper reported failure: {0}")]
    Remote(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },
}

/// Face detection + embedding extraction over 8-bit grayscale frames.
///
/// Calls are blocking and CPU bound; callers run them off the async runtime.
pub trait FaceBackend: Send {
    /// Load (or verify) the detection and recognition models.
    fn load_models(&mut self) -> Result<(), BackendError>;

    /// Detect every face in the frame, each with its embedding.
    fn detect_all(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, BackendError>;

    /// Detect the single most confident face, if any. Used for enrollment.
    fn detect_single(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Detection>, BackendError> {
        let detections = self.detect_all(pixels, width, height)?;
        Ok(detections
            .into_iter()
            .max_by(|a, b| a.bbox.confidence.total_cmp(&b.bbox.confidence)))
    }
}

impl<B: FaceBackend + ?Sized> FaceBackend for Box<B> {
    fn load_models(&mut self) -> Result<(), BackendError> {
        (**self).load_models()
    }

    fn detect_all(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<Detection>, BackendError> {
        (**self).detect_all(pixels, width, height)
    }

    fn detect_single(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Detection>, BackendError> {
        (**self).detect_single(pixels, width, height)
    }
}

/// Checks that a grayscale buffer holds at least `width * height` bytes
/// and returns exactly that many.
pub(crate) fn frame_bytes(pixels: &[u8], width: u32, height: u32) -> Result<&[u8], BackendError> {
    let expected = width as usize * height as usize;
    if pixels.len() < expected {
        return Err(BackendError::FrameSize {
            expected,
            actual: pixels.len(),
        });
    }
    Ok(&pixels[..expected])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    struct FixedBackend(Vec<Detection>);

    impl FaceBackend for FixedBackend {
        fn load_models(&mut self) -> Result<(), BackendError> {
            Ok(())
        }

        fn detect_all(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<Detection>, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn det(confidence: f32, v: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence },
            embedding: Embedding::new(vec![v]),
        }
    }

    #[test]
    fn test_default_detect_single_picks_most_confident() {
        let mut backend = FixedBackend(vec![det(0.4, 1.0), det(0.9, 2.0), det(0.7, 3.0)]);
        let single = backend.detect_single(&[], 0, 0).unwrap().unwrap();
        assert_eq!(single.embedding.values, vec![2.0]);
    }

    #[test]
    fn test_default_detect_single_no_faces() {
        let mut backend: Box<dyn FaceBackend> = Box::new(FixedBackend(vec![]));
        assert!(backend.detect_single(&[], 0, 0).unwrap().is_none());
    }

    #[test]
    fn test_frame_bytes_truncates_and_validates() {
        let buf = vec![1u8; 10];
        assert_eq!(frame_bytes(&buf, 3, 3).unwrap().len(), 9);
        assert!(matches!(
            frame_bytes(&buf, 4, 4),
            Err(BackendError::FrameSize { expected: 16, actual: 10 })
        ));
    }
}
