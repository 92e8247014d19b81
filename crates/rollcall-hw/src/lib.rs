//! rollcall-hw: camera capture for the attendance session.
//!
//! Provides V4L2-based camera access and conversion of raw capture
//! buffers to 8-bit grayscale frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CaptureSession, DeviceInfo, PixelFormat};
pub use frame::Frame;
