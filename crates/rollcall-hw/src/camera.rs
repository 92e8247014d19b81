//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
            Some(PixelFormat::Y16)
        } else {
            None
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera and negotiate a YUYV format at the requested size.
    ///
    /// The driver may substitute another size or a grayscale format; the
    /// negotiated values are what `width`/`height` report.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start streaming. Buffers stay mapped until the session is dropped.
    pub fn start_capture(&self) -> Result<CaptureSession<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, CAPTURE_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
        tracing::debug!(device = %self.device_path, buffers = CAPTURE_BUFFERS, "capture stream started");
        Ok(CaptureSession {
            camera: self,
            stream,
        })
    }

    /// Convert a raw buffer to grayscale based on the negotiated format.
    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Grey => frame::grey_to_grayscale(buf, self.width, self.height),
            PixelFormat::Y16 => frame::y16_to_grayscale(buf, self.width, self.height),
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height),
        };
        converted.map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} conversion failed: {e}", self.pixel_format))
        })
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// A live capture stream on an open camera.
pub struct CaptureSession<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl CaptureSession<'_> {
    /// Dequeue the next frame and convert it to grayscale.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let gray = self.camera.buf_to_grayscale(buf)?;
        Ok(Frame::from_gray(
            gray,
            self.camera.width,
            self.camera.height,
            sequence,
        ))
    }

    /// Dequeue and drop `count` frames, letting auto exposure settle.
    pub fn discard(&mut self, count: usize) {
        for _ in 0..count {
            if let Err(e) = self.stream.next() {
                tracing::debug!(error = %e, "warmup frame dropped with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_from_fourcc() {
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"YUYV")), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"GREY")), Some(PixelFormat::Grey));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), Some(PixelFormat::Y16));
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"MJPG")), None);
    }

    #[test]
    fn test_open_missing_device() {
        let err = Camera::open("/dev/nonexistent-video", 640, 480).err().unwrap();
        assert!(matches!(err, CameraError::DeviceNotFound(_)));
    }
}
