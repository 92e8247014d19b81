//! Frame type and pixel format conversion.

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&data, DARK_FRAME_THRESHOLD);
        Self {
            data,
            width,
            height,
            sequence,
            is_dark,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale to 8 bits (keep the high byte).
pub fn y16_to_grayscale(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

/// Copy out an 8-bit grayscale buffer, checking its length.
pub fn grey_to_grayscale(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(grey[..expected].to_vec())
}

/// True if more than `threshold_pct` of pixels are near black (< 32).
///
/// A covered lens or a camera still warming up produces these; there is
/// nothing to detect in them.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_grayscale(&[100, 128], 2, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x1234 and 0xABCD little-endian
        let y16 = vec![0x34, 0x12, 0xCD, 0xAB];
        assert_eq!(y16_to_grayscale(&y16, 2, 1).unwrap(), vec![0x12, 0xAB]);
    }

    #[test]
    fn test_grey_truncates_padding() {
        let grey = vec![1, 2, 3, 4, 0, 0];
        assert_eq!(grey_to_grayscale(&grey, 2, 2).unwrap(), vec![1, 2, 3, 4]);
        assert!(grey_to_grayscale(&grey, 3, 3).is_err());
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&[0u8; 1000], DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_dark_frame_normal() {
        assert!(!is_dark_frame(&[128u8; 1000], DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&[], DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_from_gray_flags_dark() {
        let frame = Frame::from_gray(vec![0u8; 16], 4, 4, 7);
        assert!(frame.is_dark);
        assert_eq!(frame.dimensions(), (4, 4));
        assert_eq!(frame.sequence, 7);
        assert!(!Frame::from_gray(vec![200u8; 16], 4, 4, 8).is_dark);
    }
}
