//! Webcam frames
//!
//! A capture thread reads frames from the device and overwrites a single
//! latest-frame slot. Readers take whatever frame is there at the time; there
//! is no queueing of older frames.

mod ffmpeg;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::model::InlineData;
use crate::present::DisplaySink;
use crate::{Error, Result};

pub use ffmpeg::{Camera, ffmpeg_args};

/// One captured frame
pub type Frame = RgbImage;

/// JPEG quality used for frames sent to the model
const JPEG_QUALITY: u8 = 90;

/// Source of live frames for detection
pub trait FrameSource: Send + Sync {
    /// The most recently captured frame, if any has arrived yet
    fn latest_frame(&self) -> Option<Arc<Frame>>;

    /// Start continuous capture if it is not already running
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] if the device cannot be (re)opened
    fn ensure_streaming(&self) -> Result<()>;
}

/// Shared latest-frame slot, last writer wins
#[derive(Debug, Clone, Default)]
pub struct FrameSlot {
    inner: Arc<RwLock<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, frame: Frame) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(frame));
    }

    #[must_use]
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Sample `count` frames from `source`, `interval` apart
///
/// Prints `N frames loaded...` after each sample.
///
/// # Errors
///
/// Returns [`Error::CameraUnavailable`] if no frame has been captured
pub async fn sample_frames(
    source: &dyn FrameSource,
    count: usize,
    interval: Duration,
    display: &dyn DisplaySink,
) -> Result<Vec<Arc<Frame>>> {
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        let frame = source
            .latest_frame()
            .ok_or_else(|| Error::CameraUnavailable("no frame captured yet".to_string()))?;
        frames.push(frame);
        display.line(&format!("{} frames loaded...", frames.len()));
        tokio::time::sleep(interval).await;
    }
    Ok(frames)
}

/// Encode a frame as JPEG for the model transport
///
/// # Errors
///
/// Returns error if encoding fails
pub fn to_inline_jpeg(frame: &Frame) -> Result<InlineData> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(frame)?;
    Ok(InlineData::jpeg(bytes))
}
