//! Camera device read through an `ffmpeg` child process
//!
//! `ffmpeg` opens the platform capture device and writes raw RGB24 frames of
//! a fixed size to stdout, one after another.

use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use super::{Frame, FrameSlot, FrameSource};
use crate::config::CameraConfig;
use crate::{Error, Result};

/// Arguments that make `ffmpeg` stream camera `index` as raw frames
///
/// # Errors
///
/// Returns [`Error::CameraUnavailable`] on platforms without a known capture
/// input
pub fn ffmpeg_args(index: u32, config: &CameraConfig) -> Result<Vec<String>> {
    let size = format!("{}x{}", config.width, config.height);

    let input: Vec<String> = if cfg!(target_os = "linux") {
        vec![
            "-f".into(),
            "v4l2".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            format!("/dev/video{index}"),
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            "30".into(),
            "-video_size".into(),
            size,
            "-i".into(),
            index.to_string(),
        ]
    } else {
        return Err(Error::CameraUnavailable(format!(
            "no capture input known for {}",
            std::env::consts::OS
        )));
    };

    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .into_iter()
        .map(String::from)
        .collect();
    args.extend(input);
    args.extend([
        "-vf".to_string(),
        format!("scale={}:{}", config.width, config.height),
        "-pix_fmt".to_string(),
        "rgb24".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-".to_string(),
    ]);
    Ok(args)
}

/// Running `ffmpeg` process and its frame pipe
struct FrameReader {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl FrameReader {
    fn spawn(index: u32, config: &CameraConfig) -> Result<Self> {
        let mut child = Command::new(&config.ffmpeg)
            .args(ffmpeg_args(index, config)?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::CameraUnavailable(format!("failed to start {}: {e}", config.ffmpeg)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CameraUnavailable("ffmpeg stdout is unavailable".to_string()))?;

        Ok(Self {
            child,
            stdout,
            width: config.width,
            height: config.height,
        })
    }

    fn read_frame(&mut self) -> Result<Frame> {
        let len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0; len];
        self.stdout
            .read_exact(&mut buf)
            .map_err(|e| Error::CameraUnavailable(format!("camera stream ended: {e}")))?;
        Frame::from_raw(self.width, self.height, buf)
            .ok_or_else(|| Error::CameraUnavailable("short frame".to_string()))
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
    }
}

struct CaptureThread {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

enum CaptureState {
    /// Device verified, capture loop not started yet
    Opened(FrameReader),
    Streaming(CaptureThread),
    Stopped,
}

/// Webcam with a background capture loop
pub struct Camera {
    index: u32,
    config: CameraConfig,
    slot: FrameSlot,
    state: Mutex<CaptureState>,
}

impl Camera {
    /// Open camera `index` and read one frame to verify it works
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] if the device yields no frame
    pub fn open(index: u32, config: &CameraConfig) -> Result<Self> {
        let slot = FrameSlot::new();
        let reader = open_verified(index, config, &slot)?;

        tracing::info!(index, width = config.width, height = config.height, "camera opened");

        Ok(Self {
            index,
            config: config.clone(),
            slot,
            state: Mutex::new(CaptureState::Opened(reader)),
        })
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }
}

fn open_verified(index: u32, config: &CameraConfig, slot: &FrameSlot) -> Result<FrameReader> {
    let mut reader = FrameReader::spawn(index, config)?;
    let first = reader.read_frame()?;
    slot.store(first);
    Ok(reader)
}

fn spawn_capture(reader: FrameReader, slot: FrameSlot) -> Result<CaptureThread> {
    let stop = Arc::new(AtomicBool::new(false));
    let handle = {
        let stop = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_loop(reader, &slot, &stop))?
    };
    Ok(CaptureThread { handle, stop })
}

fn capture_loop(mut reader: FrameReader, slot: &FrameSlot, stop: &AtomicBool) {
    tracing::debug!("camera capture started");
    while !stop.load(Ordering::Relaxed) {
        match reader.read_frame() {
            Ok(frame) => slot.store(frame),
            Err(e) => {
                tracing::warn!(error = %e, "camera capture stopped");
                return;
            }
        }
    }
    tracing::debug!("camera capture stopped");
}

impl FrameSource for Camera {
    fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.slot.latest()
    }

    fn ensure_streaming(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let reader = match std::mem::replace(&mut *state, CaptureState::Stopped) {
            CaptureState::Streaming(thread) if !thread.handle.is_finished() => {
                *state = CaptureState::Streaming(thread);
                return Ok(());
            }
            CaptureState::Opened(reader) => reader,
            CaptureState::Streaming(_) | CaptureState::Stopped => {
                tracing::info!(index = self.index, "restarting camera capture");
                open_verified(self.index, &self.config, &self.slot)?
            }
        };

        *state = CaptureState::Streaming(spawn_capture(reader, self.slot.clone())?);
        Ok(())
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let CaptureState::Streaming(thread) = state {
            thread.stop.store(true, Ordering::Relaxed);
        }
    }
}
