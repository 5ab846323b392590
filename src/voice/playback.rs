//! Speaker output for synthesized speech

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Extra time allowed past the expected clip length
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Plays decoded audio on the default output device
///
/// Blocking; construct and use from a blocking thread.
pub struct AudioPlayback {
    device: Device,
    config: StreamConfig,
}

impl AudioPlayback {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device or usable config exists
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config = output_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio output opened"
        );

        Ok(Self { device, config })
    }

    /// Decode MP3 bytes and play them to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let samples = decode_mp3(mp3_data)?;
        self.play(samples)
    }

    /// Play mono f32 samples to completion
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play(&self, samples: Vec<f32>) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels);
        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            self.device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                        if pos >= samples.len() {
                            finished.store(true, Ordering::Release);
                        }
                    },
                    |err| tracing::error!(error = %err, "audio playback error"),
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let deadline = Instant::now() + clip_duration(sample_count) + DRAIN_GRACE;
        while !finished.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        // let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, "playback complete");
        Ok(())
    }
}

fn output_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(PLAYBACK_SAMPLE_RATE);
    let supports = |channels: u16| -> Option<cpal::SupportedStreamConfigRange> {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

    Ok(supported.with_sample_rate(rate).config())
}

fn clip_duration(sample_count: usize) -> Duration {
    let samples = u64::try_from(sample_count).unwrap_or(u64::MAX);
    Duration::from_millis(samples.saturating_mul(1000) / u64::from(PLAYBACK_SAMPLE_RATE))
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) if frame.channels == 2 => {
                samples.extend(frame.data.chunks(2).map(|pair| {
                    let left = f32::from(pair[0]) / 32768.0;
                    let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                    f32::midpoint(left, right)
                }));
            }
            Ok(frame) => samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0)),
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(samples)
}
