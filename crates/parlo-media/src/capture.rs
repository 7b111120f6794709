//! Microphone capture.
//!
//! One recorder, one recording at a time. Samples accumulate in a shared
//! buffer while the device stream runs; `stop` concatenates everything
//! captured since `start` into a single WAV clip.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, warn};

use parlo_core::types::Clip;
use parlo_core::{ParloError, Result};

use crate::wav::pcm_to_wav;

/// Where samples come from. Implemented by the cpal device and by mocks.
pub trait CaptureSource: Send {
    /// Begin delivering samples into the internal buffer.
    fn start(&mut self) -> Result<()>;

    /// Stop the device. Already-buffered samples stay available for [`take`].
    ///
    /// [`take`]: CaptureSource::take
    fn stop(&mut self) -> Result<()>;

    /// Take everything captured since the last `start`.
    fn take(&mut self) -> Vec<i16>;

    fn sample_rate(&self) -> u32;
}

/// Turn-level recorder: one start/stop cycle produces one clip.
pub struct AudioRecorder {
    source: Box<dyn CaptureSource>,
    recording: bool,
}

impl AudioRecorder {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self {
            source,
            recording: false,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Start a new recording. Rejected while one is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.recording {
            return Err(ParloError::Capture(
                "recording already in progress".into(),
            ));
        }
        self.source.start()?;
        self.recording = true;
        debug!("Recording started");
        Ok(())
    }

    /// Stop recording and package everything captured as one WAV clip.
    pub fn stop(&mut self) -> Result<Clip> {
        if !self.recording {
            return Err(ParloError::Capture("no recording in progress".into()));
        }
        self.recording = false;
        self.source.stop()?;
        let samples = self.source.take();
        if samples.is_empty() {
            warn!("Recording stopped with no captured audio");
        }
        debug!(samples = samples.len(), "Recording stopped");
        Ok(Clip::wav(pcm_to_wav(&samples, self.source.sample_rate())))
    }
}

/// Wrapper for `cpal::Stream`, which is not `Send` on every backend.
///
/// SAFETY: the stream is only touched through `&mut CpalCaptureSource`,
/// so access is exclusive and never crosses threads concurrently.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Real microphone input via cpal, capturing mono 16-bit PCM.
///
/// Tries an i16 stream at the configured rate first, then falls back to
/// f32 with sample conversion for devices that only expose float formats.
pub struct CpalCaptureSource {
    device: cpal::Device,
    stream: Option<SendableStream>,
    buffer: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalCaptureSource {
    /// Open `device_name`, or the system default input device when `None`.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| {
                    ParloError::Capture(format!("failed to enumerate input devices: {e}"))
                })?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| ParloError::Capture(format!("input device not found: {name}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| ParloError::Capture("no default input device".into()))?,
        };

        Ok(Self {
            device,
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
            sample_rate,
        })
    }

    /// Names of all available input devices.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| {
            ParloError::Capture(format!("failed to enumerate input devices: {e}"))
        })?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| warn!(%err, "Input stream error");

        // Preferred: i16 directly, no conversion.
        let buffer = Arc::clone(&self.buffer);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: f32 with conversion.
        let buffer = Arc::clone(&self.buffer);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend(
                            data.iter()
                                .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                        );
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| ParloError::Capture(format!("failed to open input stream: {e}")))
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<()> {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        let stream = self.build_stream()?;
        stream
            .play()
            .map_err(|e| ParloError::Capture(format!("failed to start input stream: {e}")))?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // Dropping the stream closes the device.
        self.stream = None;
        Ok(())
    }

    fn take(&mut self) -> Vec<i16> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
