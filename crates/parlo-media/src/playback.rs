//! Speaker output.

use std::io::Cursor;

use rodio::{Decoder, OutputStream, Sink};
use tracing::debug;

use parlo_core::{ParloError, Result};
use parlo_services::SynthesizedAudio;

/// A device that plays one decoded clip at a time.
pub trait AudioSink: Send {
    /// Start playing `audio`, replacing whatever was playing before.
    fn play(&mut self, audio: &SynthesizedAudio) -> Result<()>;

    /// Stop and release the current playback, if any.
    fn stop(&mut self);

    /// True when nothing is playing: never started, stopped, or ran out.
    fn is_finished(&self) -> bool;
}

/// Wrapper for the rodio output stream, which holds a cpal stream and is
/// not `Send` on every backend.
///
/// SAFETY: only accessed through `&mut RodioSink`, so access is exclusive.
struct SendableOutput(OutputStream);

unsafe impl Send for SendableOutput {}

/// Real speaker output via rodio. The output device is opened fresh for
/// each playback and released when it stops, so a flaky device gets a
/// clean handle on every retry.
#[derive(Default)]
pub struct RodioSink {
    output: Option<SendableOutput>,
    sink: Option<Sink>,
}

impl RodioSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for RodioSink {
    fn play(&mut self, audio: &SynthesizedAudio) -> Result<()> {
        self.stop();

        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| ParloError::Playback(format!("failed to open output device: {e}")))?;
        let sink = Sink::try_new(&handle)
            .map_err(|e| ParloError::Playback(format!("failed to create playback sink: {e}")))?;
        let source = Decoder::new(Cursor::new(audio.data.clone()))
            .map_err(|e| ParloError::Playback(format!("failed to decode audio: {e}")))?;

        sink.append(source);
        debug!(bytes = audio.data.len(), "Playback started");

        self.output = Some(SendableOutput(stream));
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.output = None;
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map(|s| s.empty()).unwrap_or(true)
    }
}
