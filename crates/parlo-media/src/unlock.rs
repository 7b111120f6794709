//! Output priming for hosts that gate audio behind a user interaction.
//!
//! Some audio stacks refuse playback until sound has been produced in
//! response to user input. The unlocker primes such outputs by playing a
//! moment of silence, retrying on each interaction until it works, and
//! stops watching once unlocked.

use tracing::debug;

use parlo_services::SynthesizedAudio;

use crate::playback::AudioSink;
use crate::wav::silent_wav;

const PRIME_SAMPLE_RATE: u32 = 16000;
const PRIME_MILLIS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockState {
    Locked,
    Unlocked,
}

/// Platform capability for waking the audio output path.
pub trait OutputUnlocker: Send {
    /// Attempt to unlock now. Returns the resulting state.
    fn ensure_unlocked(&mut self) -> UnlockState;

    /// A user interaction happened. Locked implementations retry here;
    /// unlocked ones have stopped watching and do nothing.
    fn notify_interaction(&mut self);

    fn state(&self) -> UnlockState;
}

/// For hosts whose output needs no priming (native audio stacks).
#[derive(Debug, Default)]
pub struct NoopUnlocker;

impl OutputUnlocker for NoopUnlocker {
    fn ensure_unlocked(&mut self) -> UnlockState {
        UnlockState::Unlocked
    }

    fn notify_interaction(&mut self) {}

    fn state(&self) -> UnlockState {
        UnlockState::Unlocked
    }
}

/// Primes a gated output by playing silence through its own sink.
pub struct PrimingUnlocker {
    sink: Box<dyn AudioSink>,
    state: UnlockState,
    watching: bool,
}

impl PrimingUnlocker {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            state: UnlockState::Locked,
            watching: true,
        }
    }

    fn prime(&mut self) {
        let silence = SynthesizedAudio {
            data: silent_wav(PRIME_SAMPLE_RATE, PRIME_MILLIS),
            content_type: "audio/wav".into(),
        };
        match self.sink.play(&silence) {
            Ok(()) => {
                self.sink.stop();
                self.state = UnlockState::Unlocked;
                // One-shot: stop watching interactions once primed.
                self.watching = false;
                debug!("Audio output unlocked");
            }
            Err(e) => debug!(%e, "Audio output still locked"),
        }
    }
}

impl OutputUnlocker for PrimingUnlocker {
    fn ensure_unlocked(&mut self) -> UnlockState {
        if self.state == UnlockState::Locked {
            self.prime();
        }
        self.state
    }

    fn notify_interaction(&mut self) {
        if self.watching {
            self.prime();
        }
    }

    fn state(&self) -> UnlockState {
        self.state
    }
}
