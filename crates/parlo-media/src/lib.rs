//! Audio I/O for parlo: microphone capture, speaker playback, and the
//! speech synthesis player that voices finalized translations.

pub mod capture;
pub mod playback;
pub mod speaker;
pub mod unlock;
pub mod wav;

pub use capture::{AudioRecorder, CaptureSource, CpalCaptureSource};
pub use playback::{AudioSink, RodioSink};
pub use speaker::{PlayerState, SpeakerConfig, SpeakerHandle, SpeechSynthesisPlayer};
pub use unlock::{NoopUnlocker, OutputUnlocker, PrimingUnlocker, UnlockState};
