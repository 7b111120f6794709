//! Turn orchestration.
//!
//! One spoken turn flows capture → transcription → (language resolution |
//! translation) → conversation history. The controller runs at most one
//! turn at a time and drops results from turns that were cancelled or
//! superseded while their network calls were in flight.

use serde::{Deserialize, Serialize};

use parlo_core::types::{LanguagePair, Message};

pub mod turn;

pub use turn::{TurnController, TurnOutcome};

/// Pipeline stage a turn failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Transcription,
    LanguageDetection,
    Translation,
}

/// Events emitted while a turn executes, in order of occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Speech was recognized; shown while translation streams.
    Transcript { text: String, language: String },

    /// First turn only: the two conversation languages are now fixed.
    LanguagesResolved { pair: LanguagePair },

    /// Accumulated translation text so far, replacing the previous partial.
    PartialTranslation { text: String },

    /// The turn completed and this message joined the history.
    MessageAdded { message: Message },

    /// The turn aborted. Earlier committed state (the transcript) is
    /// rolled back so no half-finished turn lingers on screen.
    TurnError { stage: TurnStage, message: String },
}
