use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One finalized audio recording, ready for transcription.
///
/// Produced once per turn by the capture layer and consumed exactly once.
/// The container format is fixed — everything downstream assumes WAV.
#[derive(Debug, Clone)]
pub struct Clip {
    pub data: Vec<u8>,
    pub mime: &'static str,
}

impl Clip {
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            mime: "audio/wav",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A language with its BCP-47-ish code and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTag {
    pub code: String,
    pub name: String,
}

impl LanguageTag {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// The two conversation languages, fixed on the first successful turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: LanguageTag,
    pub target: LanguageTag,
}

impl LanguagePair {
    /// The member of the pair that is not `detected_code`.
    ///
    /// Falls back to the target when the detected language matches neither
    /// member (the endpoint may report a dialect variant).
    pub fn other(&self, detected_code: &str) -> &LanguageTag {
        if self.target.code == detected_code {
            &self.source
        } else {
            &self.target
        }
    }
}

/// Recognized speech plus the language the endpoint detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
}

/// One completed conversation entry. Append-only, immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub original_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        original_text: String,
        translated_text: String,
        source_lang: String,
        target_lang: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_text,
            translated_text,
            source_lang,
            target_lang,
            timestamp: Utc::now(),
        }
    }
}
