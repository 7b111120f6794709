//! HTTP service clients for the four translation-pipeline endpoints.
//!
//! Each endpoint sits behind a trait so the turn controller can be driven by
//! mocks in tests: [`TranscriptionApi`], [`LanguagePairApi`], [`TranslationApi`],
//! and [`SpeechApi`].

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlo_core::types::{Clip, LanguagePair, TranscriptResult};
use parlo_core::Result;

pub mod language;
pub mod speech;
pub mod sse;
pub mod transcription;
pub mod translation;

pub use language::HttpLanguagePairClient;
pub use speech::{HttpSpeechClient, SynthesizedAudio};
pub use transcription::HttpTranscriptionClient;
pub use translation::HttpTranslationClient;

/// Speech-to-text: upload one clip, get recognized text + detected language.
#[async_trait]
pub trait TranscriptionApi: Send + Sync {
    async fn transcribe(&self, clip: &Clip) -> Result<TranscriptResult>;
}

/// One-shot exchange fixing the two conversation languages from the first
/// utterance.
#[async_trait]
pub trait LanguagePairApi: Send + Sync {
    async fn resolve_pair(&self, text: &str) -> Result<LanguagePair>;
}

/// Streaming machine translation.
///
/// Resolves with the full translated text; `partial_tx` receives the
/// accumulated text after each delta. Callers must not issue a second call
/// for the same turn while one is outstanding.
#[async_trait]
pub trait TranslationApi: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
        partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String>;
}

/// Text-to-speech. The request is abortable via `cancel` so a superseded
/// playback session can tear down its in-flight fetch.
#[async_trait]
pub trait SpeechApi: Send + Sync {
    async fn synthesize(&self, text: &str, cancel: &CancellationToken) -> Result<SynthesizedAudio>;
}

/// Extract a human-readable message from a service error body.
///
/// The endpoints return `{error, details}` on failure; `details` is the more
/// specific of the two. Falls back to the raw body, then to `fallback`.
pub(crate) fn server_message(body: &str, fallback: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<String>,
        details: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(msg) = parsed.details.or(parsed.error) {
            return msg;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_prefers_details() {
        let body = r#"{"error":"Failed to transcribe audio","details":"audio too short"}"#;
        assert_eq!(server_message(body, "fallback"), "audio too short");
    }

    #[test]
    fn test_server_message_uses_error_when_no_details() {
        let body = r#"{"error":"Failed to transcribe audio"}"#;
        assert_eq!(server_message(body, "fallback"), "Failed to transcribe audio");
    }

    #[test]
    fn test_server_message_raw_body_fallback() {
        assert_eq!(server_message("bad gateway", "fallback"), "bad gateway");
        assert_eq!(server_message("  ", "fallback"), "fallback");
        assert_eq!(server_message("{}", "fallback"), "fallback");
    }
}
