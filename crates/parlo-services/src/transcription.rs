//! Speech-to-text client — uploads one clip as multipart form data.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use parlo_core::config::ServicesConfig;
use parlo_core::types::{Clip, TranscriptResult};
use parlo_core::{ParloError, Result};

use crate::{server_message, TranscriptionApi};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    language: String,
}

pub struct HttpTranscriptionClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTranscriptionClient {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        Self::new(config.transcription_url(), config.resolve_api_key())
    }
}

#[async_trait]
impl TranscriptionApi for HttpTranscriptionClient {
    async fn transcribe(&self, clip: &Clip) -> Result<TranscriptResult> {
        debug!(url = %self.url, bytes = clip.data.len(), mime = clip.mime, "Uploading clip for transcription");

        let part = reqwest::multipart::Part::bytes(clip.data.clone())
            .file_name("audio.wav")
            .mime_str(clip.mime)
            .map_err(|e| ParloError::Transcription(format!("invalid clip mime type: {e}")))?;

        let form = reqwest::multipart::Form::new().part("audio", part);

        let mut req = self.client.post(&self.url).multipart(form);
        if let Some(ref key) = self.api_key {
            req = req.header("authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ParloError::Transcription(format!("transcription request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ParloError::Transcription(server_message(
                &body,
                "Failed to transcribe audio",
            )));
        }

        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .map_err(|e| ParloError::Transcription(format!("malformed transcription response: {e}")))?;

        Ok(TranscriptResult {
            text: parsed.text,
            language: parsed.language,
        })
    }
}
