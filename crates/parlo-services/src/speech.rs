//! Speech-synthesis client — fetches audio for a finalized translation.

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use parlo_core::config::ServicesConfig;
use parlo_core::{ParloError, Result};

use crate::{server_message, SpeechApi};

/// Synthesized audio bytes with their reported content type.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub content_type: String,
}

pub struct HttpSpeechClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSpeechClient {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        Self::new(config.speech_url(), config.resolve_api_key())
    }

    async fn fetch(&self, text: &str) -> Result<SynthesizedAudio> {
        let mut req = self.client.post(&self.url).json(&json!({ "text": text }));
        if let Some(ref key) = self.api_key {
            req = req.header("authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ParloError::Synthesis(format!("speech request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ParloError::Synthesis(server_message(
                &body,
                "Failed to generate speech",
            )));
        }

        // Content-type validation is the player's job; report it as-is.
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let data = resp
            .bytes()
            .await
            .map_err(|e| ParloError::Synthesis(format!("speech download failed: {e}")))?
            .to_vec();

        debug!(bytes = data.len(), content_type, "Synthesized audio received");

        Ok(SynthesizedAudio { data, content_type })
    }
}

#[async_trait]
impl SpeechApi for HttpSpeechClient {
    async fn synthesize(&self, text: &str, cancel: &CancellationToken) -> Result<SynthesizedAudio> {
        tokio::select! {
            _ = cancel.cancelled() => {
                Err(ParloError::Synthesis("request cancelled".into()))
            }
            result = self.fetch(text) => result,
        }
    }
}
