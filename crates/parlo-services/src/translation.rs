//! Streaming machine translation client.
//!
//! The endpoint streams `data: {"content": "..."}` frames carrying incremental
//! deltas, terminated by `data: [DONE]` or plain end of stream — both are
//! success. Frames that fail to parse are logged and skipped.

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use parlo_core::config::ServicesConfig;
use parlo_core::types::LanguagePair;
use parlo_core::{ParloError, Result};

use crate::sse::data_frames;
use crate::{server_message, TranslationApi};

/// End-of-stream marker, distinct from ordinary data frames.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct TranslationDelta {
    #[serde(default)]
    content: Option<String>,
}

pub struct HttpTranslationClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpTranslationClient {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        Self::new(config.translation_url(), config.resolve_api_key())
    }
}

#[async_trait]
impl TranslationApi for HttpTranslationClient {
    async fn translate(
        &self,
        text: &str,
        pair: &LanguagePair,
        partial_tx: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        debug!(url = %self.url, text_len = text.len(), "Starting translation stream");

        let body = json!({
            "text": text,
            "languages": [pair.source, pair.target],
        });

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("authorization", format!("Bearer {key}"));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ParloError::Translation(format!("translation request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ParloError::Translation(server_message(
                &body,
                "Translation failed",
            )));
        }

        accumulate(data_frames(resp.bytes_stream()), partial_tx).await
    }
}

/// Fold a stream of `data:` payloads into the full translated text.
///
/// Each delta is appended, never replacing; the accumulated text so far is
/// sent on `partial_tx` after every append. The sentinel and end-of-data both
/// resolve with the accumulated string.
pub async fn accumulate(
    frames: impl Stream<Item = Result<String>>,
    partial_tx: mpsc::UnboundedSender<String>,
) -> Result<String> {
    let mut frames = std::pin::pin!(frames);
    let mut translation = String::new();

    while let Some(frame) = frames.next().await {
        let data =
            frame.map_err(|e| ParloError::Translation(format!("translation stream error: {e}")))?;

        if data == DONE_SENTINEL {
            return Ok(translation);
        }

        match serde_json::from_str::<TranslationDelta>(&data) {
            Ok(delta) => {
                if let Some(content) = delta.content {
                    if !content.is_empty() {
                        translation.push_str(&content);
                        // Receiver may have been dropped by a superseded turn.
                        let _ = partial_tx.send(translation.clone());
                    }
                }
            }
            Err(e) => {
                trace!(%e, data, "Skipping unparseable translation frame");
            }
        }
    }

    Ok(translation)
}
