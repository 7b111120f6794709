//! Language-pair resolution — one-shot exchange made from the first utterance.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use parlo_core::config::ServicesConfig;
use parlo_core::types::{LanguagePair, LanguageTag};
use parlo_core::{ParloError, Result};

use crate::{server_message, LanguagePairApi};

#[derive(Debug, Deserialize)]
struct LanguagePairResponse {
    #[serde(rename = "sourceLanguage")]
    source_language: LanguageTag,
    #[serde(rename = "targetLanguage")]
    target_language: LanguageTag,
}

pub struct HttpLanguagePairClient {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpLanguagePairClient {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self {
            url,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        Self::new(config.language_url(), config.resolve_api_key())
    }
}

#[async_trait]
impl LanguagePairApi for HttpLanguagePairClient {
    async fn resolve_pair(&self, text: &str) -> Result<LanguagePair> {
        debug!(url = %self.url, text_len = text.len(), "Resolving language pair");

        let mut req = self.client.post(&self.url).json(&json!({ "text": text }));
        if let Some(ref key) = self.api_key {
            req = req.header("authorization", format!("Bearer {key}"));
        }

        let resp = req.send().await.map_err(|e| {
            ParloError::LanguageDetection(format!("language request failed: {e}"))
        })?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ParloError::LanguageDetection(server_message(
                &body,
                "Failed to detect languages",
            )));
        }

        let parsed: LanguagePairResponse = resp.json().await.map_err(|e| {
            ParloError::LanguageDetection(format!("malformed language response: {e}"))
        })?;

        Ok(LanguagePair {
            source: parsed.source_language,
            target: parsed.target_language,
        })
    }
}
