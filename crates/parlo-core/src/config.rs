//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ParloError, Result};

/// Top-level parlo configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<ServicesConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceConfig>,
}

/// Endpoints for the four translation services.
///
/// All four are reachable under one base URL; individual paths can be
/// overridden for split deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_path: Option<String>,
}

impl ServicesConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_key_env: None,
            transcription_path: None,
            language_path: None,
            translation_path: None,
            speech_path: None,
        }
    }

    /// Resolve the API key: check `api_key` first, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }

    pub fn transcription_url(&self) -> String {
        self.join(self.transcription_path.as_deref().unwrap_or("/api/speech"))
    }

    pub fn language_url(&self) -> String {
        self.join(self.language_path.as_deref().unwrap_or("/api/language"))
    }

    pub fn translation_url(&self) -> String {
        self.join(self.translation_path.as_deref().unwrap_or("/api/translate"))
    }

    pub fn speech_url(&self) -> String {
        self.join(self.speech_path.as_deref().unwrap_or("/api/speech/tts"))
    }

    fn join(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Microphone capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
        }
    }
}

/// Voice output (speech synthesis) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Start with voice output on. It can still be toggled at runtime.
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Default config file path: `~/.config/parlo/parlo.json`.
    pub fn config_path() -> PathBuf {
        std::env::var("PARLO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
                PathBuf::from(home).join(".config/parlo/parlo.json")
            })
    }

    /// Load config from `path`. A missing file yields the default config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ParloError::Config(format!("{}: {e}", path.display())))
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio
            .as_ref()
            .map(|a| a.sample_rate)
            .unwrap_or_else(default_sample_rate)
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice.as_ref().is_some_and(|v| v.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoint_paths() {
        let svc = ServicesConfig::new("http://localhost:3000/");
        assert_eq!(svc.transcription_url(), "http://localhost:3000/api/speech");
        assert_eq!(svc.language_url(), "http://localhost:3000/api/language");
        assert_eq!(svc.translation_url(), "http://localhost:3000/api/translate");
        assert_eq!(svc.speech_url(), "http://localhost:3000/api/speech/tts");
    }

    #[test]
    fn test_path_override() {
        let mut svc = ServicesConfig::new("http://localhost:3000");
        svc.translation_path = Some("/v2/translate".into());
        assert_eq!(svc.translation_url(), "http://localhost:3000/v2/translate");
    }

    #[test]
    fn test_resolve_api_key_prefers_literal() {
        let mut svc = ServicesConfig::new("http://x");
        svc.api_key = Some("sk-literal".into());
        svc.api_key_env = Some("PARLO_TEST_KEY_UNSET".into());
        assert_eq!(svc.resolve_api_key().as_deref(), Some("sk-literal"));
    }

    #[test]
    fn test_resolve_api_key_empty_falls_through() {
        let mut svc = ServicesConfig::new("http://x");
        svc.api_key = Some(String::new());
        svc.api_key_env = Some("PARLO_TEST_KEY_DEFINITELY_UNSET".into());
        assert_eq!(svc.resolve_api_key(), None);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let cfg = Config::load(Path::new("/nonexistent/parlo.json")).unwrap();
        assert!(cfg.services.is_none());
        assert_eq!(cfg.sample_rate(), 16000);
        assert!(!cfg.voice_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"{
            "services": { "base_url": "https://parlo.example", "api_key_env": "PARLO_KEY" },
            "audio": { "sample_rate": 44100 },
            "voice": { "enabled": true }
        }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.sample_rate(), 44100);
        assert!(cfg.voice_enabled());
        assert_eq!(
            cfg.services.unwrap().base_url,
            "https://parlo.example"
        );
    }
}
