use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParloError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Audio capture failed: {0}")]
    Capture(String),

    #[error("{0}")]
    Transcription(String),

    #[error("{0}")]
    LanguageDetection(String),

    #[error("{0}")]
    Translation(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParloError>;
