use std::path::PathBuf;

use thiserror::Error;

pub type RigResult<T> = Result<T, RigError>;

#[derive(Debug, Error)]
pub enum RigError {
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("hardware error: {0}")]
    Hardware(String),

    #[error("video source error: {0}")]
    VideoSource(String),

    #[error("detector error: {0}")]
    Detector(String),

    #[error("metrics export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("metrics recorder lock poisoned")]
    RecorderPoisoned,
}

impl RigError {
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
