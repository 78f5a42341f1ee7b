use thiserror::Error;

#[derive(Error, Debug)]
pub enum KirokError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Type parse error: {0}")]
    TypeParse(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, KirokError>;
