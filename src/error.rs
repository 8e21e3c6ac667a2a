//! Error types for the gpg-crack library.

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum CrackError {
    #[error("failed to open wordlist {path}: {source}")]
    Wordlist {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to import secret key from {path}: {reason}")]
    Import { path: String, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrackError>;
