//! Cryptographic engine boundary.
//!
//! The worker loop only ever talks to these traits. Production binds GPGME
//! (`gpg::GpgEngine`); tests drive the same loop with stub engines.

pub mod gpg;

use thiserror::Error;

use crate::cracker::RunContext;

pub use gpg::{GpgEngine, KeySource};

/// Outcome of one protected signing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The operation completed; the candidate fed during this attempt
    /// unlocked the key.
    Unlocked,
    /// The candidate fed during this attempt was rejected.
    WrongPassphrase,
    /// The passphrase provider had no candidate left to feed.
    Exhausted,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine session setup failed: {0}")]
    Setup(String),

    #[error("no usable secret key for {0}")]
    KeyNotFound(String),

    #[error("engine operation failed: {0}")]
    Operation(#[from] gpgme::Error),
}

/// One worker's live engine state: a context bound to the target secret key
/// with a passphrase provider attached. Never shared between workers.
pub trait Session {
    /// Performs one protected operation. The engine invokes the passphrase
    /// provider once per call, so retrying a rejected candidate means
    /// issuing a fresh attempt.
    fn attempt(&mut self) -> Result<Attempt, EngineError>;

    /// The candidate consumed by the most recent attempt, if any.
    fn last_candidate(&mut self) -> Option<Vec<u8>>;
}

pub trait Engine {
    type Session: Session;

    /// Opens a session bound to the run's target key, with a passphrase
    /// provider drawing from the run's candidate cursor. Failures abort the
    /// calling worker only, never the whole run.
    fn open_session(&self, run: &RunContext) -> Result<Self::Session, EngineError>;
}
