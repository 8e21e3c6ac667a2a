//! GPG Passphrase Recovery Library
//!
//! Concurrent wordlist attack against the passphrase of a GPG secret key:
//! worker threads share one exactly-once candidate cursor and race signing
//! attempts through GPGME until the first candidate unlocks the key.

pub mod agent;
pub mod cracker;
pub mod engine;
pub mod error;
pub mod reader;

// Re-exports for convenience
pub use cracker::{crack, Discovery, ResultRegister, RunContext, RunReport};
pub use engine::{Attempt, Engine, EngineError, GpgEngine, KeySource, Session};
pub use error::{CrackError, Result};
pub use reader::CandidateCursor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
