//! GPGME-backed engine.
//!
//! A candidate only "tests" against the key by way of a real protected
//! operation: each attempt produces a detached signature over a fixed
//! payload, with loopback pinentry routing the passphrase request to our
//! provider. A rejected candidate surfaces as `GPG_ERR_BAD_PASSPHRASE`,
//! which is the loop signal, not a failure.

use gpgme::{
    Context, Data, DeleteKeyFlags, KeyListMode, PassphraseProvider, PassphraseRequest,
    PinentryMode, Protocol,
};
use log::debug;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::cracker::RunContext;
use crate::engine::{Attempt, Engine, EngineError, Session};
use crate::error::{CrackError, Result};
use crate::reader::CandidateCursor;

/// Payload signed on every attempt. Anything works; the signature is thrown
/// away and only the unlock outcome matters.
const SIGNING_PAYLOAD: &[u8] = b"test";

pub struct GpgEngine;

impl GpgEngine {
    /// Initializes GPGME and confirms the installed gpg supports OpenPGP.
    pub fn new() -> std::result::Result<Self, EngineError> {
        gpgme::init()
            .check_engine_version(Protocol::OpenPgp)
            .map_err(|err| EngineError::Setup(format!("OpenPGP engine check failed: {err}")))?;
        Ok(GpgEngine)
    }
}

impl Engine for GpgEngine {
    type Session = GpgSession;

    fn open_session(&self, run: &RunContext) -> std::result::Result<GpgSession, EngineError> {
        let mut ctx = Context::from_protocol(Protocol::OpenPgp)
            .map_err(|err| EngineError::Setup(format!("context creation failed: {err}")))?;

        // Loopback pinentry routes passphrase requests to our provider
        // instead of an interactive prompt.
        ctx.set_pinentry_mode(PinentryMode::Loopback)
            .map_err(|err| EngineError::Setup(format!("pinentry loopback mode: {err}")))?;

        ctx.set_key_list_mode(KeyListMode::LOCAL | KeyListMode::WITH_SECRET)
            .map_err(|err| EngineError::Setup(format!("keylist mode: {err}")))?;

        let key = ctx
            .get_secret_key(run.fingerprint.as_str())
            .map_err(|_| EngineError::KeyNotFound(run.fingerprint.clone()))?;

        ctx.add_signer(&key)
            .map_err(|err| EngineError::Setup(format!("adding signing key: {err}")))?;

        Ok(GpgSession {
            ctx,
            cursor: Arc::clone(&run.cursor),
            fed: Arc::new(Mutex::new(None)),
        })
    }
}

pub struct GpgSession {
    ctx: Context,
    cursor: Arc<CandidateCursor>,
    fed: Arc<Mutex<Option<Vec<u8>>>>,
}

impl Session for GpgSession {
    fn attempt(&mut self) -> std::result::Result<Attempt, EngineError> {
        *self.fed.lock().unwrap() = None;
        let provider = CandidateFeed {
            cursor: AssertUnwindSafe(Arc::clone(&self.cursor)),
            fed: Arc::clone(&self.fed),
        };

        let mut signature = Vec::new();
        let outcome = self
            .ctx
            .with_passphrase_provider(provider, |ctx| {
                ctx.sign_detached(SIGNING_PAYLOAD, &mut signature)
            });

        match outcome {
            Ok(_) => Ok(Attempt::Unlocked),
            Err(err) if err.code() == gpgme::Error::BAD_PASSPHRASE.code() => {
                Ok(Attempt::WrongPassphrase)
            }
            Err(err) if err.code() == gpgme::Error::CANCELED.code() => Ok(Attempt::Exhausted),
            Err(err) => Err(EngineError::Operation(err)),
        }
    }

    fn last_candidate(&mut self) -> Option<Vec<u8>> {
        self.fed.lock().unwrap().take()
    }
}

/// Passphrase provider feeding wordlist candidates to the engine. Invoked
/// once per signing attempt; signals `GPG_ERR_CANCELED` when the cursor is
/// exhausted, which the session reports as `Attempt::Exhausted`.
struct CandidateFeed {
    // Cursor state is mutex- and atomic-guarded.
    cursor: AssertUnwindSafe<Arc<CandidateCursor>>,
    fed: Arc<Mutex<Option<Vec<u8>>>>,
}

impl PassphraseProvider for CandidateFeed {
    fn get_passphrase(
        &mut self,
        _request: PassphraseRequest<'_>,
        out: &mut dyn Write,
    ) -> gpgme::Result<()> {
        match self.cursor.next() {
            Some(candidate) => {
                out.write_all(&candidate)?;
                *self.fed.lock().unwrap() = Some(candidate);
                Ok(())
            }
            None => Err(gpgme::Error::CANCELED),
        }
    }
}

/// The target secret key: either imported from a file for the run's
/// duration, or already present in the local keyring.
pub struct KeySource {
    pub fingerprint: String,
    pub imported: bool,
}

impl KeySource {
    /// Treats `target` as a key file iff the path exists, otherwise as a
    /// fingerprint of a key already in the local keyring.
    pub fn resolve(target: &str) -> Result<KeySource> {
        if Path::new(target).exists() {
            let fingerprint = import_secret_key(target)?;
            Ok(KeySource {
                fingerprint,
                imported: true,
            })
        } else {
            Ok(KeySource {
                fingerprint: target.to_string(),
                imported: false,
            })
        }
    }

    /// Deletes the key from the keyring again. Only meaningful after an
    /// import; callers decide what to do with failures.
    pub fn remove(&self) -> std::result::Result<(), EngineError> {
        let mut ctx = Context::from_protocol(Protocol::OpenPgp)
            .map_err(|err| EngineError::Setup(format!("context creation failed: {err}")))?;
        let key = ctx
            .get_secret_key(self.fingerprint.as_str())
            .map_err(|_| EngineError::KeyNotFound(self.fingerprint.clone()))?;
        ctx.delete_key_with_flags(&key, DeleteKeyFlags::ALLOW_SECRET | DeleteKeyFlags::FORCE)
            .map_err(EngineError::Operation)?;
        Ok(())
    }
}

/// Imports the secret key file into the local keyring and returns its
/// fingerprint. The file must contain exactly one key, with secret material.
fn import_secret_key(path: &str) -> Result<String> {
    let import_err = |reason: String| CrackError::Import {
        path: path.to_string(),
        reason,
    };

    let mut ctx = Context::from_protocol(Protocol::OpenPgp)
        .map_err(|err| import_err(format!("context creation failed: {err}")))?;

    let data = Data::load(path).map_err(|err| import_err(format!("loading key file: {err}")))?;

    let result = ctx
        .import(data)
        .map_err(|err| import_err(format!("import failed: {err}")))?;

    debug!(
        "import: considered {}, imported {}, secret imported {}, unchanged {}",
        result.considered(),
        result.imported(),
        result.secret_imported(),
        result.unchanged()
    );

    if result.imported() != 1 {
        return Err(import_err(format!(
            "key file must contain exactly one key, found {}",
            result.imported()
        )));
    }
    if result.secret_imported() != 1 {
        return Err(import_err("key file only contains public key".to_string()));
    }

    let fingerprint = result
        .imports()
        .next()
        .and_then(|import| import.fingerprint().ok())
        .map(str::to_owned)
        .ok_or_else(|| import_err("imported key has no fingerprint".to_string()))?;

    debug!("imported secret key {fingerprint}");
    Ok(fingerprint)
}
