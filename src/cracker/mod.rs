//! The concurrent cracking run: shared run state, the per-worker attempt
//! loop, and first-success resolution.

use log::{debug, warn};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::engine::{Attempt, Engine, Session};
use crate::reader::CandidateCursor;

/// Everything the workers share for one run. Owned by the coordinator;
/// workers borrow it for the run's duration.
pub struct RunContext {
    pub cursor: Arc<CandidateCursor>,
    pub register: ResultRegister,
    pub fingerprint: String,
    pub started: Instant,
}

impl RunContext {
    pub fn new(cursor: CandidateCursor, fingerprint: String) -> Self {
        RunContext {
            cursor: Arc::new(cursor),
            register: ResultRegister::new(),
            fingerprint,
            started: Instant::now(),
        }
    }
}

/// The winning candidate and when it was found.
#[derive(Debug)]
pub struct Discovery {
    pub passphrase: Vec<u8>,
    pub found_at: Instant,
}

/// Set-once slot for the first successful passphrase. `OnceLock::set` is a
/// single atomic set-if-empty, so two workers succeeding at the same time
/// cannot both record: the first writer wins and the loser's candidate is
/// dropped.
#[derive(Debug, Default)]
pub struct ResultRegister(OnceLock<Discovery>);

impl ResultRegister {
    pub fn new() -> Self {
        ResultRegister(OnceLock::new())
    }

    /// Records the passphrase unless another worker already did. Returns
    /// whether this call was the winner.
    pub fn publish(&self, passphrase: Vec<u8>) -> bool {
        self.0
            .set(Discovery {
                passphrase,
                found_at: Instant::now(),
            })
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn get(&self) -> Option<&Discovery> {
        self.0.get()
    }

    pub fn into_inner(self) -> Option<Discovery> {
        self.0.into_inner()
    }
}

/// What a finished run reports back.
#[derive(Debug)]
pub struct RunReport {
    pub passphrase: Option<Vec<u8>>,
    pub attempts: u64,
    pub elapsed: Duration,
}

/// Runs `workers` parallel workers against the run context and blocks until
/// every one of them has finished.
pub fn crack<E: Engine + Sync>(engine: &E, run: RunContext, workers: usize) -> RunReport {
    thread::scope(|scope| {
        for id in 0..workers.max(1) {
            let run = &run;
            scope.spawn(move || run_worker(id, engine, run));
        }
    });

    run.cursor.finish();
    let attempts = run.cursor.attempts();
    let started = run.started;

    match run.register.into_inner() {
        Some(found) => RunReport {
            attempts,
            elapsed: found.found_at.duration_since(started),
            passphrase: Some(found.passphrase),
        },
        None => RunReport {
            attempts,
            elapsed: started.elapsed(),
            passphrase: None,
        },
    }
}

/// One worker's life: open a session, then attempt candidates until the key
/// unlocks, the wordlist runs dry, another worker wins, or the engine fails.
/// Every failure is contained to this worker.
fn run_worker<E: Engine>(id: usize, engine: &E, run: &RunContext) {
    let mut session = match engine.open_session(run) {
        Ok(session) => session,
        Err(err) => {
            warn!("worker {id}: {err}");
            return;
        }
    };
    debug!("worker {id}: session ready");

    loop {
        match session.attempt() {
            Ok(Attempt::Unlocked) => {
                match session.last_candidate() {
                    Some(passphrase) => {
                        if !run.register.publish(passphrase) {
                            debug!("worker {id}: lost the publication race, discarding");
                        }
                    }
                    // Unlocked without a candidate being fed: the key is
                    // unprotected or the agent answered from cache.
                    None => debug!("worker {id}: operation succeeded without a candidate"),
                }
                return;
            }
            Ok(Attempt::WrongPassphrase) => {
                if run.register.is_set() {
                    debug!("worker {id}: passphrase already found, stopping");
                    return;
                }
            }
            Ok(Attempt::Exhausted) => {
                debug!("worker {id}: wordlist exhausted");
                return;
            }
            Err(err) => {
                warn!("worker {id}: {err}");
                return;
            }
        }
    }
}
