//! Cracking-run tests - worker pool against a stub engine
//! The stub unlocks when the fed candidate matches its configured secret.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::NamedTempFile;

use gpg_crack::{
    crack, Attempt, CandidateCursor, Engine, EngineError, ResultRegister, RunContext, Session,
};

const FINGERPRINT: &str = "3CB8B4B3EFE4AD5EAAF30CC8E66AA862D324C776";

fn wordlist(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        file.write_all(line.as_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
}

fn run_context(file: &NamedTempFile) -> RunContext {
    let cursor = CandidateCursor::open(file.path().to_str().unwrap()).unwrap();
    RunContext::new(cursor, FINGERPRINT.to_string())
}

// ==================== STUB ENGINE ====================

/// Unlocks only for the configured secret; records every candidate any of
/// its sessions consumed.
struct StubEngine {
    secret: Option<Vec<u8>>,
    delivered: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl StubEngine {
    fn new(secret: Option<&str>) -> Self {
        StubEngine {
            secret: secret.map(|s| s.as_bytes().to_vec()),
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Engine for StubEngine {
    type Session = StubSession;

    fn open_session(&self, run: &RunContext) -> Result<StubSession, EngineError> {
        Ok(StubSession {
            cursor: Arc::clone(&run.cursor),
            secret: self.secret.clone(),
            delivered: Arc::clone(&self.delivered),
            last: None,
        })
    }
}

struct StubSession {
    cursor: Arc<CandidateCursor>,
    secret: Option<Vec<u8>>,
    delivered: Arc<Mutex<Vec<Vec<u8>>>>,
    last: Option<Vec<u8>>,
}

impl Session for StubSession {
    fn attempt(&mut self) -> Result<Attempt, EngineError> {
        match self.cursor.next() {
            Some(candidate) => {
                self.delivered.lock().unwrap().push(candidate.clone());
                let unlocked = self.secret.as_deref() == Some(candidate.as_slice());
                self.last = Some(candidate);
                Ok(if unlocked {
                    Attempt::Unlocked
                } else {
                    Attempt::WrongPassphrase
                })
            }
            None => Ok(Attempt::Exhausted),
        }
    }

    fn last_candidate(&mut self) -> Option<Vec<u8>> {
        self.last.take()
    }
}

// ==================== LITERAL SCENARIOS ====================

#[test]
fn test_found_with_two_workers() {
    let file = wordlist(&["wrong1\n", "correct\n", "wrong2\n"]);
    let engine = StubEngine::new(Some("correct\n"));

    let report = crack(&engine, run_context(&file), 2);

    assert_eq!(
        report.passphrase.as_deref(),
        Some(&b"correct\n"[..]),
        "the matching candidate must be reported"
    );
    assert!(report.attempts <= 3, "must stop early, got {} attempts", report.attempts);
}

#[test]
fn test_not_found_consumes_everything() {
    let file = wordlist(&["a\n", "b\n", "c\n"]);
    let engine = StubEngine::new(Some("nothere\n"));

    let report = crack(&engine, run_context(&file), 2);

    assert!(report.passphrase.is_none());
    assert_eq!(report.attempts, 3, "every candidate must be tried");
}

#[test]
fn test_empty_wordlist() {
    let file = wordlist(&[]);
    let engine = StubEngine::new(Some("anything\n"));

    let report = crack(&engine, run_context(&file), 4);

    assert!(report.passphrase.is_none());
    assert_eq!(report.attempts, 0);
}

// ==================== EXACTLY-ONCE CONSUMPTION ====================

#[test]
fn test_no_candidate_delivered_twice() {
    let lines: Vec<String> = (0..100).map(|i| format!("pw{:03}\n", i)).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let file = wordlist(&refs);
    let engine = StubEngine::new(None);

    let report = crack(&engine, run_context(&file), 8);

    assert!(report.passphrase.is_none());
    assert_eq!(report.attempts, 100);

    let mut delivered = engine.delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), 100, "sum over workers must equal the wordlist");
    delivered.sort();
    delivered.dedup();
    assert_eq!(delivered.len(), 100, "no candidate may be delivered twice");
}

// ==================== ORDER INDEPENDENCE ====================

#[test]
fn test_found_regardless_of_worker_count_and_position() {
    for workers in [1, 2, 8] {
        for position in [0, 19, 39] {
            let lines: Vec<String> = (0..40)
                .map(|i| {
                    if i == position {
                        "correct\n".to_string()
                    } else {
                        format!("wrong{:02}\n", i)
                    }
                })
                .collect();
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            let file = wordlist(&refs);
            let engine = StubEngine::new(Some("correct\n"));

            let report = crack(&engine, run_context(&file), workers);

            assert_eq!(
                report.passphrase.as_deref(),
                Some(&b"correct\n"[..]),
                "workers={} position={}",
                workers,
                position
            );
        }
    }
}

// ==================== FIRST-WRITER-WINS ====================

#[test]
fn test_register_keeps_first_writer() {
    let register = ResultRegister::new();
    assert!(register.publish(b"first\n".to_vec()));
    assert!(!register.publish(b"second\n".to_vec()), "second writer must lose");
    assert_eq!(register.get().unwrap().passphrase, b"first\n");
}

/// Every attempt unlocks, so concurrent workers all race to publish.
struct AlwaysUnlockEngine;

struct AlwaysUnlockSession {
    cursor: Arc<CandidateCursor>,
    last: Option<Vec<u8>>,
}

impl Engine for AlwaysUnlockEngine {
    type Session = AlwaysUnlockSession;

    fn open_session(&self, run: &RunContext) -> Result<AlwaysUnlockSession, EngineError> {
        Ok(AlwaysUnlockSession {
            cursor: Arc::clone(&run.cursor),
            last: None,
        })
    }
}

impl Session for AlwaysUnlockSession {
    fn attempt(&mut self) -> Result<Attempt, EngineError> {
        match self.cursor.next() {
            Some(candidate) => {
                self.last = Some(candidate);
                Ok(Attempt::Unlocked)
            }
            None => Ok(Attempt::Exhausted),
        }
    }

    fn last_candidate(&mut self) -> Option<Vec<u8>> {
        self.last.take()
    }
}

#[test]
fn test_simultaneous_successes_keep_exactly_one() {
    let candidates = ["one\n", "two\n", "three\n", "four\n"];
    let file = wordlist(&candidates);

    let report = crack(&AlwaysUnlockEngine, run_context(&file), 2);

    let found = report.passphrase.expect("one result must be retained");
    assert!(
        candidates.iter().any(|c| c.as_bytes() == found.as_slice()),
        "retained result must be a real candidate"
    );
}

// ==================== CONTAINED WORKER FAILURES ====================

/// The first session fails to open; later ones behave normally.
struct FirstOpenFailsEngine {
    opened: AtomicUsize,
    inner: StubEngine,
}

impl Engine for FirstOpenFailsEngine {
    type Session = StubSession;

    fn open_session(&self, run: &RunContext) -> Result<StubSession, EngineError> {
        if self.opened.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(EngineError::Setup("injected session fault".to_string()));
        }
        self.inner.open_session(run)
    }
}

#[test]
fn test_session_setup_failure_does_not_kill_the_run() {
    let file = wordlist(&["wrong\n", "correct\n"]);
    let engine = FirstOpenFailsEngine {
        opened: AtomicUsize::new(0),
        inner: StubEngine::new(Some("correct\n")),
    };

    let report = crack(&engine, run_context(&file), 2);

    assert_eq!(
        report.passphrase.as_deref(),
        Some(&b"correct\n"[..]),
        "surviving workers must finish the run"
    );
}

/// The first session errors on every attempt; later ones behave normally.
struct FirstSessionBrokenEngine {
    opened: AtomicUsize,
    inner: StubEngine,
}

struct MaybeBrokenSession {
    broken: bool,
    inner: StubSession,
}

impl Engine for FirstSessionBrokenEngine {
    type Session = MaybeBrokenSession;

    fn open_session(&self, run: &RunContext) -> Result<MaybeBrokenSession, EngineError> {
        Ok(MaybeBrokenSession {
            broken: self.opened.fetch_add(1, Ordering::SeqCst) == 0,
            inner: self.inner.open_session(run)?,
        })
    }
}

impl Session for MaybeBrokenSession {
    fn attempt(&mut self) -> Result<Attempt, EngineError> {
        if self.broken {
            return Err(EngineError::Setup("injected attempt fault".to_string()));
        }
        self.inner.attempt()
    }

    fn last_candidate(&mut self) -> Option<Vec<u8>> {
        self.inner.last_candidate()
    }
}

#[test]
fn test_attempt_failure_does_not_halt_siblings() {
    let file = wordlist(&["wrong\n", "correct\n"]);
    let engine = FirstSessionBrokenEngine {
        opened: AtomicUsize::new(0),
        inner: StubEngine::new(Some("correct\n")),
    };

    let report = crack(&engine, run_context(&file), 2);

    assert_eq!(report.passphrase.as_deref(), Some(&b"correct\n"[..]));
}
