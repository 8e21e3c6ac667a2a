use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{CrackError, Result};

/// Shared cursor over the wordlist. Every line, terminator included, is one
/// candidate passphrase; each candidate is handed to exactly one caller, in
/// file order. Once the stream is drained every further read reports
/// exhaustion.
pub struct CandidateCursor {
    stream: Mutex<Option<BufReader<File>>>,
    attempts: AtomicU64,
    progress: ProgressBar,
}

impl CandidateCursor {
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|source| CrackError::Wordlist {
            path: path.to_string(),
            source,
        })?;

        let total = count_candidates(&file, path)?;

        let pb = ProgressBar::new(total);
        pb.set_style(ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} attempts/s)")
            .unwrap()
            .progress_chars("#>-"));

        Ok(CandidateCursor {
            stream: Mutex::new(Some(BufReader::new(file))),
            attempts: AtomicU64::new(0),
            progress: pb,
        })
    }

    /// Hands out the next unread candidate, or `None` once the wordlist is
    /// exhausted. The line terminator is preserved: wordlists are fed to the
    /// engine byte-for-byte, untrimmed.
    pub fn next(&self) -> Option<Vec<u8>> {
        let mut stream = self.stream.lock().unwrap();
        let reader = stream.as_mut()?;

        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                *stream = None;
                None
            }
            Ok(_) => {
                self.attempts.fetch_add(1, Ordering::Relaxed);
                self.progress.inc(1);
                Some(line)
            }
            Err(err) => {
                warn!("wordlist read failed: {err}");
                *stream = None;
                None
            }
        }
    }

    /// Total candidates handed out so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.progress.finish_and_clear();
    }
}

/// Counts wordlist lines up front so the progress bar has a length. A final
/// line without a terminator still counts.
fn count_candidates(file: &File, path: &str) -> Result<u64> {
    let len = file
        .metadata()
        .map_err(|source| CrackError::Wordlist {
            path: path.to_string(),
            source,
        })?
        .len();
    if len == 0 {
        return Ok(0);
    }

    let mmap = unsafe {
        Mmap::map(file).map_err(|source| CrackError::Wordlist {
            path: path.to_string(),
            source,
        })?
    };

    let mut total = mmap.par_iter().filter(|&&b| b == b'\n').count() as u64;
    if mmap[mmap.len() - 1] != b'\n' {
        total += 1;
    }
    Ok(total)
}
