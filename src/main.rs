use clap::Parser;
use log::{debug, warn};
use std::num::NonZeroUsize;
use std::process::ExitCode;

use gpg_crack::agent::AgentCacheGuard;
use gpg_crack::{crack, CandidateCursor, GpgEngine, KeySource, Result, RunContext};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Wordlist file, one candidate passphrase per line.
    #[arg(short = 'f', long)]
    wordlist: String,

    /// Number of parallel worker threads.
    #[arg(short, long, default_value = "1")]
    threads: NonZeroUsize,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Secret key file to import, or the fingerprint of a key already in
    /// the local keyring.
    key: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(default_level)
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the passphrase was found. Errors are pre-run fatal
/// failures only; everything after worker start is contained per worker.
fn run(args: &Args) -> Result<bool> {
    let engine = GpgEngine::new()?;

    let cursor = CandidateCursor::open(&args.wordlist)?;
    let key = KeySource::resolve(&args.key)?;
    debug!(
        "wordlist: {}, {}: {}",
        args.wordlist,
        if key.imported { "imported key" } else { "fingerprint" },
        key.fingerprint
    );

    // Suspend passphrase caching so the agent cannot answer attempts from
    // cache; the saved TTL comes back when the guard drops, found or not.
    let _cache = AgentCacheGuard::suspend();

    println!("Cracking started...");
    let context = RunContext::new(cursor, key.fingerprint.clone());
    let report = crack(&engine, context, args.threads.get());

    match &report.passphrase {
        Some(passphrase) => {
            println!(
                "\nFound passphrase: {}",
                String::from_utf8_lossy(passphrase)
            );
        }
        None => println!("\nPassphrase not found"),
    }
    println!(
        "{} attempts in {:.1} seconds",
        report.attempts,
        report.elapsed.as_secs_f64()
    );

    if key.imported {
        if let Err(err) = key.remove() {
            warn!("could not remove imported key {}: {err}", key.fingerprint);
        }
    }

    Ok(report.passphrase.is_some())
}
