//! gpg-agent passphrase-cache suspension.
//!
//! A cached passphrase would satisfy signing attempts without consulting
//! our provider and mask the real outcome, so the agent's
//! `default-cache-ttl` is forced to 0 for the run and the previous value is
//! put back afterwards. This is an advisory side effect: every failure here
//! is logged and the run proceeds regardless.

use log::{debug, warn};
use std::io::{self, Write};
use std::process::{Command, Stdio};

const OPTION: &str = "default-cache-ttl";

/// gpgconf change-request flag that resets an option to its default.
const FLAG_DEFAULT: &str = "16";

/// Restores the agent's previous `default-cache-ttl` when dropped, so the
/// value comes back on every exit path, found or not.
pub struct AgentCacheGuard {
    saved: Option<String>,
    engaged: bool,
}

impl AgentCacheGuard {
    /// Reads the current TTL and sets it to 0.
    pub fn suspend() -> Self {
        let saved = read_cache_ttl();
        match &saved {
            Some(value) => debug!("gpg-agent {OPTION} is {value:?}"),
            None => debug!("gpg-agent {OPTION} is unset"),
        }

        match write_cache_ttl(Some("0")) {
            Ok(()) => {
                debug!("gpg-agent {OPTION} set to 0 for the run");
                AgentCacheGuard {
                    saved,
                    engaged: true,
                }
            }
            Err(err) => {
                warn!("could not suspend gpg-agent passphrase caching: {err}");
                AgentCacheGuard {
                    saved: None,
                    engaged: false,
                }
            }
        }
    }
}

impl Drop for AgentCacheGuard {
    fn drop(&mut self) {
        if !self.engaged {
            return;
        }
        match write_cache_ttl(self.saved.as_deref()) {
            Ok(()) => debug!("gpg-agent {OPTION} restored"),
            Err(err) => warn!("could not restore gpg-agent {OPTION}: {err}"),
        }
    }
}

/// Current value of the option, or `None` when unset (or when gpgconf is
/// unavailable).
fn read_cache_ttl() -> Option<String> {
    let output = Command::new("gpgconf")
        .args(["--list-options", "gpg-agent"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_option_value(&String::from_utf8_lossy(&output.stdout), OPTION)
}

/// Applies a new value through `gpgconf --change-options`; `None` resets the
/// option to its default.
fn write_cache_ttl(value: Option<&str>) -> io::Result<()> {
    let request = change_request(OPTION, value);

    let mut child = Command::new("gpgconf")
        .args(["--runtime", "--change-options", "gpg-agent"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    child
        .stdin
        .as_mut()
        .expect("stdin was piped")
        .write_all(request.as_bytes())?;

    let status = child.wait()?;
    if !status.success() {
        return Err(io::Error::other(format!("gpgconf exited with {status}")));
    }
    Ok(())
}

/// Pulls one option's current value out of a `gpgconf --list-options`
/// listing. The value is the last colon-separated field; an empty field
/// means the option is unset.
fn parse_option_value(listing: &str, option: &str) -> Option<String> {
    let line = listing
        .lines()
        .find(|line| line.split(':').next() == Some(option))?;
    let value = line.rsplit(':').next().unwrap_or("");
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// One `name:flags:value` line for `gpgconf --change-options`.
fn change_request(option: &str, value: Option<&str>) -> String {
    match value {
        Some(value) if !value.is_empty() => format!("{option}:0:{value}\n"),
        _ => format!("{option}:{FLAG_DEFAULT}:\n"),
    }
}
