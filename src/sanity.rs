//! Pre-flight sanity checks for the runtime environment
//!
//! Verified before anything else runs:
//! - the host is Unix-like (process groups, `/dev/log`, symlinked installs)
//! - `$HOME` is set, since operator-sdk is installed beneath it
//!
//! If any check fails, the program exits with a clear error message.

use crate::error::{OperateError, Result};

/// Refuse to run on hosts that are not Unix-like.
pub fn ensure_supported_platform() -> Result<()> {
    check_family(std::env::consts::FAMILY, std::env::consts::OS)
}

fn check_family(family: &str, os: &str) -> Result<()> {
    if family == "unix" {
        Ok(())
    } else {
        Err(OperateError::UnsupportedPlatform(os.to_string()))
    }
}

/// Require `$HOME`.
pub fn ensure_home() -> Result<()> {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Ok(()),
        _ => Err(OperateError::MissingHome),
    }
}

/// Run every startup check.
pub fn verify_environment() -> Result<()> {
    ensure_supported_platform()?;
    ensure_home()
}
