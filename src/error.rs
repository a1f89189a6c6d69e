//! Error handling module for operate
//!
//! Provides centralized error handling with proper error types using thiserror.
//! A failed external command is the one "fatal" class: it carries the child's
//! exit code so the binary can terminate with it.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for operate
#[derive(Error, Debug)]
pub enum OperateError {
    /// IO errors (pipes, permissions, symlinks)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file could not be read
    #[error("Failed to read settings from {path:?}: {source}")]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not a valid settings document
    #[error("Failed to parse settings in {path:?}: {source}")]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Settings are missing a value an operation needs
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command string that cannot be split into arguments
    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),

    /// The external command could not be started at all
    #[error("Failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command exited non-zero under the fail policy
    #[error("Command errored with exit code {code}: {command}")]
    CommandFailed { command: String, code: i32 },

    /// Neither docker nor podman is usable on this host
    #[error("Unable to identify a container runtime!")]
    NoRuntime,

    /// Host operating system is not Unix-like
    #[error("operate is designed only for Unix-like systems, not {0}")]
    UnsupportedPlatform(String),

    /// $HOME is not set
    #[error("HOME is not set; cannot locate the operator-sdk install directory")]
    MissingHome,

    /// operator-sdk installation failed
    #[error("Install error: {0}")]
    Install(String),
}

/// Result type alias for operate operations
pub type Result<T> = std::result::Result<T, OperateError>;

impl OperateError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Exit code the whole process should terminate with, if this error is fatal.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}
