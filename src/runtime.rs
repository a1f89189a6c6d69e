//! Container runtime detection
//!
//! Operator images are built with docker when it is installed, otherwise with
//! podman. `which` output that is a symbolic link does not count: emulation
//! shims (e.g. a `docker` link to podman) are skipped so the real engine is
//! selected.

use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, info};

use crate::error::{OperateError, Result};
use crate::runner::{FailurePolicy, Runner};

/// Supported container engines, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Binary name on `$PATH`.
    pub fn binary(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }

    /// Whether one line of `which` output points at this runtime.
    ///
    /// The link check runs on the literal path `which` printed, without
    /// resolving it first.
    fn matches(self, line: &str) -> bool {
        line.ends_with(&format!("/{}", self.binary())) && !is_symlink(line)
    }
}

fn is_symlink(path: &str) -> bool {
    Path::new(path)
        .symlink_metadata()
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Find the first usable container runtime.
///
/// Probes never abort the program: a failing `which` only logs a warning.
pub fn detect_runtime<R: Runner>(runner: &R) -> Result<ContainerRuntime> {
    for runtime in ContainerRuntime::iter() {
        let lookup = format!("which {}", runtime.binary());
        for line in runner.run(&lookup, FailurePolicy::Warn)? {
            let line = line?;
            if runtime.matches(&line) {
                info!("Using container runtime {} ({})", runtime, line);
                return Ok(runtime);
            }
            debug!("Skipping {} candidate {}", runtime, line);
        }
    }
    Err(OperateError::NoRuntime)
}
