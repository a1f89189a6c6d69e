//! operate library
//!
//! Drives the Operator SDK to build and bundle Ansible operators. External
//! tools are run through [`runner::Runner`], which streams their output into
//! the process-wide logger from [`logging`].

pub mod cli;
pub mod error;
pub mod installer;
pub mod logging;
pub mod operator;
pub mod process_guard;
pub mod runner;
pub mod runtime;
pub mod sanity;
pub mod settings;

// Re-export main types for convenience
pub use error::{OperateError, Result};
pub use installer::{ReleaseInstaller, SdkInstaller, SdkPaths};
pub use logging::{Logger, Severity, get_logger};
pub use operator::Operator;
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use runner::{FailurePolicy, Lines, ProcessRunner, Runner};
pub use runtime::{ContainerRuntime, detect_runtime};
pub use settings::{DEFAULT_SETTINGS_FILE, OperatorSettings};
