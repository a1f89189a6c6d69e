use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

use crate::installer::LATEST;
use crate::settings::DEFAULT_SETTINGS_FILE;

/// Build and push Operator Framework-based Ansible operators and OLM bundles
#[derive(Parser, Debug)]
#[command(name = "operate")]
#[command(about = "Build and push Operator Framework-based Ansible operators and OLM bundles")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (specify multiple times for more).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Operator settings file
    #[arg(short = 'f', long = "file", global = true, default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Install operator-sdk, scaffold the project and create an API per Kind
    Init {
        /// operator-sdk release to install
        #[arg(long, default_value = LATEST)]
        sdk_version: String,

        /// Use the operator-sdk already on PATH
        #[arg(long)]
        skip_install: bool,
    },
    /// Build the operator image with the detected container runtime
    Build {
        /// Extend the image tag with an identifier.
        #[arg(short, long)]
        tag_extension: Option<String>,
    },
    /// Print the loaded settings and the detected container runtime
    Show,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Verbosity as the logger understands it (3 and above are the same).
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }
}
