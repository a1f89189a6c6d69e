//! operate - main entry point
//!
//! Parses the command line, provisions the logger and drives operator-sdk and
//! the container runtime for the project described in the settings file.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use operate::cli::{Cli, Commands};
use operate::installer::ReleaseInstaller;
use operate::{Operator, OperateError, ProcessRunner, logging, process_guard, sanity};

fn main() -> ExitCode {
    if let Err(e) = sanity::verify_environment() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse_args();
    logging::get_logger(Some(cli.verbosity()));

    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A failed external command ends the process with its own code.
            if let Some(code) = e.downcast_ref::<OperateError>().and_then(OperateError::exit_code) {
                std::process::exit(code);
            }
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!("{:?}", std::env::args().collect::<Vec<_>>());
    debug!("verbose: {}", cli.verbose);

    let Some(command) = cli.command else {
        return Ok(());
    };

    let mut operator = Operator::load(&cli.settings)
        .with_context(|| format!("Cannot set up operator from {:?}", cli.settings))?;

    match command {
        Commands::Init {
            sdk_version,
            skip_install,
        } => {
            if !skip_install {
                let installer = ReleaseInstaller::new(ProcessRunner::new());
                operator.install_operator_sdk(&installer, &sdk_version)?;
            }
            operator.initialize_operator()?;
        }
        Commands::Build { tag_extension } => {
            let reference = operator.build_operator(tag_extension.as_deref())?;
            println!("{}", reference);
        }
        Commands::Show => {
            println!("{}", operator.settings());
            println!("runtime: {}", operator.runtime());
        }
    }

    Ok(())
}
