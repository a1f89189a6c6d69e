//! Test helper binary for process exit integration tests
//!
//! Runs one command through `ProcessRunner`, echoes every line it yields, and
//! turns a fatal command failure into a process exit the same way `operate`
//! does.
//!
//! Usage:
//!   runner_exit_helper <fail|warn> <command>

use std::env;

use operate::{FailurePolicy, ProcessRunner, Runner};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <fail|warn> <command>", args[0]);
        std::process::exit(64);
    }

    let policy = match args[1].as_str() {
        "fail" => FailurePolicy::Fail,
        "warn" => FailurePolicy::Warn,
        other => {
            eprintln!("Unknown policy: {}", other);
            std::process::exit(64);
        }
    };

    operate::get_logger(Some(3));

    let lines = match ProcessRunner::new().run(&args[2], policy) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(65);
        }
    };

    for line in lines {
        match line {
            Ok(line) => println!("line: {}", line),
            Err(e) => match e.exit_code() {
                Some(code) => std::process::exit(code),
                None => {
                    eprintln!("{}", e);
                    std::process::exit(65);
                }
            },
        }
    }

    println!("DONE");
}
