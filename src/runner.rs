//! Streaming execution of external commands
//!
//! All external tools (`which`, `operator-sdk`, `curl`, the container
//! runtime) run through a [`Runner`]. A command string is split with shell
//! word rules, spawned with stdout and stderr merged onto one pipe, and its
//! output is handed back line by line as the child writes it.
//!
//! # Exit policy
//!
//! Once the output is exhausted the child is reaped and its status checked:
//!
//! - `FailurePolicy::Fail`: a non-zero exit is logged at ERROR and the final
//!   item is `Err(OperateError::CommandFailed)`. The binary turns that error
//!   into a process exit with the child's code.
//! - `FailurePolicy::Warn`: a non-zero exit is logged at WARNING and the
//!   stream simply ends.
//!
//! # Abandonment
//!
//! Dropping [`Lines`] before it is exhausted kills the child's process group
//! and reaps it. The exit status of an abandoned command is ignored.

use std::io::{BufRead, BufReader, PipeReader};
use std::iter::FusedIterator;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};

use nix::sys::signal::Signal;
use tracing::{debug, error, warn};

use crate::error::{OperateError, Result};
use crate::process_guard::{self, ChildRegistry, CommandProcessGroup};

/// What to do when a command exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log at ERROR and end the stream with `CommandFailed`.
    #[default]
    Fail,
    /// Log at WARNING and end the stream normally.
    Warn,
}

/// Something that can run a command and stream its output.
pub trait Runner {
    /// Output lines, ending with an error under `FailurePolicy::Fail`.
    type Lines: Iterator<Item = Result<String>>;

    /// Start `command` and return its output stream.
    fn run(&self, command: &str, policy: FailurePolicy) -> Result<Self::Lines>;

    /// Run `command` to completion and collect its output.
    fn run_all(&self, command: &str, policy: FailurePolicy) -> Result<Vec<String>> {
        self.run(command, policy)?.collect()
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Runner for ProcessRunner {
    type Lines = Lines;

    fn run(&self, command: &str, policy: FailurePolicy) -> Result<Lines> {
        debug!("Running: {}", command);
        let argv = split_command(command)?;

        // One pipe for both streams so output keeps its interleaving
        let (reader, writer) = std::io::pipe()?;
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer)
            .in_new_process_group();

        let child = cmd.spawn().map_err(|source| OperateError::Spawn {
            command: command.to_string(),
            source,
        })?;
        // Our copies of the write end must close or EOF never arrives.
        drop(cmd);

        ChildRegistry::track(child.id());

        Ok(Lines {
            command: command.to_string(),
            policy,
            child: Some(child),
            reader: BufReader::new(reader),
            buf: Vec::new(),
            done: false,
        })
    }
}

/// Split a command string into argv using POSIX shell word rules.
///
/// Quotes and backslash escapes are honoured; nothing is expanded.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    match shlex::split(command) {
        Some(argv) if !argv.is_empty() => Ok(argv),
        _ => Err(OperateError::InvalidCommand(command.to_string())),
    }
}

/// Quote `word` so it survives [`split_command`] as a single argument.
pub fn quote(word: &str) -> Result<String> {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .map_err(|_| OperateError::InvalidCommand(word.to_string()))
}

/// Lazy, single-pass output of one running command.
///
/// Owns the child. Exhausting it reaps the child and applies the
/// [`FailurePolicy`]; dropping it early kills the child.
#[derive(Debug)]
pub struct Lines {
    command: String,
    policy: FailurePolicy,
    child: Option<Child>,
    reader: BufReader<PipeReader>,
    buf: Vec<u8>,
    done: bool,
}

impl Lines {
    /// The command this stream belongs to.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// PID of the child, while it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn finish(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait();
        ChildRegistry::untrack(child.id());

        let code = exit_code(status?);
        if code == 0 {
            return Ok(());
        }

        match self.policy {
            FailurePolicy::Fail => {
                error!("Command errored: {}", self.command);
                Err(OperateError::CommandFailed {
                    command: self.command.clone(),
                    code,
                })
            }
            FailurePolicy::Warn => {
                warn!("Command returned {}: {}", code, self.command);
                Ok(())
            }
        }
    }

    fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        debug!("Abandoned output of {}, killing PID {}", self.command, pid);
        if process_guard::signal_group(pid, Signal::SIGKILL).is_err() {
            let _ = child.kill();
        }
        let _ = child.wait();
        ChildRegistry::untrack(pid);
    }
}

impl Iterator for Lines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                self.finish().err().map(Err)
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&self.buf).trim_end().to_string();
                debug!("Line:    {}", line);
                Some(Ok(line))
            }
            Err(e) => {
                self.done = true;
                self.kill();
                Some(Err(e.into()))
            }
        }
    }
}

impl FusedIterator for Lines {}

impl Drop for Lines {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Exit code of a finished child; death by signal N reads as 128 + N.
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

/// Scripted runner for unit tests: records every command and replays
/// canned output.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Default)]
    pub(crate) struct FakeRunner {
        scripts: Vec<(String, Vec<String>, i32)>,
        served: Option<Vec<u8>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Commands starting with `prefix` print `lines` and exit with `code`.
        pub(crate) fn script(mut self, prefix: &str, lines: &[&str], code: i32) -> Self {
            self.scripts.push((
                prefix.to_string(),
                lines.iter().map(|l| l.to_string()).collect(),
                code,
            ));
            self
        }

        /// Commands with `-o <file>` write `content` to that file, even when they fail.
        pub(crate) fn serves(mut self, content: &[u8]) -> Self {
            self.served = Some(content.to_vec());
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl Runner for FakeRunner {
        type Lines = std::vec::IntoIter<Result<String>>;

        fn run(&self, command: &str, policy: FailurePolicy) -> Result<Self::Lines> {
            let argv = split_command(command)?;
            self.calls.borrow_mut().push(command.to_string());

            if let Some(content) = &self.served {
                let output = argv.windows(2).find(|pair| pair[0] == "-o").map(|pair| &pair[1]);
                if let Some(path) = output.filter(|path| path.as_str() != "/dev/null") {
                    std::fs::write(path, content)?;
                }
            }

            let (lines, code) = self
                .scripts
                .iter()
                .find(|(prefix, _, _)| command.starts_with(prefix.as_str()))
                .map(|(_, lines, code)| (lines.clone(), *code))
                .unwrap_or_default();

            let mut items: Vec<Result<String>> = lines.into_iter().map(Ok).collect();
            if code != 0 && policy == FailurePolicy::Fail {
                items.push(Err(OperateError::CommandFailed {
                    command: command.to_string(),
                    code,
                }));
            }
            Ok(items.into_iter())
        }
    }
}
