//! Process lifecycle management for child processes
//!
//! Every external command is spawned in its own process group and its PID is
//! tracked in a global registry, so that:
//! - an abandoned output stream can kill the whole command tree
//! - SIGINT/SIGTERM/SIGHUP on operate terminates running children first
//! - a child receives SIGTERM if operate itself dies

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Time running commands get to exit after SIGTERM on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// PIDs of running commands, each the leader of its own process group.
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
}

impl ChildRegistry {
    /// The process-wide registry.
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a child in the global registry.
    pub fn track(pid: u32) {
        if let Ok(mut registry) = Self::global().lock() {
            registry.register(pid);
        }
    }

    /// Remove a child from the global registry.
    pub fn untrack(pid: u32) {
        if let Ok(mut registry) = Self::global().lock() {
            registry.unregister(pid);
        }
    }

    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        debug!("Tracking command PID {}", pid);
    }

    /// Forget a child once it has been reaped.
    pub fn unregister(&mut self, pid: u32) {
        if self.pids.remove(&pid) {
            debug!("Released command PID {}", pid);
        }
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Stop every tracked command tree: SIGTERM to each process group, then
    /// SIGKILL to those still running after `grace_period`.
    ///
    /// The registry is emptied, so a second call has nothing to do.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        let mut running: Vec<u32> = self.pids.drain().collect();
        if running.is_empty() {
            return;
        }
        info!("Stopping {} running command(s)", running.len());

        for &pid in &running {
            signal_tree(pid, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        loop {
            running.retain(|&pid| is_process_alive(pid));
            if running.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        for pid in running {
            warn!("Command PID {} outlived SIGTERM, killing it", pid);
            signal_tree(pid, Signal::SIGKILL);
        }
    }
}

/// Send a signal to the process group led by `pgid`.
///
/// Reaches grandchildren too (e.g. the container build an `operator-sdk`
/// invocation started).
pub fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::killpg(Pid::from_raw(pgid as i32), signal)
}

/// Group first; a leader that never got its own group still gets the signal.
fn signal_tree(pid: u32, sig: Signal) {
    let result = signal_group(pid, sig).or_else(|_| signal::kill(Pid::from_raw(pid as i32), sig));
    if let Err(err) = result {
        debug!("{} to PID {} failed: {}", sig, pid, err);
    }
}

/// Running, as opposed to gone or a zombie waiting to be reaped.
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => !matches!(process_state(&stat), Some("Z" | "X")),
        Err(_) => true,
    }
}

/// State letter of a `/proc/<pid>/stat` line. The command name in
/// parentheses may itself contain spaces or `)`.
fn process_state(stat: &str) -> Option<&str> {
    stat.rsplit_once(')')?.1.split_whitespace().next()
}

/// Stop running commands and exit with `128 + signal` on SIGINT, SIGTERM or
/// SIGHUP. Call once at startup.
pub fn init_signal_handlers() -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                let name = Signal::try_from(sig).map(Signal::as_str).unwrap_or("signal");
                warn!("Interrupted by {}", name);

                if let Ok(mut registry) = ChildRegistry::global().lock() {
                    registry.terminate_all(SHUTDOWN_GRACE);
                }
                std::process::exit(128 + sig);
            }
        })?;

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    /// This allows us to kill the entire process tree with a single signal
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;

        // PGID = child PID
        self.process_group(0);

        // Child dies with us instead of outliving operate
        #[cfg(target_os = "linux")]
        {
            // SAFETY: prctl is async-signal-safe and touches no parent state.
            unsafe {
                self.pre_exec(|| {
                    if nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGTERM) == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        self
    }
}
