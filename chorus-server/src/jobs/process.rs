//! Worker process control
//!
//! The registry never touches `std::process` directly: it goes through
//! [`ProcessLauncher`] and [`ProcessHandle`], so tests can substitute fake
//! processes with scripted exit codes.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tracing::debug;

/// Liveness of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exit code, `None` when terminated by a signal
    Exited(Option<i32>),
}

/// Handle to one launched worker
pub trait ProcessHandle: Send + Sync + Debug {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness check
    fn poll(&self) -> io::Result<ProcessState>;

    /// Request graceful termination (SIGTERM on Unix)
    fn terminate(&self) -> io::Result<()>;

    /// Force termination
    fn kill(&self) -> io::Result<()>;
}

/// Everything needed to start one worker
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    /// Arguments before `--config <path>`
    pub args: Vec<String>,
    pub config_path: PathBuf,
    /// stdout and stderr are appended here
    pub log_path: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl LaunchSpec {
    /// Full argument vector, ending with `--config <path>`
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push("--config".to_string());
        argv.push(self.config_path.display().to_string());
        argv
    }
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn ProcessHandle>>;
}

/// Launches real OS processes
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl ProcessLauncher for OsLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn ProcessHandle>> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        let log_err = log.try_clone()?;

        let mut command = Command::new(&spec.program);
        command
            .args(spec.argv())
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        debug!(pid = child.id(), program = %spec.program.display(), "Spawned worker");
        Ok(Arc::new(OsProcess::new(child)))
    }
}

/// A spawned child process
#[derive(Debug)]
pub struct OsProcess {
    pid: u32,
    child: Mutex<Child>,
}

impl OsProcess {
    pub fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: Mutex::new(child),
        }
    }
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&self) -> io::Result<ProcessState> {
        match self.child.lock().try_wait()? {
            Some(status) => Ok(ProcessState::Exited(status.code())),
            None => Ok(ProcessState::Running),
        }
    }

    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        // Held across kill(2) so the pid cannot be reaped and reused meanwhile
        let mut child = self.child.lock();
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        let pid = libc::pid_t::try_from(self.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                Ok(())
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&self) -> io::Result<()> {
        let mut child = self.child.lock();
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        match child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}
