//! Scripted process doubles
//!
//! `FakeLauncher` hands out `FakeProcess` handles whose exit is decided by
//! the test, so reconciliation can be checked without real subprocesses.

use chorus_server::jobs::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessState};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// A worker that runs until the test calls [`FakeProcess::exit`]
#[derive(Debug)]
pub struct FakeProcess {
    pid: u32,
    state: Mutex<ProcessState>,
    /// Exit immediately (as if by SIGTERM) when asked to terminate
    obeys_terminate: bool,
    terminate_calls: Mutex<usize>,
    kill_calls: Mutex<usize>,
}

impl FakeProcess {
    pub fn new(pid: u32, obeys_terminate: bool) -> Self {
        Self {
            pid,
            state: Mutex::new(ProcessState::Running),
            obeys_terminate,
            terminate_calls: Mutex::new(0),
            kill_calls: Mutex::new(0),
        }
    }

    pub fn exit(&self, code: i32) {
        *self.state.lock() = ProcessState::Exited(Some(code));
    }

    pub fn terminate_calls(&self) -> usize {
        *self.terminate_calls.lock()
    }

    pub fn kill_calls(&self) -> usize {
        *self.kill_calls.lock()
    }
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn poll(&self) -> io::Result<ProcessState> {
        Ok(*self.state.lock())
    }

    fn terminate(&self) -> io::Result<()> {
        *self.terminate_calls.lock() += 1;
        if self.obeys_terminate {
            let mut state = self.state.lock();
            if *state == ProcessState::Running {
                *state = ProcessState::Exited(None);
            }
        }
        Ok(())
    }

    fn kill(&self) -> io::Result<()> {
        *self.kill_calls.lock() += 1;
        let mut state = self.state.lock();
        if *state == ProcessState::Running {
            *state = ProcessState::Exited(None);
        }
        Ok(())
    }
}

/// Launcher recording every invocation
#[derive(Debug)]
pub struct FakeLauncher {
    launched: Mutex<Vec<(LaunchSpec, Arc<FakeProcess>)>>,
    fail_spawn: bool,
    obeys_terminate: bool,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            fail_spawn: false,
            obeys_terminate: true,
        }
    }

    /// Every launch fails with "No such file or directory"
    pub fn failing() -> Self {
        Self {
            fail_spawn: true,
            ..Self::new()
        }
    }

    /// Processes ignore terminate and only stop on kill
    pub fn stubborn() -> Self {
        Self {
            obeys_terminate: false,
            ..Self::new()
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().len()
    }

    /// Process handed out by the `index`-th launch
    pub fn process(&self, index: usize) -> Arc<FakeProcess> {
        Arc::clone(&self.launched.lock()[index].1)
    }

    pub fn spec(&self, index: usize) -> LaunchSpec {
        self.launched.lock()[index].0.clone()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn ProcessHandle>> {
        if self.fail_spawn {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such file or directory: {}", spec.program.display()),
            ));
        }
        let mut launched = self.launched.lock();
        let process = Arc::new(FakeProcess::new(1000 + launched.len() as u32, self.obeys_terminate));
        launched.push((spec.clone(), Arc::clone(&process)));
        Ok(process)
    }
}
