//! Worker subprocess lifecycle
//!
//! Builds the `<program> <args..> --config <path>` invocation, launches it
//! through the injected [`ProcessLauncher`], and implements the graceful
//! termination contract: terminate, wait up to a grace period, then kill.

use super::paths::{JobPaths, JobRecord};
use super::process::{LaunchSpec, ProcessHandle, ProcessLauncher, ProcessState};
use chorus_common::config::WorkerSpec;
use chorus_common::status::STATUS_PATH_ENV_VAR;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const JOB_ID_ENV_VAR: &str = "CHORUS_JOB_ID";
pub const JOB_DIR_ENV_VAR: &str = "CHORUS_JOB_DIR";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for the process to disappear after a forced kill
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

pub struct JobRunner {
    launcher: Arc<dyn ProcessLauncher>,
    grace: Duration,
}

impl JobRunner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, grace: Duration) -> Self {
        Self { launcher, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Invocation for `record` using `worker`
    pub fn build_invocation(&self, record: &JobRecord, paths: &JobPaths, worker: &WorkerSpec) -> LaunchSpec {
        let mut env = BTreeMap::new();
        env.insert(JOB_ID_ENV_VAR.to_string(), record.job_id.clone());
        env.insert(JOB_DIR_ENV_VAR.to_string(), paths.dir.display().to_string());
        env.insert(STATUS_PATH_ENV_VAR.to_string(), paths.status.display().to_string());

        LaunchSpec {
            program: worker.program.clone(),
            args: worker.args.clone(),
            config_path: paths.config.clone(),
            log_path: paths.log.clone(),
            working_dir: worker.working_dir.clone(),
            env,
        }
    }

    /// Launch failures are returned synchronously
    pub fn launch(&self, spec: &LaunchSpec) -> io::Result<Arc<dyn ProcessHandle>> {
        self.launcher.launch(spec)
    }

    /// A handle whose state cannot be read counts as gone
    pub fn is_alive(handle: &dyn ProcessHandle) -> bool {
        match handle.poll() {
            Ok(ProcessState::Running) => true,
            Ok(ProcessState::Exited(_)) => false,
            Err(e) => {
                warn!(pid = ?handle.pid(), error = %e, "Failed to poll worker");
                false
            }
        }
    }

    /// Terminate gracefully, escalating to a forced kill after `grace`.
    ///
    /// Blocks until the process has exited or the reap timeout passes.
    pub fn kill(handle: &dyn ProcessHandle, grace: Duration) -> io::Result<ProcessState> {
        if let ProcessState::Exited(code) = handle.poll()? {
            return Ok(ProcessState::Exited(code));
        }

        handle.terminate()?;
        debug!(pid = ?handle.pid(), "Sent termination request");

        if let Some(state) = wait_for_exit(handle, grace)? {
            return Ok(state);
        }

        info!(pid = ?handle.pid(), grace_ms = grace.as_millis() as u64, "Worker ignored termination, killing");
        handle.kill()?;

        match wait_for_exit(handle, REAP_TIMEOUT)? {
            Some(state) => Ok(state),
            None => Ok(ProcessState::Running),
        }
    }

    /// Run [`kill`](Self::kill) on a detached thread and return immediately
    pub fn kill_detached(&self, job_id: &str, handle: Arc<dyn ProcessHandle>) {
        let grace = self.grace;
        let job_id = job_id.to_string();
        let spawned = std::thread::Builder::new()
            .name(format!("cancel-{}", job_id))
            .spawn(move || match JobRunner::kill(handle.as_ref(), grace) {
                Ok(state) => debug!(job_id = %job_id, ?state, "Cancellation finished"),
                Err(e) => warn!(job_id = %job_id, error = %e, "Cancellation failed"),
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to start cancellation thread");
        }
    }
}

fn wait_for_exit(handle: &dyn ProcessHandle, timeout: Duration) -> io::Result<Option<ProcessState>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let ProcessState::Exited(code) = handle.poll()? {
            return Ok(Some(ProcessState::Exited(code)));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
