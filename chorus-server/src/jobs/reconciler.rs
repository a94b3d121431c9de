//! Status reconciliation
//!
//! Combines the worker's self-reported status artifact with what the
//! orchestrator knows about the process into one authoritative status.
//!
//! | process            | artifact               | result                       |
//! |--------------------|------------------------|------------------------------|
//! | not started        | any                    | pending                      |
//! | alive              | pending / running      | artifact                     |
//! | alive              | terminal               | running (write race, warned) |
//! | alive              | absent                 | running, stage "starting"    |
//! | exited 0           | terminal               | artifact                     |
//! | exited 0           | absent / non-terminal  | completed                    |
//! | exited non-zero    | not `completed`        | failed, message from logs    |
//! | untracked          | terminal               | artifact                     |
//! | untracked          | absent / non-terminal  | unknown (orphaned)           |
//!
//! A requested cancellation turns any exit into `cancelled` unless the
//! worker had already reported `completed` and exited cleanly.

use chorus_common::{JobState, JobStatus};
use tracing::warn;

/// What the orchestrator knows about the job's process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The job was created but never started
    NotStarted,
    Alive,
    /// `code` is `None` when the process died from a signal
    Exited { code: Option<i32> },
    /// No process record (orchestrator restarted)
    Untracked,
}

/// Resolve one status from the artifact and the process observation.
///
/// `log_tail` is only called when a failure message has to be built.
pub fn reconcile(
    job_id: &str,
    artifact: Option<JobStatus>,
    observation: Observation,
    cancel_requested: bool,
    log_tail: impl FnOnce() -> String,
) -> JobStatus {
    match observation {
        Observation::NotStarted => artifact
            .filter(|a| a.status == JobState::Pending)
            .unwrap_or_else(|| JobStatus::new(JobState::Pending, "Job created")),

        Observation::Alive => {
            if cancel_requested {
                return JobStatus::new(JobState::Running, "Cancellation requested")
                    .with_stage("cancelling");
            }
            match artifact {
                Some(a) if !a.is_terminal() => a,
                Some(a) => {
                    warn!(
                        job_id,
                        reported = %a.status,
                        "Worker reported a terminal state but is still alive"
                    );
                    JobStatus {
                        status: JobState::Running,
                        ..a
                    }
                }
                None => JobStatus::new(JobState::Running, "Worker starting").with_stage("starting"),
            }
        }

        Observation::Exited { code } => {
            let reported_completed = artifact
                .as_ref()
                .map(|a| a.status == JobState::Completed)
                .unwrap_or(false);

            if cancel_requested && !(code == Some(0) && reported_completed) {
                return JobStatus::new(JobState::Cancelled, "Job cancelled")
                    .with_metadata("exit_code", code);
            }

            match code {
                Some(0) => match artifact {
                    Some(a) if a.is_terminal() => a,
                    carried => {
                        let mut status = JobStatus::new(JobState::Completed, "Job completed")
                            .with_progress(100.0)
                            .with_metadata("exit_code", 0);
                        if let Some(a) = carried {
                            status.stage = a.stage;
                            status.metadata.extend(a.metadata);
                        }
                        status
                    }
                },
                _ if reported_completed => artifact.unwrap_or_else(|| {
                    JobStatus::new(JobState::Completed, "Job completed").with_progress(100.0)
                }),
                failed_code => {
                    let tail = log_tail();
                    let reason = match failed_code {
                        Some(c) => format!("Worker exited with code {}", c),
                        None => "Worker was terminated by a signal".to_string(),
                    };
                    let message = if tail.trim().is_empty() {
                        reason
                    } else {
                        format!("{}: {}", reason, tail.trim())
                    };
                    let mut status = JobStatus::new(JobState::Failed, message)
                        .with_metadata("exit_code", failed_code)
                        .with_metadata("log_tail", tail);
                    if let Some(a) = artifact {
                        status.stage = a.stage;
                        status.progress = a.progress;
                    }
                    status
                }
            }
        }

        Observation::Untracked => match artifact {
            Some(a) if a.is_terminal() => a,
            Some(a) => {
                let last_reported = a.status.as_str();
                JobStatus {
                    status: JobState::Unknown,
                    message: format!(
                        "Worker is not tracked by this orchestrator (orphaned after restart); \
                         last report was {}",
                        last_reported
                    ),
                    ..a
                }
                .with_metadata("orphaned", true)
                .with_metadata("last_reported", last_reported)
            }
            None => JobStatus::new(
                JobState::Unknown,
                "Worker is not tracked by this orchestrator and left no status",
            )
            .with_metadata("orphaned", true),
        },
    }
}

/// Last `lines` lines of `text`
pub fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
