//! Job orchestration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    /// Job folder or one of its initial artifacts could not be written
    #[error("Failed to write job configuration: {0}")]
    ConfigWrite(String),

    #[error("Job {0} already has a running worker")]
    AlreadyRunning(String),

    /// `running` is entered once; a new run needs a new job
    #[error("Job {0} was already started")]
    AlreadyStarted(String),

    #[error("Job {0} is still running")]
    StillRunning(String),

    #[error("Failed to spawn worker for job {job_id}: {source}")]
    Spawn {
        job_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid job manifest: {0}")]
    Manifest(String),
}

pub type JobResult<T> = std::result::Result<T, JobError>;
