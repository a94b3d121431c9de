//! HTTP API handlers for chorus-server
//!
//! Polling only: clients start a job, then poll its status. Nothing is
//! pushed, so a restarted server answers the same way from disk.

pub mod clips;
pub mod health;
pub mod jobs;

pub use clips::clip_routes;
pub use health::health_routes;
pub use jobs::job_routes;
