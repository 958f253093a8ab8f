//! Background work for the certificate pipeline.
//!
//! `WorkerPool` runs submitted tasks on a fixed number of tokio workers
//! reading a bounded channel; every task gets a cancellation scope owned by
//! the pool rather than by whoever submitted it. `CdnWorkerSupervisor` owns
//! one long-lived worker per CDN for the stale key cleanup.

pub mod jobs;
pub mod queue;
pub mod supervisor;

pub use jobs::*;
pub use queue::*;
pub use supervisor::*;
