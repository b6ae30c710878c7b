//! Crate-wide error taxonomy.
//!
//! Most call sites only need to propagate a failure and use `anyhow::Result`
//! with `.context(...)`. `CoreError` exists for the one place that genuinely
//! branches on *which* error happened: `pipeline::run_worker` downcasts a
//! stage failure to tell `Store` (the job store itself is unreachable, fatal
//! to this worker process) apart from everything else (scoped to the one
//! submission, logged and degraded to `Status::Error`). `Sandbox` and
//! `ProblemNotFound` are not branch points — they exist purely to give
//! `docker.rs`/`pipeline.rs` a typed, `Display`-able shape for their error
//! messages instead of ad hoc strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("sandbox launch failed: {0}")]
    Sandbox(String),

    #[error("job store error")]
    Store(#[from] redis::RedisError),

    #[error("problem directory not found: {0}")]
    ProblemNotFound(String),
}
