//! Sandbox Launcher (C1): assemble and run a single sandboxed execution of
//! the judge image, returning exit code and captured streams.
//!
//! Generalizes the teacher's `runner::Runner` trait (`CommandSpec` +
//! `RunLimits` builder) from an `isolate`-box backend to a container-runtime
//! backend; see `docker` for the production implementation.

mod docker;

pub use docker::DockerLauncher;

use async_trait::async_trait;
use std::path::PathBuf;

/// Mount mode for a host path bound into the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

impl MountMode {
    fn as_flag(self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

/// A single (host-path, sandbox-path, mode) bind mount.
#[derive(Debug, Clone)]
pub struct Mount {
    pub host_path: PathBuf,
    pub sandbox_path: String,
    pub mode: MountMode,
}

impl Mount {
    pub fn new(host_path: impl Into<PathBuf>, sandbox_path: impl Into<String>, mode: MountMode) -> Self {
        Self {
            host_path: host_path.into(),
            sandbox_path: sandbox_path.into(),
            mode,
        }
    }

    fn as_docker_arg(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.sandbox_path,
            self.mode.as_flag()
        )
    }
}

/// A single sandboxed invocation: command, mounts, root filesystem mode, and
/// wall timeout.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    pub readonly_root: bool,
    pub timeout: std::time::Duration,
}

impl LaunchSpec {
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>, timeout: std::time::Duration) -> Self {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            mounts: Vec::new(),
            readonly_root: true,
            timeout,
        }
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn readonly_root(mut self, value: bool) -> Self {
        self.readonly_root = value;
        self
    }
}

/// Explicit result of a launch attempt, per spec.md §9's re-architecture
/// guidance: no exceptions for control flow around timeouts. Only a genuine
/// fault in the launcher itself (sandbox runtime unreachable, `docker`
/// missing, etc.) surfaces as an `Err` from `launch()`.
#[derive(Debug)]
pub enum LaunchOutcome {
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    TimedOut,
}

impl LaunchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LaunchOutcome::Completed { exit_code: 0, .. })
    }
}

#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<LaunchOutcome>;
}
