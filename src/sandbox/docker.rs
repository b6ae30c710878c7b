//! Docker-backed `SandboxLauncher`.
//!
//! Shells out to the `docker` CLI via `tokio::process::Command`, the
//! idiomatic equivalent of the teacher's `IsolateBox` wrapping the `isolate`
//! CLI (`sandbox.rs` in the original tree) — same "build an argv, spawn,
//! parse meta" shape, different sandbox backend. Flag set follows
//! `original_source`'s `docker_run()` exactly (`--rm --network none --cpus
//! --memory --read-only --tmpfs`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{LaunchOutcome, LaunchSpec, SandboxLauncher};
use crate::config::Config;
use crate::error::CoreError;

static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_container_name() -> String {
    let n = CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ojcore_{}_{}", std::process::id(), n)
}

pub struct DockerLauncher {
    image: String,
    cpu_limit: Option<String>,
    memory_limit: Option<String>,
    extra_args: Vec<String>,
}

impl DockerLauncher {
    pub fn new(config: &Config) -> Self {
        Self {
            image: config.judge_image.clone(),
            cpu_limit: config.cpu_limit.clone(),
            memory_limit: config.memory_limit.clone(),
            extra_args: config.sandbox_extra_args.clone(),
        }
    }

    fn build_args(&self, spec: &LaunchSpec, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--network".to_string(),
            "none".to_string(),
        ];

        if let Some(cpus) = &self.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }
        if let Some(mem) = &self.memory_limit {
            args.push("--memory".to_string());
            args.push(mem.clone());
        }

        if spec.readonly_root {
            args.push("--read-only".to_string());
            args.push("--tmpfs".to_string());
            args.push("/tmp".to_string());

            let has_work_mount = spec.mounts.iter().any(|m| m.sandbox_path == "/work");
            if !has_work_mount {
                args.push("--tmpfs".to_string());
                args.push("/work".to_string());
            }
        }

        args.extend(self.extra_args.iter().cloned());

        for mount in &spec.mounts {
            args.push("-v".to_string());
            args.push(mount.as_docker_arg());
        }

        args.push(self.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

#[async_trait]
impl SandboxLauncher for DockerLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> anyhow::Result<LaunchOutcome> {
        let container_name = next_container_name();
        let args = self.build_args(spec, &container_name);

        debug!("docker {}", args.join(" "));

        let mut child = Command::new("docker")
            .args(&args)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Sandbox(format!("failed to spawn docker: {}", e)))?;

        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(LaunchOutcome::Completed {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(CoreError::Sandbox(format!("docker run failed: {}", e)).into()),
            Err(_elapsed) => {
                // Wall timeout: forcibly terminate the container. Killing the
                // `docker run` client process alone does not necessarily stop
                // the daemon-managed container, so issue `docker kill` too.
                if let Err(e) = Command::new("docker")
                    .args(["kill", &container_name])
                    .output()
                    .await
                {
                    warn!("failed to docker kill {}: {}", container_name, e);
                }
                Ok(LaunchOutcome::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{LaunchSpec, Mount, MountMode};
    use std::path::PathBuf;

    fn launcher() -> DockerLauncher {
        DockerLauncher {
            image: "oj_judge:latest".to_string(),
            cpu_limit: Some("2".to_string()),
            memory_limit: Some("512m".to_string()),
            extra_args: vec![],
        }
    }

    #[test]
    fn attaches_ephemeral_work_mount_when_caller_omits_one() {
        let spec = LaunchSpec::new(["echo", "hi"], Duration::from_secs(5));
        let args = launcher().build_args(&spec, "c1");
        assert!(args.windows(2).any(|w| w == ["--tmpfs", "/work"]));
    }

    #[test]
    fn does_not_duplicate_work_mount_when_caller_provides_one() {
        let spec = LaunchSpec::new(["echo", "hi"], Duration::from_secs(5)).with_mount(Mount::new(
            PathBuf::from("/tmp/job1"),
            "/work",
            MountMode::ReadWrite,
        ));
        let args = launcher().build_args(&spec, "c1");
        assert!(!args.windows(2).any(|w| w == ["--tmpfs", "/work"]));
        assert!(args.iter().any(|a| a == "/tmp/job1:/work:rw"));
    }

    #[test]
    fn passes_cpu_and_memory_limits() {
        let spec = LaunchSpec::new(["true"], Duration::from_secs(5));
        let args = launcher().build_args(&spec, "c1");
        assert!(args.windows(2).any(|w| w == ["--cpus", "2"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "512m"]));
    }

    #[test]
    fn no_network_always_present() {
        let spec = LaunchSpec::new(["true"], Duration::from_secs(5));
        let args = launcher().build_args(&spec, "c1");
        assert!(args.windows(2).any(|w| w == ["--network", "none"]));
    }
}
