//! Process-wide configuration, loaded once from the environment at startup.
//!
//! Mirrors the teacher's `SandboxConfig::from_env` / `languages::init_languages`
//! pattern: a plain struct built from `std::env`, stashed in a `OnceLock`, and
//! handed out by reference for the rest of the process's life.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};

/// A worker-visible path paired with the path the sandbox runtime should see
/// for the same directory on the host. Equal when the worker runs directly on
/// the host; differ when the worker itself runs inside a container and needs
/// to hand the *host* path to `docker run -v`.
#[derive(Debug, Clone)]
pub struct HostPath {
    pub worker_view: PathBuf,
    pub host_view: PathBuf,
}

impl HostPath {
    fn from_env(worker_var: &str, host_var: &str, default: &str) -> Self {
        let worker_view = std::env::var(worker_var)
            .unwrap_or_else(|_| default.to_string())
            .into();
        let host_view = std::env::var(host_var)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let worker_view: &PathBuf = &worker_view;
                worker_view.clone()
            });
        Self {
            worker_view,
            host_view,
        }
    }

    /// Translate a path under `worker_view` into the equivalent path under
    /// `host_view`, for handing to the sandbox runtime.
    pub fn to_host(&self, worker_path: &std::path::Path) -> PathBuf {
        match worker_path.strip_prefix(&self.worker_view) {
            Ok(suffix) => self.host_view.join(suffix),
            Err(_) => worker_path.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Sandbox (judge) image name, e.g. "oj_judge:latest".
    pub judge_image: String,
    /// `--cpus` value passed to the sandbox runtime, if any.
    pub cpu_limit: Option<String>,
    /// `--memory` value passed to the sandbox runtime, if any.
    pub memory_limit: Option<String>,
    /// Extra argv appended verbatim to every sandbox invocation.
    pub sandbox_extra_args: Vec<String>,

    pub compile_timeout_secs: u64,
    pub run_timeout_secs: u64,

    /// Job-tmp root: where work directories are created (worker view / host view).
    pub job_root: HostPath,
    /// Problems root: read-only tree of test data (worker view / host view).
    pub problems_root: HostPath,

    pub store_url: String,

    /// Number of times to rerun each test case and take the median (reserved;
    /// the pipeline does not currently loop — see DESIGN.md Open Questions).
    pub runs_per_test: u32,

    /// Relative-difference tolerance below which two scalar metrics are
    /// treated as tied by the ranking comparator.
    pub performance_tolerance: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cpu_limit = env_limit("CPU_LIMIT", default_cpu_limit);
        let memory_limit = env_limit("MEM_LIMIT", default_memory_limit);

        let run_timeout_secs = std::env::var("RUN_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let compile_timeout_secs = std::env::var("COMPILE_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(run_timeout_secs);

        let sandbox_extra_args = std::env::var("DOCKER_RUN_EXTRA_ARGS")
            .ok()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let runs_per_test = std::env::var("RUNS_PER_TEST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let performance_tolerance = std::env::var("PERFORMANCE_TOLERANCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.10);

        Ok(Self {
            judge_image: std::env::var("JUDGE_IMAGE")
                .unwrap_or_else(|_| "oj_judge:latest".to_string()),
            cpu_limit,
            memory_limit,
            sandbox_extra_args,
            compile_timeout_secs,
            run_timeout_secs,
            job_root: HostPath::from_env("JOB_TMP_ROOT", "HOST_JOB_TMP_ROOT", "/worker_tmp"),
            problems_root: HostPath::from_env("PROBLEMS_ROOT", "HOST_PROBLEMS_ROOT", "/problems"),
            store_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            runs_per_test,
            performance_tolerance,
        })
    }
}

fn env_limit(var: &str, default: impl Fn() -> Option<String>) -> Option<String> {
    match std::env::var(var) {
        Ok(v) => {
            let v = v.trim();
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        }
        Err(_) => default(),
    }
}

/// Half the host's CPUs, as a `--cpus` string (e.g. "2" or "1.50").
fn default_cpu_limit() -> Option<String> {
    let count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) as f64;
    let half = (count / 2.0).max(1.0);
    if (half - half.round()).abs() < 1e-9 {
        Some((half.round() as u64).to_string())
    } else {
        Some(format!("{:.2}", half).trim_end_matches('0').trim_end_matches('.').to_string())
    }
}

/// Half the host's memory, floored at 256 MiB, as a `--memory` string like "512m".
fn default_memory_limit() -> Option<String> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let total_kb: u64 = meminfo
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|n| n.parse().ok())?;
    let half_kb = (total_kb / 2).max(256 * 1024);
    let half_mb = (half_kb / 1024).max(256);
    Some(format!("{}m", half_mb))
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Initialize the global configuration. Must be called once at startup before
/// `get()` is used.
pub fn init() -> Result<&'static Config> {
    let cfg = Config::from_env().context("failed to load configuration from environment")?;
    Ok(CONFIG.get_or_init(|| cfg))
}

/// Fetch the global configuration. Panics if `init()` was never called.
pub fn get() -> &'static Config {
    CONFIG.get().expect("config::init() must run before config::get()")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_path_translates_prefix() {
        let hp = HostPath {
            worker_view: PathBuf::from("/worker_tmp"),
            host_view: PathBuf::from("/srv/oj/tmp"),
        };
        let translated = hp.to_host(std::path::Path::new("/worker_tmp/job_42_abcd"));
        assert_eq!(translated, PathBuf::from("/srv/oj/tmp/job_42_abcd"));
    }

    #[test]
    fn host_path_passes_through_unrelated_paths() {
        let hp = HostPath {
            worker_view: PathBuf::from("/worker_tmp"),
            host_view: PathBuf::from("/srv/oj/tmp"),
        };
        let translated = hp.to_host(std::path::Path::new("/elsewhere/x"));
        assert_eq!(translated, PathBuf::from("/elsewhere/x"));
    }

    #[test]
    fn default_cpu_limit_is_at_least_one() {
        let limit = default_cpu_limit().unwrap();
        let value: f64 = limit.parse().unwrap();
        assert!(value >= 1.0);
    }
}
