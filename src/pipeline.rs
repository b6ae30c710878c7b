//! Submission Pipeline (C4) — the heart of the system: the two-stage
//! dequeue → compile → enqueue-run → dequeue → run → aggregate → store
//! state machine, plus the worker loop that drives it.
//!
//! Grounded on `judger.rs::process_judge_job`'s control flow (compile, then
//! iterate tests, aggregate, decide overall verdict) combined with the
//! worker loop shape in the teacher's `main.rs`, narrowed to the plain
//! compile/run two-queue contract spec.md §4.4 calls for instead of the
//! teacher's five job types.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::compare::median;
use crate::config::Config;
use crate::error::CoreError;
use crate::model::{
    JudgeContainerFailure, Overall, Performance, RankingAxis, RunResult, Status, TestRecord,
};
use crate::parser;
use crate::sandbox::{LaunchOutcome, LaunchSpec, Mount, MountMode, SandboxLauncher};
use crate::store::{CompileJob, JobStore, RunJob};

const STDOUT_TAIL_BYTES: usize = 4_000;
const STDERR_TAIL_BYTES: usize = 2_000;

/// Deletes the work directory on drop unless explicitly released — the
/// scoped cleanup guard called for in spec.md §9's re-architecture guidance,
/// replacing a `finally`-style block. Ownership is released exactly once, at
/// the compile→run handoff; every other exit path (including early returns
/// from the run stage) lets the guard's `Drop` remove the directory.
struct WorkDirGuard(Option<PathBuf>);

impl WorkDirGuard {
    fn new(path: PathBuf) -> Self {
        Self(Some(path))
    }

    fn path(&self) -> &Path {
        self.0.as_deref().expect("work dir guard used after release")
    }

    /// Hand ownership of the directory to the next stage; it will not be
    /// removed when this guard drops.
    fn release(mut self) -> PathBuf {
        self.0.take().expect("work dir guard already released")
    }
}

impl Drop for WorkDirGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove work directory {:?}: {}", path, e);
                }
            }
        }
    }
}

fn tail_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let start = s.len() - max_bytes;
    // Walk forward to the nearest char boundary so we never split a
    // multi-byte UTF-8 sequence.
    let mut start = start;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

/// Run the compile stage for one queued submission.
pub async fn compile_stage(
    store: &mut JobStore,
    launcher: &dyn SandboxLauncher,
    config: &Config,
    job: CompileJob,
) -> Result<()> {
    let id = job.submission_id.as_str();

    let submission = store.get_submission(id).await?;
    let code = store.get_code(id).await?;
    let (submission, code) = match (submission, code) {
        (Some(s), Some(c)) => (s, c),
        _ => {
            store.set_status(id, Status::Error).await?;
            return Ok(());
        }
    };

    let workdir = match std::fs::create_dir_all(&config.job_root.worker_view)
        .context("failed to ensure job root exists")
        .and_then(|_| {
            tempfile::Builder::new()
                .prefix(&format!("job_{}_", id))
                .tempdir_in(&config.job_root.worker_view)
                .context("failed to create work directory")
        }) {
        Ok(tmp) => tmp.into_path(),
        Err(e) => {
            store.set_status(id, Status::Error).await?;
            store.put_compile_log(id, &format!("{:#}", e)).await?;
            return Ok(());
        }
    };
    // tempdir defaults to 0700; the judge image's container user rarely maps
    // to the worker's UID, so loosen it to let the sandboxed process write
    // its binary and verdict/metrics files.
    if let Err(e) = std::fs::set_permissions(&workdir, std::fs::Permissions::from_mode(0o777)) {
        store.set_status(id, Status::Error).await?;
        store
            .put_compile_log(id, &format!("failed to open up work directory permissions: {}", e))
            .await?;
        return Ok(());
    }
    let guard = WorkDirGuard::new(workdir.clone());

    let lang_config = crate::languages::get_language_config(&submission.language);
    let std = submission
        .std
        .clone()
        .or_else(|| lang_config.default_std.clone())
        .unwrap_or_default();

    if let Err(e) = std::fs::write(workdir.join(&lang_config.source_file), &code) {
        store.set_status(id, Status::Error).await?;
        store
            .put_compile_log(id, &format!("failed to write source file: {}", e))
            .await?;
        return Ok(());
    }

    let host_workdir = config.job_root.to_host(&workdir);
    let spec = LaunchSpec::new(
        [
            "compile_run.sh",
            "--compile-only",
            submission.language.as_str(),
            lang_config.source_file.as_str(),
            std.as_str(),
        ],
        Duration::from_secs(config.compile_timeout_secs),
    )
    .with_mount(Mount::new(host_workdir, "/work", MountMode::ReadWrite));

    match launcher.launch(&spec).await {
        Ok(LaunchOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        }) => {
            let log = format!("{}\n{}", stdout, stderr);
            store.put_compile_log(id, &log).await?;

            if exit_code == 0 {
                store.set_status(id, Status::Compiled).await?;
                store
                    .enqueue_run(&RunJob {
                        submission_id: id.to_string(),
                        tmpdir: guard.release().to_string_lossy().into_owned(),
                        problem_id: submission.problem_id.clone(),
                        lang: submission.language.clone(),
                        std: Some(std),
                    })
                    .await?;
            } else {
                store.set_status(id, Status::CompileError).await?;
                // guard drops here, removing the work directory.
            }
        }
        Ok(LaunchOutcome::TimedOut) => {
            store.set_status(id, Status::CompileTimeout).await?;
        }
        Err(e) => {
            store.set_status(id, Status::Error).await?;
            store.put_compile_log(id, &format!("{:#}", e)).await?;
        }
    }

    info!("compile stage finished: submission_id={}", id);
    Ok(())
}

/// Run the run stage for one submission whose compile stage already
/// succeeded.
pub async fn run_stage(
    store: &mut JobStore,
    launcher: &dyn SandboxLauncher,
    config: &Config,
    job: RunJob,
) -> Result<()> {
    let id = job.submission_id.as_str();
    // Constructed first so every exit path below — including the
    // problem-not-found early return — cleans up the work directory.
    let guard = WorkDirGuard::new(PathBuf::from(&job.tmpdir));

    let tests_dir = config.problems_root.worker_view.join(&job.problem_id);
    if !tests_dir.is_dir() {
        warn!("{}", CoreError::ProblemNotFound(job.problem_id.clone()));
        store.set_status(id, Status::ProblemNotFound).await?;
        return Ok(());
    }

    let lang_config = crate::languages::get_language_config(&job.lang);
    let std = job.std.clone().unwrap_or_default();

    let host_workdir = config.job_root.to_host(guard.path());
    let host_tests_dir = config.problems_root.to_host(&tests_dir);

    let spec = LaunchSpec::new(
        [
            "compile_run.sh",
            "--run-only",
            job.lang.as_str(),
            lang_config.source_file.as_str(),
            std.as_str(),
        ],
        Duration::from_secs(config.run_timeout_secs),
    )
    .with_mount(Mount::new(host_workdir, "/work", MountMode::ReadWrite))
    .with_mount(Mount::new(host_tests_dir, "/tests", MountMode::ReadOnly));

    match launcher.launch(&spec).await {
        Ok(LaunchOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        }) => {
            if exit_code != 0 {
                let failure = JudgeContainerFailure {
                    error: "judge_container_failed".to_string(),
                    exit_code,
                    stdout_tail: tail_bytes(&stdout, STDOUT_TAIL_BYTES),
                    stderr_tail: tail_bytes(&stderr, STDERR_TAIL_BYTES),
                };
                store.put_run_result(id, &failure).await?;
                store.set_status(id, Status::Error).await?;
            } else {
                let run_result = aggregate(guard.path(), &stdout, &stderr).await;
                let status = if run_result.ok { Status::Done } else { Status::Failed };
                store.put_run_result(id, &run_result).await?;
                store.set_status(id, status).await?;
            }
        }
        Ok(LaunchOutcome::TimedOut) => {
            store.set_status(id, Status::RunTimeout).await?;
        }
        Err(e) => {
            error!("sandbox launch failed for submission {}: {:#}", id, e);
            store.set_status(id, Status::Error).await?;
        }
    }

    info!("run stage finished: submission_id={}", id);
    Ok(())
}

/// Harvest per-test verdicts/metrics and fold them into a `RunResult`.
async fn aggregate(workdir: &Path, stdout: &str, stderr: &str) -> RunResult {
    let parsed = parser::parse(workdir).await;

    let mut tests = Vec::with_capacity(parsed.len());
    let mut passed = 0u32;
    let mut elapsed_values = Vec::new();
    let mut memory_values = Vec::new();

    for p in &parsed {
        let is_ok = p.verdict.eq_ignore_ascii_case("OK");
        if is_ok {
            passed += 1;
        }
        // A submission controls the contents of /work; `"nan"` is a valid
        // parse of the textual metrics fallback, so guard against non-finite
        // values reaching the sort/aggregate math below.
        if let Some(secs) = p.metrics.elapsed_seconds.filter(|s| s.is_finite()) {
            elapsed_values.push(secs);
        }
        if let Some(kb) = p.metrics.max_rss_kb {
            memory_values.push(kb as f64);
        }
        tests.push(TestRecord {
            test: p.test,
            passed: is_ok,
            verdict: p.verdict.clone(),
            elapsed: p.metrics.elapsed_seconds.map(|s| format!("{:.6}", s)),
            elapsed_seconds: p.metrics.elapsed_seconds,
            max_rss_kb: p.metrics.max_rss_kb,
            exit_code: p.metrics.exit_code,
        });
    }

    let total_tests = tests.len() as u32;
    let failed = total_tests - passed;
    let ok = total_tests > 0 && passed == total_tests;
    let accuracy = if total_tests > 0 {
        (passed as f64 / total_tests as f64) * 100.0
    } else {
        0.0
    };

    elapsed_values.sort_by(|a, b| a.total_cmp(b));
    memory_values.sort_by(|a, b| a.total_cmp(b));

    let performance = Performance {
        total_tests,
        passed,
        failed,
        accuracy,
        max_elapsed_seconds: elapsed_values.last().copied(),
        avg_elapsed_seconds: average(&elapsed_values),
        median_elapsed_seconds: median(&elapsed_values),
        max_memory_kb: memory_values.last().copied(),
        avg_memory_kb: average(&memory_values),
        median_memory_kb: median(&memory_values),
        overall: if ok { Overall::Passed } else { Overall::Failed },
        ranking_priority: [RankingAxis::Accuracy, RankingAxis::Time, RankingAxis::Memory],
    };

    RunResult {
        ok,
        tests,
        performance,
        stdout_tail: tail_bytes(stdout, STDOUT_TAIL_BYTES),
        stderr_tail: tail_bytes(stderr, STDERR_TAIL_BYTES),
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// The worker's control loop: alternate a 1-second blocking pop on each
/// queue so that neither can starve the other by more than one job
/// (spec.md §4.4's "Worker loop").
pub async fn run_worker(
    store: &mut JobStore,
    launcher: &dyn SandboxLauncher,
    config: &Config,
) -> Result<()> {
    info!("worker loop starting");
    loop {
        match store.dequeue_compile(Duration::from_secs(1)).await {
            Ok(Some(job)) => {
                let sub_id = job.submission_id.clone();
                if let Err(e) = compile_stage(store, launcher, config, job).await {
                    error!("compile stage crashed for {}: {:#}", sub_id, e);
                    degrade_or_bail(store, &sub_id, e).await?;
                }
            }
            Ok(None) => {}
            Err(e) => bail_on_store_fault("compile queue dequeue failed", e)?,
        }

        match store.dequeue_run(Duration::from_secs(1)).await {
            Ok(Some(job)) => {
                let sub_id = job.submission_id.clone();
                if let Err(e) = run_stage(store, launcher, config, job).await {
                    error!("run stage crashed for {}: {:#}", sub_id, e);
                    degrade_or_bail(store, &sub_id, e).await?;
                }
            }
            Ok(None) => {}
            Err(e) => bail_on_store_fault("run queue dequeue failed", e)?,
        }
    }
}

/// After a stage crash, decide whether to degrade just this submission or
/// bring the whole worker down. A `CoreError::Store` means the job store
/// itself is unreachable — writing `Status::Error` would just fail again and
/// every other submission is equally stuck, so there is nothing left for this
/// worker to usefully do; propagate and let the process supervisor restart
/// it. Any other error (a bad sandbox launch, a malformed job, plain I/O)
/// only affects this one submission, so it gets marked `error` and the loop
/// continues.
async fn degrade_or_bail(store: &mut JobStore, sub_id: &str, e: anyhow::Error) -> Result<()> {
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::Store(_)) => Err(e),
        _ => {
            let _ = store.set_status(sub_id, Status::Error).await;
            Ok(())
        }
    }
}

fn bail_on_store_fault(context: &str, e: anyhow::Error) -> Result<()> {
    match e.downcast_ref::<CoreError>() {
        Some(CoreError::Store(_)) => Err(e).context(context.to_string()),
        _ => {
            error!("{}: {:#}", context, e);
            Ok(())
        }
    }
}
