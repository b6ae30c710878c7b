//! The wire/storage data model shared by the Job Store, the Submission
//! Pipeline, and the Ranking Comparator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Submission lifecycle status. Transitions are monotonically directed: a
/// submission never returns to an earlier state (§4.4's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Compiled,
    Done,
    Failed,
    CompileError,
    CompileTimeout,
    RunTimeout,
    ProblemNotFound,
    Error,
}

impl Status {
    /// True for every status that ends a submission's lifecycle.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Queued | Status::Compiled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Queued => "queued",
            Status::Compiled => "compiled",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::CompileError => "compile_error",
            Status::CompileTimeout => "compile_timeout",
            Status::RunTimeout => "run_timeout",
            Status::ProblemNotFound => "problem_not_found",
            Status::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Submission metadata as stored under `sub:{id}`. Source code, compile log,
/// and run result are stored separately with their own TTLs (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub status: Status,
    pub problem_id: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<String>,
    pub opt: String,
    pub created_at: i64,
}

/// One test case's outcome, in file order (`verdict_{i}.txt` order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    pub test: u32,
    pub passed: bool,
    pub verdict: String,
    /// Human-displayable elapsed time, e.g. "0.042" or the raw `time -v` text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rss_kb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// `passed`/`failed`/`time`/`memory` axes this result ranks on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overall {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingAxis {
    Accuracy,
    Time,
    Memory,
}

/// Aggregate performance summary over all tests in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    /// `passed / total * 100`, or 0 when `total_tests == 0`.
    pub accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory_kb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_memory_kb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median_memory_kb: Option<f64>,
    pub overall: Overall,
    /// Which scalar the comparator should rank this result's time/memory
    /// axes by: median if present, else avg, else max.
    pub ranking_priority: [RankingAxis; 3],
}

impl Performance {
    /// The time value the comparator should use: median, else avg, else max.
    pub fn ranking_time(&self) -> Option<f64> {
        self.median_elapsed_seconds
            .or(self.avg_elapsed_seconds)
    }

    /// The memory value the comparator should use: median, else avg, else max.
    pub fn ranking_memory(&self) -> Option<f64> {
        self.median_memory_kb.or(self.avg_memory_kb)
    }
}

/// The aggregated result of running a submission's program against a test
/// suite, produced by the pipeline and consumed by the comparator and the
/// status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub ok: bool,
    pub tests: Vec<TestRecord>,
    pub performance: Performance,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

/// `run_result` payload stored when the judge container itself fails to
/// execute (nonzero launcher exit on the run stage, §4.4 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeContainerFailure {
    pub error: String,
    pub exit_code: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!Status::Queued.is_terminal());
        assert!(!Status::Compiled.is_terminal());
        for s in [
            Status::Done,
            Status::Failed,
            Status::CompileError,
            Status::CompileTimeout,
            Status::RunTimeout,
            Status::ProblemNotFound,
            Status::Error,
        ] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn status_display_matches_wire_form() {
        assert_eq!(Status::CompileError.to_string(), "compile_error");
        assert_eq!(Status::RunTimeout.to_string(), "run_timeout");
    }

    #[test]
    fn ranking_time_prefers_median() {
        let perf = Performance {
            total_tests: 2,
            passed: 2,
            failed: 0,
            accuracy: 100.0,
            max_elapsed_seconds: Some(0.5),
            avg_elapsed_seconds: Some(0.3),
            median_elapsed_seconds: Some(0.25),
            max_memory_kb: None,
            avg_memory_kb: None,
            median_memory_kb: None,
            overall: Overall::Passed,
            ranking_priority: [RankingAxis::Accuracy, RankingAxis::Time, RankingAxis::Memory],
        };
        assert_eq!(perf.ranking_time(), Some(0.25));
    }
}
