//! Ranking Comparator (C5): lexicographic ranking of two completed
//! submissions by accuracy, then time (with tolerance), then memory (with
//! tolerance). No direct teacher analogue — grounded on spec.md §4.5 and the
//! `Performance` aggregate in `model`, written in the teacher's plain-enum,
//! no-unwrap style (`core/verdict.rs`).

use serde::{Deserialize, Serialize};

use crate::model::RunResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Accuracy,
    Time,
    Memory,
    AllMetricsEqualWithinTolerance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonDetails {
    pub accuracy_a: f64,
    pub accuracy_b: f64,
    pub time_diff_ms: Option<f64>,
    pub memory_diff_kb: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub winner: Winner,
    pub reason: Reason,
    pub details: ComparisonDetails,
}

/// Relative-difference tolerance below which two scalar metrics count as
/// tied, per spec.md §4.5's default.
pub const DEFAULT_TOLERANCE: f64 = 0.10;

/// Compare two completed runs under the three-axis lexicographic rule.
pub fn compare(a: &RunResult, b: &RunResult, tolerance: f64) -> Comparison {
    let accuracy_a = a.performance.accuracy;
    let accuracy_b = b.performance.accuracy;

    let details = ComparisonDetails {
        accuracy_a,
        accuracy_b,
        time_diff_ms: diff_ms(a.performance.ranking_time(), b.performance.ranking_time()),
        memory_diff_kb: diff(a.performance.ranking_memory(), b.performance.ranking_memory()),
    };

    if accuracy_a != accuracy_b {
        let winner = if accuracy_a > accuracy_b { Winner::A } else { Winner::B };
        return Comparison {
            winner,
            reason: Reason::Accuracy,
            details,
        };
    }

    match compare_axis(a.performance.ranking_time(), b.performance.ranking_time(), tolerance) {
        AxisOutcome::Decided(winner) => {
            return Comparison {
                winner,
                reason: Reason::Time,
                details,
            }
        }
        AxisOutcome::Tie => {}
    }

    match compare_axis(a.performance.ranking_memory(), b.performance.ranking_memory(), tolerance) {
        AxisOutcome::Decided(winner) => {
            return Comparison {
                winner,
                reason: Reason::Memory,
                details,
            }
        }
        AxisOutcome::Tie => {}
    }

    Comparison {
        winner: Winner::Tie,
        reason: Reason::AllMetricsEqualWithinTolerance,
        details,
    }
}

enum AxisOutcome {
    Decided(Winner),
    Tie,
}

/// Lower-is-better comparison of one scalar axis with relative tolerance.
/// One-sided null: the non-null side wins outright (no data is worse than
/// any data). Both null: tie.
fn compare_axis(a: Option<f64>, b: Option<f64>, tolerance: f64) -> AxisOutcome {
    match (a, b) {
        (Some(a), Some(b)) => {
            let mean = (a + b) / 2.0;
            let rel_diff = if mean == 0.0 { 0.0 } else { (a - b).abs() / mean };
            if rel_diff < tolerance {
                AxisOutcome::Tie
            } else if a < b {
                AxisOutcome::Decided(Winner::A)
            } else {
                AxisOutcome::Decided(Winner::B)
            }
        }
        (Some(_), None) => AxisOutcome::Decided(Winner::A),
        (None, Some(_)) => AxisOutcome::Decided(Winner::B),
        (None, None) => AxisOutcome::Tie,
    }
}

fn diff(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a - b),
        _ => None,
    }
}

fn diff_ms(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    diff(a, b).map(|d| d * 1000.0)
}

/// Mid-value of a sorted sequence: the middle element for odd length, the
/// average of the two middle elements for even length.
pub fn median(sorted_values: &[f64]) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }
    let mid = sorted_values.len() / 2;
    if sorted_values.len() % 2 == 1 {
        Some(sorted_values[mid])
    } else {
        Some((sorted_values[mid - 1] + sorted_values[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Overall, Performance, RankingAxis, TestRecord};

    fn run(accuracy: f64, time: Option<f64>, memory: Option<f64>) -> RunResult {
        RunResult {
            ok: accuracy == 100.0,
            tests: vec![TestRecord {
                test: 1,
                passed: accuracy == 100.0,
                verdict: if accuracy == 100.0 { "OK".into() } else { "WA".into() },
                elapsed: None,
                elapsed_seconds: time,
                max_rss_kb: memory.map(|m| m as u64),
                exit_code: Some(0),
            }],
            performance: Performance {
                total_tests: 1,
                passed: if accuracy == 100.0 { 1 } else { 0 },
                failed: if accuracy == 100.0 { 0 } else { 1 },
                accuracy,
                max_elapsed_seconds: time,
                avg_elapsed_seconds: time,
                median_elapsed_seconds: time,
                max_memory_kb: memory,
                avg_memory_kb: memory,
                median_memory_kb: memory,
                overall: if accuracy == 100.0 { Overall::Passed } else { Overall::Failed },
                ranking_priority: [RankingAxis::Accuracy, RankingAxis::Time, RankingAxis::Memory],
            },
            stdout_tail: String::new(),
            stderr_tail: String::new(),
        }
    }

    #[test]
    fn median_singleton() {
        assert_eq!(median(&[4.0]), Some(4.0));
    }

    #[test]
    fn median_even_length() {
        assert_eq!(median(&[1.0, 3.0]), Some(2.0));
    }

    #[test]
    fn median_empty_is_none() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn higher_accuracy_wins_outright() {
        let a = run(100.0, Some(1.0), Some(1000.0));
        let b = run(50.0, Some(0.1), Some(100.0));
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.winner, Winner::A);
        assert_eq!(result.reason, Reason::Accuracy);
    }

    #[test]
    fn tolerance_ties_close_times_then_memory_decides() {
        let a = run(100.0, Some(0.100), Some(1000.0));
        let b = run(100.0, Some(0.105), Some(2000.0));
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.winner, Winner::A);
        assert_eq!(result.reason, Reason::Memory);
    }

    #[test]
    fn identical_inputs_tie() {
        let a = run(100.0, Some(0.2), Some(500.0));
        let result = compare(&a, &a, DEFAULT_TOLERANCE);
        assert_eq!(result.winner, Winner::Tie);
        assert_eq!(result.reason, Reason::AllMetricsEqualWithinTolerance);
    }

    #[test]
    fn symmetry_holds() {
        let a = run(100.0, Some(0.01), Some(100.0));
        let b = run(100.0, Some(0.50), Some(9000.0));
        let ab = compare(&a, &b, DEFAULT_TOLERANCE);
        let ba = compare(&b, &a, DEFAULT_TOLERANCE);
        assert_eq!(ab.winner, Winner::A);
        assert_eq!(ba.winner, Winner::B);
    }

    #[test]
    fn one_sided_null_time_nonnull_wins() {
        let a = run(100.0, Some(0.2), None);
        let b = run(100.0, None, None);
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.winner, Winner::A);
        assert_eq!(result.reason, Reason::Time);
    }

    #[test]
    fn both_axes_null_is_tie() {
        let a = run(100.0, None, None);
        let b = run(100.0, None, None);
        let result = compare(&a, &b, DEFAULT_TOLERANCE);
        assert_eq!(result.winner, Winner::Tie);
    }
}
