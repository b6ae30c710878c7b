//! Metrics & Verdict Parser (C2): read per-test verdict and metrics
//! artifacts produced by the judge image from a shared work directory.
//!
//! A pure read — never mutates or deletes its inputs. Grounded on
//! `original_source/Coduel/worker/worker.py`'s verdict/metrics harvesting
//! loop, reworked from inline dict-building into a small typed parser in the
//! teacher's error-as-data style (`checker.rs`'s non-fatal-on-bad-input
//! posture).

use std::path::Path;

use serde::Deserialize;
use tokio::fs;

/// One test's raw metrics, as found in `metrics_{i}.json`/`metrics_{i}.txt`.
/// Every field is optional: a missing or malformed metrics file yields an
/// empty record rather than a parse failure (§4.2 step 3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetrics {
    pub elapsed_seconds: Option<f64>,
    pub max_rss_kb: Option<u64>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct MetricsJson {
    elapsed_seconds: Option<f64>,
    max_rss_kb: Option<u64>,
    exit_code: Option<i32>,
}

/// One parsed test: verdict token plus whatever metrics were recoverable.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTest {
    pub test: u32,
    pub verdict: String,
    pub metrics: RawMetrics,
}

/// Enumerate `verdict_{i}.txt`/`metrics_{i}.json|txt` starting at 1, stopping
/// at the first missing `verdict_{i}.txt` (§4.2 step 1, §3's "Parser
/// prefix" invariant).
pub async fn parse(workdir: &Path) -> Vec<ParsedTest> {
    let mut results = Vec::new();
    let mut i: u32 = 1;
    loop {
        let verdict_path = workdir.join(format!("verdict_{}.txt", i));
        let verdict = match fs::read_to_string(&verdict_path).await {
            Ok(content) => content.trim().to_string(),
            Err(_) => break,
        };

        let metrics = parse_metrics(workdir, i).await;

        results.push(ParsedTest {
            test: i,
            verdict,
            metrics,
        });
        i += 1;
    }
    results
}

async fn parse_metrics(workdir: &Path, index: u32) -> RawMetrics {
    let json_path = workdir.join(format!("metrics_{}.json", index));
    if let Ok(content) = fs::read_to_string(&json_path).await {
        // Malformed JSON is non-fatal: treat as an empty record (§4.2 step 3).
        let parsed: MetricsJson = serde_json::from_str(&content).unwrap_or_default();
        return RawMetrics {
            elapsed_seconds: parsed.elapsed_seconds,
            max_rss_kb: parsed.max_rss_kb,
            exit_code: parsed.exit_code,
        };
    }

    let txt_path = workdir.join(format!("metrics_{}.txt", index));
    if let Ok(content) = fs::read_to_string(&txt_path).await {
        return parse_time_v_output(&content);
    }

    RawMetrics::default()
}

/// Extract the fields `/usr/bin/time -v` emits, via plain (non-doubled)
/// patterns per spec.md §9's Open Questions.
fn parse_time_v_output(text: &str) -> RawMetrics {
    let elapsed_seconds = text
        .lines()
        .find(|line| line.contains("Elapsed (wall clock) time"))
        .and_then(|line| line.find("): ").map(|idx| &line[idx + 3..]))
        .and_then(|value| parse_elapsed(value.trim()));

    let max_rss_kb = text
        .lines()
        .find_map(|line| line.split_once("Maximum resident set size (kbytes):"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok());

    RawMetrics {
        elapsed_seconds,
        max_rss_kb,
        exit_code: None,
    }
}

/// Parse `H:MM:SS.ff`, `M:SS.ff`, or `S.ff` into seconds (§4.2 step 5).
pub fn parse_elapsed(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parts: Vec<&str> = value.split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut seconds = 0.0f64;
    for part in &parts {
        let component: f64 = part.parse().ok()?;
        seconds = seconds * 60.0 + component;
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_parses_hms() {
        assert_eq!(parse_elapsed("1:02:03"), Some(3723.0));
    }

    #[test]
    fn elapsed_parses_ms() {
        assert_eq!(parse_elapsed("2:03.5"), Some(123.5));
    }

    #[test]
    fn elapsed_parses_seconds_only() {
        assert_eq!(parse_elapsed("0.25"), Some(0.25));
    }

    #[test]
    fn elapsed_empty_is_null() {
        assert_eq!(parse_elapsed(""), None);
    }

    #[test]
    fn elapsed_garbage_is_null() {
        assert_eq!(parse_elapsed("bad"), None);
    }

    #[test]
    fn time_v_text_extracts_elapsed_and_rss() {
        let text = "\tElapsed (wall clock) time (h:mm:ss or m:ss): 0:01.23\n\tMaximum resident set size (kbytes): 4096\n";
        let metrics = parse_time_v_output(text);
        assert_eq!(metrics.elapsed_seconds, Some(1.23));
        assert_eq!(metrics.max_rss_kb, Some(4096));
    }

    #[test]
    fn malformed_json_metrics_is_non_fatal() {
        let parsed: MetricsJson = serde_json::from_str("{not json}").unwrap_or_default();
        assert_eq!(parsed.elapsed_seconds, None);
    }

    #[tokio::test]
    async fn parse_stops_at_first_missing_verdict() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("verdict_1.txt"), "OK\n").await.unwrap();
        tokio::fs::write(
            dir.path().join("metrics_1.json"),
            r#"{"elapsed_seconds":0.01,"max_rss_kb":1024,"exit_code":0}"#,
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("verdict_2.txt"), "WA\n").await.unwrap();
        // no verdict_3.txt -> enumeration stops at 2

        let parsed = parse(dir.path()).await;
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].verdict, "OK");
        assert_eq!(parsed[0].metrics.elapsed_seconds, Some(0.01));
        assert_eq!(parsed[1].verdict, "WA");
        assert_eq!(parsed[1].metrics, RawMetrics::default());
    }

    #[tokio::test]
    async fn parse_falls_back_to_text_metrics() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("verdict_1.txt"), "OK\n").await.unwrap();
        tokio::fs::write(
            dir.path().join("metrics_1.txt"),
            "Elapsed (wall clock) time (h:mm:ss or m:ss): 0:00.05\nMaximum resident set size (kbytes): 2048\n",
        )
        .await
        .unwrap();

        let parsed = parse(dir.path()).await;
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].metrics.elapsed_seconds, Some(0.05));
        assert_eq!(parsed[0].metrics.max_rss_kb, Some(2048));
    }

    #[tokio::test]
    async fn parse_empty_dir_yields_no_tests() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = parse(dir.path()).await;
        assert!(parsed.is_empty());
    }
}
