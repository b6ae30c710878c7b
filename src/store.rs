//! Job Store (C3): submission metadata, source code, compile log, and run
//! result in a keyed key-value store with TTLs, plus two FIFO work queues.
//!
//! Backed by Redis, narrowing the teacher's `redis_manager.rs` (worker-lease
//! allocation, pub/sub progress, multiple result channels) down to the plain
//! key/TTL/queue contract spec.md §4.3 and §6 actually call for. Reconnect
//! logic follows the same "retry the multiplexed connection" shape.

use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::CoreError;
use crate::model::{Status, Submission};

const BLOB_TTL_SECS: u64 = 3600;
const QUEUE_COMPILE: &str = "queue:compile";
const QUEUE_RUN: &str = "queue:run";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompileJob {
    pub submission_id: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunJob {
    pub submission_id: String,
    pub tmpdir: String,
    pub problem_id: String,
    pub lang: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<String>,
}

pub struct JobStore {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl JobStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("failed to build redis client")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(CoreError::Store)?;
        Ok(Self { client, conn })
    }

    async fn reconnect(&mut self) -> Result<()> {
        warn!("job store connection lost, reconnecting");
        self.conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CoreError::Store)?;
        Ok(())
    }

    fn sub_key(id: &str) -> String {
        format!("sub:{}", id)
    }
    fn code_key(id: &str) -> String {
        format!("code:{}", id)
    }
    fn compile_log_key(id: &str) -> String {
        format!("compile_log:{}", id)
    }
    fn run_result_key(id: &str) -> String {
        format!("run_result:{}", id)
    }

    pub async fn put_submission(&mut self, submission: &Submission) -> Result<()> {
        let fields: Vec<(&str, String)> = vec![
            ("status", submission.status.to_string()),
            ("problem_id", submission.problem_id.clone()),
            ("language", submission.language.clone()),
            ("std", submission.std.clone().unwrap_or_default()),
            ("opt", submission.opt.clone()),
            ("created_at", submission.created_at.to_string()),
        ];
        let key = Self::sub_key(&submission.id);
        self.conn.hset_multiple(&key, &fields).await?;
        Ok(())
    }

    /// Fetch a submission's hash fields. `None` if the key doesn't exist.
    pub async fn get_submission(&mut self, id: &str) -> Result<Option<Submission>> {
        use std::collections::HashMap;
        let key = Self::sub_key(id);
        let fields: HashMap<String, String> = self.conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let status = fields
            .get("status")
            .and_then(|s| parse_status(s))
            .unwrap_or(Status::Error);
        Ok(Some(Submission {
            id: id.to_string(),
            status,
            problem_id: fields.get("problem_id").cloned().unwrap_or_default(),
            language: fields.get("language").cloned().unwrap_or_default(),
            std: fields.get("std").filter(|s| !s.is_empty()).cloned(),
            opt: fields.get("opt").cloned().unwrap_or_default(),
            created_at: fields
                .get("created_at")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }))
    }

    pub async fn set_status(&mut self, id: &str, status: Status) -> Result<()> {
        let key = Self::sub_key(id);
        self.conn.hset(&key, "status", status.to_string()).await?;
        Ok(())
    }

    pub async fn put_code(&mut self, id: &str, text: &str) -> Result<()> {
        self.conn
            .set_ex::<_, _, ()>(Self::code_key(id), text, BLOB_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_code(&mut self, id: &str) -> Result<Option<String>> {
        Ok(self.conn.get(Self::code_key(id)).await?)
    }

    pub async fn put_compile_log(&mut self, id: &str, text: &str) -> Result<()> {
        self.conn
            .set_ex::<_, _, ()>(Self::compile_log_key(id), text, BLOB_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_compile_log(&mut self, id: &str) -> Result<Option<String>> {
        Ok(self.conn.get(Self::compile_log_key(id)).await?)
    }

    pub async fn put_run_result<T: Serialize + Sync>(&mut self, id: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn
            .set_ex::<_, _, ()>(Self::run_result_key(id), json, BLOB_TTL_SECS)
            .await?;
        Ok(())
    }

    pub async fn get_run_result<T: DeserializeOwned>(&mut self, id: &str) -> Result<Option<T>> {
        let raw: Option<String> = self.conn.get(Self::run_result_key(id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s)?),
            None => None,
        })
    }

    pub async fn enqueue_compile(&mut self, payload: &CompileJob) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        self.conn.lpush::<_, _, ()>(QUEUE_COMPILE, json).await?;
        Ok(())
    }

    pub async fn enqueue_run(&mut self, payload: &RunJob) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        self.conn.lpush::<_, _, ()>(QUEUE_RUN, json).await?;
        Ok(())
    }

    /// Blocking pop with a timeout; `None` if nothing arrived in time.
    pub async fn dequeue_compile(&mut self, timeout: Duration) -> Result<Option<CompileJob>> {
        self.dequeue(QUEUE_COMPILE, timeout).await
    }

    pub async fn dequeue_run(&mut self, timeout: Duration) -> Result<Option<RunJob>> {
        self.dequeue(QUEUE_RUN, timeout).await
    }

    async fn dequeue<T: DeserializeOwned>(
        &mut self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<T>> {
        let secs = timeout.as_secs_f64().max(0.0);
        let popped: Option<(String, String)> = match self.conn.brpop(queue, secs).await {
            Ok(v) => v,
            Err(e) => {
                warn!("dequeue({}) failed: {}. Reconnecting...", queue, e);
                self.reconnect().await?;
                self.conn.brpop(queue, secs).await?
            }
        };
        match popped {
            Some((_, payload)) => Ok(Some(
                serde_json::from_str(&payload).context("malformed queue payload")?,
            )),
            None => Ok(None),
        }
    }
}

fn parse_status(s: &str) -> Option<Status> {
    Some(match s {
        "queued" => Status::Queued,
        "compiled" => Status::Compiled,
        "done" => Status::Done,
        "failed" => Status::Failed,
        "compile_error" => Status::CompileError,
        "compile_timeout" => Status::CompileTimeout,
        "run_timeout" => Status::RunTimeout,
        "problem_not_found" => Status::ProblemNotFound,
        "error" => Status::Error,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_string_form() {
        for s in [
            Status::Queued,
            Status::Compiled,
            Status::Done,
            Status::Failed,
            Status::CompileError,
            Status::CompileTimeout,
            Status::RunTimeout,
            Status::ProblemNotFound,
            Status::Error,
        ] {
            assert_eq!(parse_status(&s.to_string()), Some(s));
        }
    }

    #[test]
    fn unknown_status_string_is_none() {
        assert_eq!(parse_status("not_a_status"), None);
    }
}
