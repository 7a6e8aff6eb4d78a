use crate::types::{JobRequest, JobStatus, Language, Submission};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Submission ledger on Redis
///
/// Key semantics are defined here so producers and workers never drift:
/// - `arbiter:queue:<language>` - pending jobs, one list per language
/// - `arbiter:result:<id>`      - the persisted Submission record
/// - `arbiter:status:<id>`      - coarse lifecycle (queued/running/completed)
///
/// Result records are never expired or deleted by the judge.

pub const QUEUE_PREFIX: &str = "arbiter:queue";
pub const RESULT_PREFIX: &str = "arbiter:result";
pub const STATUS_PREFIX: &str = "arbiter:status";
pub const COMPLETION_CHANNEL: &str = "arbiter:events:completions";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger connection error")]
    Redis(#[from] redis::RedisError),
    #[error("could not encode ledger record")]
    Encode(#[from] serde_json::Error),
}

/// Generate deterministic queue name for a language
pub fn queue_name(language: &Language) -> String {
    format!("{}:{}", QUEUE_PREFIX, language)
}

/// Generate result key for a submission
pub fn result_key(id: &Uuid) -> String {
    format!("{}:{}", RESULT_PREFIX, id)
}

/// Generate status key for a submission
pub fn status_key(id: &Uuid) -> String {
    format!("{}:{}", STATUS_PREFIX, id)
}

/// Enqueue a job on its language queue
/// The status key is written before the job becomes poppable so a fast
/// worker cannot have its Running mark overwritten
pub async fn push_job(conn: &mut ConnectionManager, job: &JobRequest) -> Result<(), LedgerError> {
    let payload = serde_json::to_string(job)?;
    set_status(conn, &job.id, JobStatus::Queued).await?;
    conn.rpush::<_, _, ()>(queue_name(&job.language), payload)
        .await?;
    Ok(())
}

/// Blocking pop from a language queue
/// Returns None when the timeout elapses with no job, so callers can check
/// for shutdown between waits
pub async fn pop_job(
    conn: &mut ConnectionManager,
    language: &Language,
    timeout_secs: usize,
) -> Result<Option<JobRequest>, LedgerError> {
    let reply: Option<(String, String)> = conn.blpop(queue_name(language), timeout_secs as f64).await?;
    match reply {
        Some((_queue, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

/// Persist the Submission record under its result key
pub async fn store_result(
    conn: &mut ConnectionManager,
    submission: &Submission,
) -> Result<(), LedgerError> {
    let payload = serde_json::to_string(submission)?;
    conn.set::<_, _, ()>(result_key(&submission.id), payload)
        .await?;
    Ok(())
}

/// Update the coarse lifecycle status of a submission
pub async fn set_status(
    conn: &mut ConnectionManager,
    id: &Uuid,
    status: JobStatus,
) -> Result<(), LedgerError> {
    conn.set::<_, _, ()>(status_key(id), status.to_string())
        .await?;
    Ok(())
}

/// Event published when a submission reaches a terminal verdict.
/// `error_message` is the filtered error text safe to show the submitter;
/// raw stderr never travels on this channel.
#[derive(Debug, Serialize)]
struct CompletionEvent<'a> {
    submission_id: Uuid,
    challenge: &'a str,
    language: Language,
    verdict: &'a str,
    score: u32,
    tests_passed: u32,
    tests_total: u32,
    elapsed_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

/// Announce a completed evaluation on the completion channel
pub async fn publish_completion(
    conn: &mut ConnectionManager,
    submission: &Submission,
    error_message: Option<&str>,
) -> Result<(), LedgerError> {
    let event = CompletionEvent {
        submission_id: submission.id,
        challenge: &submission.challenge,
        language: submission.language,
        verdict: submission.verdict.code(),
        score: submission.score,
        tests_passed: submission.tests_passed,
        tests_total: submission.tests_total,
        elapsed_time: submission.elapsed_time,
        error_message,
    };
    let payload = serde_json::to_string(&event)?;
    conn.publish::<_, _, ()>(COMPLETION_CHANNEL, payload).await?;
    Ok(())
}
