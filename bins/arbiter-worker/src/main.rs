use anyhow::Context;
use arbiter_common::ledger;
use arbiter_common::types::{JobRequest, JobStatus, Language, Submission, Verdict};
use arbiter_common::Config;
use arbiter_judge::{redact, DockerSandbox, Judge, RuntimeRegistry};
use chrono::Utc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arbiter worker booting...");

    let config = Config::from_env();

    // Each worker serves exactly one language queue
    let language_str =
        std::env::var("WORKER_LANGUAGE").unwrap_or_else(|_| "python".to_string());
    let language = Language::from_str(&language_str).with_context(|| {
        format!(
            "invalid WORKER_LANGUAGE: {} (valid: python, java, javascript)",
            language_str
        )
    })?;

    let client = redis::Client::open(config.redis_url.as_str())
        .context("failed to create Redis client")?;
    let mut redis_conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;
    info!(redis_url = %config.redis_url, "connected to Redis");

    // An unreachable Docker daemon is a boot failure, not a per-job verdict
    let sandbox = DockerSandbox::new(RuntimeRegistry::standard())
        .context("failed to connect to the Docker daemon")?;

    if config.prepull_images {
        let image = sandbox.registry().spec(language).image.clone();
        sandbox
            .ensure_image(&image)
            .await
            .context("failed to pre-pull the sandbox image")?;
        info!(image = %image, "sandbox image ready");
    }

    let judge = Judge::new(sandbox);

    info!(
        language = %language,
        queue = %ledger::queue_name(&language),
        "listening for jobs"
    );

    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        info!("received shutdown signal, draining");
    };

    tokio::select! {
        result = worker_loop(&mut redis_conn, &judge, language, config.max_time_limit) => result?,
        _ = shutdown => {}
    }

    info!("worker shutdown complete");
    Ok(())
}

async fn worker_loop(
    conn: &mut redis::aio::ConnectionManager,
    judge: &Judge<DockerSandbox>,
    language: Language,
    max_time_limit: f64,
) -> anyhow::Result<()> {
    loop {
        // Bounded BLPOP so shutdown gets a look-in between jobs
        match ledger::pop_job(conn, &language, 5).await {
            Ok(Some(mut job)) => {
                if job.language != language {
                    warn!(
                        submission = %job.id,
                        expected = %language,
                        got = %job.language,
                        "job landed on the wrong queue"
                    );
                }
                if job.time_limit > max_time_limit {
                    warn!(
                        submission = %job.id,
                        requested = job.time_limit,
                        clamped = max_time_limit,
                        "time limit above the configured ceiling"
                    );
                    job.time_limit = max_time_limit;
                }
                handle_job(conn, judge, job).await;
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "ledger error, backing off");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// One complete job: mark running, evaluate, persist, announce.
/// Ledger hiccups are logged and never take the loop down.
async fn handle_job(
    conn: &mut redis::aio::ConnectionManager,
    judge: &Judge<DockerSandbox>,
    job: JobRequest,
) {
    info!(
        submission = %job.id,
        challenge = %job.challenge,
        tests = job.tests.len(),
        source_bytes = job.source_code.len(),
        "evaluating submission"
    );

    let mut submission = Submission::pending(&job);
    if let Err(e) = ledger::set_status(conn, &job.id, JobStatus::Running).await {
        warn!(submission = %job.id, error = %e, "could not mark submission running");
    }

    let result = judge.evaluate(&job).await;
    submission.complete(result, Utc::now());

    info!(
        submission = %submission.id,
        verdict = %submission.verdict,
        score = submission.score,
        passed = submission.tests_passed,
        total = submission.tests_total,
        "evaluation finished"
    );

    if let Err(e) = ledger::store_result(conn, &submission).await {
        error!(submission = %submission.id, error = %e, "could not persist result");
        return;
    }
    if let Err(e) = ledger::set_status(conn, &submission.id, JobStatus::Completed).await {
        warn!(submission = %submission.id, error = %e, "could not update status");
    }

    // Only filtered error text leaves the ledger on the event channel
    let error_message = match submission.verdict {
        Verdict::RuntimeError | Verdict::CompilationError | Verdict::SystemError => {
            Some(redact::redact_stderr(&submission.stderr))
        }
        _ => None,
    };
    if let Err(e) =
        ledger::publish_completion(conn, &submission, error_message.as_deref()).await
    {
        warn!(submission = %submission.id, error = %e, "could not publish completion event");
    }
}
