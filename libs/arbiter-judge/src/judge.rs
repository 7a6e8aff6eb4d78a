//! Judge orchestrator: (code, language, tests, limits) in, verdict out.
//!
//! The pipeline is staged but has no state machine: validate, combine with
//! the language harness, execute in the sandbox, parse the harness summary,
//! classify, score. Every fault on the way folds into exactly one of the
//! seven terminal verdicts; nothing propagates to the caller as an error.

use crate::harness;
use crate::sandbox::{ExecutionOutput, SandboxBackend, MIN_MEMORY_MB};
use arbiter_common::types::{EvaluationResult, JobRequest, TestDetail, Verdict};
use serde::Deserialize;

/// Summary the harness emits as the last line of stdout
#[derive(Debug, Deserialize)]
struct HarnessSummary {
    #[serde(default)]
    tests: Vec<TestDetail>,
    #[serde(default)]
    total_time: f64,
    passed: u32,
    total: u32,
}

pub struct Judge<B> {
    sandbox: B,
}

impl<B: SandboxBackend> Judge<B> {
    pub fn new(sandbox: B) -> Self {
        Judge { sandbox }
    }

    /// Evaluate one submission end to end.
    ///
    /// Caller/configuration faults (empty code, no tests, bad limits) return
    /// SystemError without touching the sandbox. Backend faults also map to
    /// SystemError so a judging outage is never billed to the submitter.
    pub async fn evaluate(&self, job: &JobRequest) -> EvaluationResult {
        let tests_total = job.tests.len() as u32;

        if let Err(reason) = validate(job) {
            tracing::warn!(submission = %job.id, reason = %reason, "rejected before execution");
            return EvaluationResult::rejected(Verdict::SystemError, tests_total, reason);
        }

        let combined = match harness::combine(job.language, &job.source_code, &job.tests) {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(submission = %job.id, error = %e, "harness assembly failed");
                return EvaluationResult::rejected(
                    Verdict::SystemError,
                    tests_total,
                    "could not assemble the test harness",
                );
            }
        };

        let output = match self
            .sandbox
            .execute(job.language, &combined, job.time_limit, job.memory_limit)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(submission = %job.id, error = %e, "sandbox execution failed");
                return EvaluationResult::rejected(
                    Verdict::SystemError,
                    tests_total,
                    "the judging backend is unavailable",
                );
            }
        };

        if let Some(verdict) = output.preliminary.verdict() {
            tracing::info!(submission = %job.id, verdict = %verdict, elapsed = output.elapsed, "propagating executor verdict");
            return propagated(verdict, tests_total, output);
        }

        analyze(output, tests_total)
    }
}

fn validate(job: &JobRequest) -> Result<(), String> {
    if job.source_code.trim().is_empty() {
        return Err("empty source code".to_string());
    }
    if job.tests.is_empty() {
        return Err("no tests configured for this challenge".to_string());
    }
    if !(job.time_limit > 0.0) {
        return Err("time limit must be positive".to_string());
    }
    if job.memory_limit < MIN_MEMORY_MB {
        return Err(format!(
            "memory limit below the {} MB floor",
            MIN_MEMORY_MB
        ));
    }
    Ok(())
}

/// Executor already classified the run; carry its verdict and outputs through
fn propagated(verdict: Verdict, tests_total: u32, output: ExecutionOutput) -> EvaluationResult {
    EvaluationResult {
        verdict,
        score: 0,
        tests_passed: 0,
        tests_total,
        elapsed_time: Some(output.elapsed),
        stdout: output.stdout,
        stderr: output.stderr,
        per_test_detail: Vec::new(),
    }
}

/// Decide AC/WA/RE from the harness summary of a run that exited cleanly
fn analyze(output: ExecutionOutput, tests_total: u32) -> EvaluationResult {
    let summary = match parse_summary(&output.stdout) {
        Some(summary) => summary,
        None => {
            // User code corrupted its own stdout before the summary line
            let mut stderr = output.stderr;
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str("could not interpret program output");
            return EvaluationResult {
                verdict: Verdict::RuntimeError,
                score: 0,
                tests_passed: 0,
                tests_total,
                elapsed_time: Some(output.elapsed),
                stdout: output.stdout,
                stderr,
                per_test_detail: Vec::new(),
            };
        }
    };

    if summary.total == 0 {
        return EvaluationResult {
            verdict: Verdict::SystemError,
            score: 0,
            tests_passed: 0,
            tests_total,
            elapsed_time: Some(output.elapsed),
            stdout: output.stdout,
            stderr: "the harness reported no executed tests".to_string(),
            per_test_detail: Vec::new(),
        };
    }

    let tests_passed = summary.passed.min(summary.total);
    let verdict = if tests_passed == summary.total {
        Verdict::Accepted
    } else if summary.tests.iter().any(|t| t.error.is_some()) {
        Verdict::RuntimeError
    } else {
        Verdict::WrongAnswer
    };

    EvaluationResult {
        verdict,
        score: proportional_score(tests_passed, summary.total),
        tests_passed,
        tests_total: summary.total,
        elapsed_time: Some(summary.total_time),
        stdout: output.stdout,
        stderr: output.stderr,
        per_test_detail: summary.tests,
    }
}

/// The summary must be the last non-empty stdout line
fn parse_summary(stdout: &str) -> Option<HarnessSummary> {
    let last_line = stdout.trim_end().lines().last()?;
    serde_json::from_str(last_line).ok()
}

/// floor(100 * passed / total), 0 for an empty run
pub fn proportional_score(passed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (u64::from(passed) * 100 / u64::from(total)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{PreliminaryVerdict, SandboxError};
    use arbiter_common::types::{Language, TestKind, TestSpec};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Plays back a queue of scripted outcomes; panics if the orchestrator
    /// reaches the sandbox when a test expects it not to
    struct ScriptedSandbox {
        outcomes: Mutex<VecDeque<Result<ExecutionOutput, SandboxError>>>,
    }

    impl ScriptedSandbox {
        fn with(outcomes: Vec<Result<ExecutionOutput, SandboxError>>) -> Self {
            ScriptedSandbox {
                outcomes: Mutex::new(outcomes.into()),
            }
        }

        fn unreachable() -> Self {
            Self::with(Vec::new())
        }
    }

    #[async_trait]
    impl SandboxBackend for ScriptedSandbox {
        async fn execute(
            &self,
            _language: Language,
            _source: &str,
            _time_limit: f64,
            _memory_limit_mb: u64,
        ) -> Result<ExecutionOutput, SandboxError> {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("sandbox invoked but no outcome scripted")
        }
    }

    fn ran_ok(stdout: &str) -> ExecutionOutput {
        ExecutionOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: 0,
            elapsed: 0.25,
            preliminary: PreliminaryVerdict::RanOk,
        }
    }

    fn backend_error() -> SandboxError {
        SandboxError::Staging(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "scripted failure",
        ))
    }

    fn suma_job(tests: usize) -> JobRequest {
        let tests = (0..tests)
            .map(|i| TestSpec {
                name: format!("case {}", i + 1),
                order: (i + 1) as u32,
                kind: TestKind::FunctionCall {
                    function_name: "suma".to_string(),
                    args: vec![2.into(), 3.into()],
                    kwargs: serde_json::Map::new(),
                },
                expected_output: "5".to_string(),
                hidden: true,
                time_limit: None,
                memory_limit: None,
            })
            .collect();

        JobRequest {
            id: Uuid::new_v4(),
            submitter: "tribute-7".to_string(),
            challenge: "sum-two-numbers".to_string(),
            language: Language::Python,
            source_code: "def suma(a, b):\n    return a + b\n".to_string(),
            tests,
            time_limit: 2.0,
            memory_limit: 128,
            submitted_at: chrono::Utc::now(),
        }
    }

    const ACCEPTED_SUMMARY: &str = r#"{"tests":[{"name":"case 1","passed":true,"time":0.001,"expected":"5","actual":"5"},{"name":"case 2","passed":true,"time":0.001,"expected":"0","actual":"0"}],"total_time":0.002,"passed":2,"total":2}"#;

    #[tokio::test]
    async fn test_accepted_end_to_end() {
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(ACCEPTED_SUMMARY))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::Accepted);
        assert_eq!(result.score, 100);
        assert_eq!(result.tests_passed, 2);
        assert_eq!(result.tests_total, 2);
        assert_eq!(result.elapsed_time, Some(0.002));
        assert_eq!(result.per_test_detail.len(), 2);
        assert_eq!(result.per_test_detail[0].name, "case 1");
        assert_eq!(result.per_test_detail[1].name, "case 2");
    }

    #[tokio::test]
    async fn test_wrong_answer_all_failed() {
        let summary = r#"{"tests":[{"name":"case 1","passed":false,"time":0.001,"expected":"5","actual":"-1"},{"name":"case 2","passed":false,"time":0.001,"expected":"0","actual":"-10"}],"total_time":0.002,"passed":0,"total":2}"#;
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(summary))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::WrongAnswer);
        assert_eq!(result.score, 0);
        assert_eq!(result.tests_passed, 0);
        assert_eq!(result.tests_total, 2);
    }

    #[tokio::test]
    async fn test_partial_credit_score() {
        let summary = r#"{"tests":[{"name":"a","passed":true,"time":0.001},{"name":"b","passed":false,"time":0.001,"expected":"0","actual":"1"}],"total_time":0.002,"passed":1,"total":2}"#;
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(summary))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::WrongAnswer);
        assert_eq!(result.score, 50);
        assert_eq!(result.tests_passed, 1);
    }

    #[tokio::test]
    async fn test_per_test_error_becomes_runtime_error() {
        let summary = r#"{"tests":[{"name":"a","passed":true,"time":0.001},{"name":"b","passed":false,"time":0.001,"error":"division by zero","error_type":"ZeroDivisionError"}],"total_time":0.002,"passed":1,"total":2}"#;
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(summary))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert_eq!(result.score, 50);
        assert_eq!(
            result.per_test_detail[1].error.as_deref(),
            Some("division by zero")
        );
    }

    #[tokio::test]
    async fn test_stray_prints_before_summary_are_tolerated() {
        let stdout = format!("debug print\nanother one\n{}\n", ACCEPTED_SUMMARY);
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(&stdout))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::Accepted);
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn test_corrupted_stdout_is_runtime_error() {
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(
            "I printed over my own summary",
        ))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::RuntimeError);
        assert_eq!(result.score, 0);
        assert_eq!(result.tests_total, 2);
        assert!(result.stderr.contains("could not interpret program output"));
    }

    #[tokio::test]
    async fn test_executor_verdicts_propagate() {
        for (preliminary, expected) in [
            (PreliminaryVerdict::TimedOut, Verdict::TimeLimitExceeded),
            (PreliminaryVerdict::MemoryExceeded, Verdict::MemoryLimitExceeded),
            (PreliminaryVerdict::CompileError, Verdict::CompilationError),
            (PreliminaryVerdict::RuntimeError, Verdict::RuntimeError),
        ] {
            let output = ExecutionOutput {
                stdout: String::new(),
                stderr: "boom".to_string(),
                exit_code: 1,
                elapsed: 1.5,
                preliminary,
            };
            let judge = Judge::new(ScriptedSandbox::with(vec![Ok(output)]));
            let result = judge.evaluate(&suma_job(2)).await;

            assert_eq!(result.verdict, expected);
            assert_eq!(result.score, 0);
            assert_eq!(result.tests_passed, 0);
            assert_eq!(result.tests_total, 2);
            assert_eq!(result.elapsed_time, Some(1.5));
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_system_error() {
        let judge = Judge::new(ScriptedSandbox::with(vec![Err(backend_error())]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::SystemError);
        assert_eq!(result.score, 0);
        assert!(result.stderr.contains("judging backend is unavailable"));
    }

    #[tokio::test]
    async fn test_empty_code_rejected_before_sandbox() {
        let mut job = suma_job(2);
        job.source_code = "   \n".to_string();

        let judge = Judge::new(ScriptedSandbox::unreachable());
        let result = judge.evaluate(&job).await;

        assert_eq!(result.verdict, Verdict::SystemError);
        assert_eq!(result.score, 0);
        assert_eq!(result.tests_total, 2);
    }

    #[tokio::test]
    async fn test_empty_tests_rejected_before_sandbox() {
        let job = suma_job(0);

        let judge = Judge::new(ScriptedSandbox::unreachable());
        let result = judge.evaluate(&job).await;

        assert_eq!(result.verdict, Verdict::SystemError);
        assert_eq!(result.tests_total, 0);
        assert!(result.stderr.contains("no tests configured"));
    }

    #[tokio::test]
    async fn test_bad_limits_rejected_before_sandbox() {
        let mut job = suma_job(1);
        job.memory_limit = 8;
        let judge = Judge::new(ScriptedSandbox::unreachable());
        let result = judge.evaluate(&job).await;
        assert_eq!(result.verdict, Verdict::SystemError);
        assert!(result.stderr.contains("memory limit"));

        let mut job = suma_job(1);
        job.time_limit = 0.0;
        let judge = Judge::new(ScriptedSandbox::unreachable());
        let result = judge.evaluate(&job).await;
        assert_eq!(result.verdict, Verdict::SystemError);
        assert!(result.stderr.contains("time limit"));
    }

    #[tokio::test]
    async fn test_harness_reporting_zero_tests_is_system_error() {
        let summary = r#"{"tests":[],"total_time":0.0,"passed":0,"total":0}"#;
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(summary))]));
        let result = judge.evaluate(&suma_job(2)).await;

        assert_eq!(result.verdict, Verdict::SystemError);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_lying_harness_counts_are_clamped() {
        let summary = r#"{"tests":[{"name":"a","passed":true,"time":0.001}],"total_time":0.001,"passed":9,"total":1}"#;
        let judge = Judge::new(ScriptedSandbox::with(vec![Ok(ran_ok(summary))]));
        let result = judge.evaluate(&suma_job(1)).await;

        assert!(result.tests_passed <= result.tests_total);
        assert_eq!(result.tests_passed, 1);
        assert_eq!(result.verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_same_inputs_same_verdict() {
        let judge = Judge::new(ScriptedSandbox::with(vec![
            Ok(ran_ok(ACCEPTED_SUMMARY)),
            Ok(ran_ok(ACCEPTED_SUMMARY)),
        ]));
        let job = suma_job(2);

        let first = judge.evaluate(&job).await;
        let second = judge.evaluate(&job).await;

        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.score, second.score);
        assert_eq!(first.tests_passed, second.tests_passed);
    }

    #[test]
    fn test_proportional_score_floors() {
        assert_eq!(proportional_score(0, 0), 0);
        assert_eq!(proportional_score(0, 3), 0);
        assert_eq!(proportional_score(1, 3), 33);
        assert_eq!(proportional_score(2, 3), 66);
        assert_eq!(proportional_score(3, 3), 100);
        assert_eq!(proportional_score(1, 2), 50);
    }

    #[test]
    fn test_parse_summary_takes_last_line() {
        let stdout = "noise\n{\"passed\":1,\"total\":1}\n";
        let summary = parse_summary(stdout).unwrap();
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.total, 1);

        assert!(parse_summary("").is_none());
        assert!(parse_summary("not json at all").is_none());
        assert!(parse_summary("{\"passed\":1,\"total\":1}\ntrailing junk").is_none());
    }
}
