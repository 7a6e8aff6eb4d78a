use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Strongly-typed language enum
/// The judge supports exactly this closed set; adding a language is a
/// compile-time extension (new variant + runtime spec + harness template)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    JavaScript,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for available languages
    pub fn all_variants() -> &'static [Language] {
        &[Language::Python, Language::Java, Language::JavaScript]
    }

    /// Parse a language from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Language> {
        match s.to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "javascript" => Some(Language::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
            Language::JavaScript => write!(f, "javascript"),
        }
    }
}

/// Final classification of a judged submission
///
/// `evaluate` terminates in exactly one of the seven terminal values;
/// `Pending` exists only as the stored record's initial state and is never
/// returned by the judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompilationError,
    #[serde(rename = "SE")]
    SystemError,
    #[serde(rename = "PE")]
    Pending,
}

impl Verdict {
    /// Short code used in stored records and operator output
    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::RuntimeError => "RE",
            Verdict::CompilationError => "CE",
            Verdict::SystemError => "SE",
            Verdict::Pending => "PE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Verdict::Pending)
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// How a single test drives the submitted program: either a call to a named
/// user-defined function, or an inline snippet whose printed output is
/// captured
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestKind {
    FunctionCall {
        function_name: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default)]
        kwargs: serde_json::Map<String, serde_json::Value>,
    },
    InlineCode { code: String },
}

/// Test Case Definition (Immutable Input)
/// Owned by the challenge definition, read-only to the judge
/// Ordering matters - execution is sequential in the supplied order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    pub order: u32,
    #[serde(flatten)]
    pub kind: TestKind,
    pub expected_output: String,
    /// Hidden tests are never surfaced to the submitter
    #[serde(default)]
    pub hidden: bool,
    /// Per-test overrides are carried and reported; enforcement is whole-run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
}

/// Per-Test Result
/// One entry of the harness summary line; order matches the supplied tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestDetail {
    pub name: String,
    pub passed: bool,
    /// Seconds spent inside the user code for this test
    #[serde(default)]
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// Evaluation Output
/// Returned by the judge to its caller; `per_test_detail` is internal-only
/// and must never be forwarded wholesale to the submitter
///
/// ## Invariants:
/// - tests_passed <= tests_total
/// - verdict == Accepted iff tests_passed == tests_total > 0
/// - score == floor(100 * tests_passed / tests_total), 0 when tests_total == 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub verdict: Verdict,
    pub score: u32,
    pub tests_passed: u32,
    pub tests_total: u32,
    /// Wall seconds, None when the run never produced a timing
    pub elapsed_time: Option<f64>,
    pub stdout: String,
    pub stderr: String,
    pub per_test_detail: Vec<TestDetail>,
}

impl EvaluationResult {
    /// Result for a run rejected before or during sandbox execution
    pub fn rejected(verdict: Verdict, tests_total: u32, stderr: impl Into<String>) -> Self {
        EvaluationResult {
            verdict,
            score: 0,
            tests_passed: 0,
            tests_total,
            elapsed_time: None,
            stdout: String::new(),
            stderr: stderr.into(),
            per_test_detail: Vec::new(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }
}

/// Job Input (Immutable)
/// A job is write-once - workers must not mutate input fields
///
/// ## Execution Semantics:
/// - Tests execute sequentially in the supplied order
/// - time_limit is wall seconds for the whole run, memory_limit is MB
/// - Tests are mandatory: an empty list is a configuration error, not a pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: Uuid,
    pub submitter: String,
    pub challenge: String,
    pub language: Language,
    pub source_code: String,
    pub tests: Vec<TestSpec>,
    pub time_limit: f64,
    pub memory_limit: u64,
    /// Set once by the producer when the job is created
    pub submitted_at: DateTime<Utc>,
}

/// Coarse lifecycle of a queued submission, tracked in the ledger status key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One judged attempt, as persisted in the ledger
/// Written once at submission, completed once when the verdict arrives,
/// never deleted automatically
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub submitter: String,
    pub challenge: String,
    pub language: Language,
    pub source_code: String,
    pub verdict: Verdict,
    pub score: u32,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub elapsed_time: Option<f64>,
    pub stdout: String,
    pub stderr: String,
    /// Hidden-test content lives here; the delivery layer decides what subset
    /// to expose
    pub per_test_detail: Vec<TestDetail>,
    pub submitted_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Fresh record for a job entering the queue; verdict starts at Pending
    pub fn pending(job: &JobRequest) -> Self {
        Submission {
            id: job.id,
            submitter: job.submitter.clone(),
            challenge: job.challenge.clone(),
            language: job.language,
            source_code: job.source_code.clone(),
            verdict: Verdict::Pending,
            score: 0,
            tests_passed: 0,
            tests_total: job.tests.len() as u32,
            elapsed_time: None,
            stdout: String::new(),
            stderr: String::new(),
            per_test_detail: Vec::new(),
            submitted_at: job.submitted_at,
            evaluated_at: None,
        }
    }

    /// Fold an evaluation into the record; evaluated_at is set exactly once
    pub fn complete(&mut self, result: EvaluationResult, evaluated_at: DateTime<Utc>) {
        self.verdict = result.verdict;
        self.score = result.score;
        self.tests_passed = result.tests_passed;
        self.tests_total = result.tests_total;
        self.elapsed_time = result.elapsed_time;
        self.stdout = result.stdout;
        self.stderr = result.stderr;
        self.per_test_detail = result.per_test_detail;
        if self.evaluated_at.is_none() {
            self.evaluated_at = Some(evaluated_at);
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.verdict.is_accepted()
    }

    /// Share of tests passed, as a percentage
    pub fn pass_rate(&self) -> f64 {
        if self.tests_total == 0 {
            return 0.0;
        }
        100.0 * f64::from(self.tests_passed) / f64::from(self.tests_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> JobRequest {
        JobRequest {
            id: Uuid::new_v4(),
            submitter: "tribute-12".to_string(),
            challenge: "sum-two-numbers".to_string(),
            language: Language::Python,
            source_code: "def suma(a, b):\n    return a + b\n".to_string(),
            tests: vec![
                TestSpec {
                    name: "suma(2, 3)".to_string(),
                    order: 1,
                    kind: TestKind::FunctionCall {
                        function_name: "suma".to_string(),
                        args: vec![2.into(), 3.into()],
                        kwargs: serde_json::Map::new(),
                    },
                    expected_output: "5".to_string(),
                    hidden: true,
                    time_limit: None,
                    memory_limit: None,
                },
                TestSpec {
                    name: "suma(-5, 5)".to_string(),
                    order: 2,
                    kind: TestKind::FunctionCall {
                        function_name: "suma".to_string(),
                        args: vec![(-5).into(), 5.into()],
                        kwargs: serde_json::Map::new(),
                    },
                    expected_output: "0".to_string(),
                    hidden: true,
                    time_limit: None,
                    memory_limit: None,
                },
            ],
            time_limit: 2.0,
            memory_limit: 128,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_language_serialization() {
        let json = serde_json::to_string(&Language::Python).unwrap();
        assert_eq!(json, "\"python\"");

        let deserialized: Language = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(deserialized, Language::JavaScript);
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!(Language::from_str("python"), Some(Language::Python));
        assert_eq!(Language::from_str("Python"), Some(Language::Python));
        assert_eq!(Language::from_str("JAVASCRIPT"), Some(Language::JavaScript));
        assert_eq!(Language::from_str("java"), Some(Language::Java));

        assert_eq!(Language::from_str("cobol"), None);
        assert_eq!(Language::from_str(""), None);
    }

    #[test]
    fn test_language_all_variants() {
        let variants = Language::all_variants();
        assert_eq!(variants.len(), 3);
        assert!(variants.contains(&Language::Python));
        assert!(variants.contains(&Language::Java));
        assert!(variants.contains(&Language::JavaScript));
    }

    #[test]
    fn test_verdict_codes() {
        assert_eq!(serde_json::to_string(&Verdict::Accepted).unwrap(), "\"AC\"");
        assert_eq!(
            serde_json::to_string(&Verdict::TimeLimitExceeded).unwrap(),
            "\"TLE\""
        );
        assert_eq!(Verdict::SystemError.code(), "SE");
        assert_eq!(Verdict::WrongAnswer.to_string(), "WA");

        let parsed: Verdict = serde_json::from_str("\"MLE\"").unwrap();
        assert_eq!(parsed, Verdict::MemoryLimitExceeded);
    }

    #[test]
    fn test_verdict_terminal() {
        assert!(Verdict::Accepted.is_terminal());
        assert!(Verdict::SystemError.is_terminal());
        assert!(!Verdict::Pending.is_terminal());
    }

    #[test]
    fn test_test_spec_function_call_parsing() {
        let json = r#"{
            "name": "suma(2, 3)",
            "order": 1,
            "function_name": "suma",
            "args": [2, 3],
            "expected_output": "5"
        }"#;

        let spec: TestSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "suma(2, 3)");
        assert!(!spec.hidden);
        match spec.kind {
            TestKind::FunctionCall {
                ref function_name,
                ref args,
                ..
            } => {
                assert_eq!(function_name, "suma");
                assert_eq!(args.len(), 2);
            }
            TestKind::InlineCode { .. } => panic!("expected a function call"),
        }
    }

    #[test]
    fn test_test_spec_inline_code_parsing() {
        let json = r#"{
            "name": "prints greeting",
            "order": 1,
            "code": "print('hola')",
            "expected_output": "hola",
            "hidden": true
        }"#;

        let spec: TestSpec = serde_json::from_str(json).unwrap();
        assert!(spec.hidden);
        assert!(matches!(spec.kind, TestKind::InlineCode { .. }));
    }

    #[test]
    fn test_job_request_round_trip() {
        let job = sample_job();
        let json = serde_json::to_string(&job).unwrap();
        let back: JobRequest = serde_json::from_str(&json).unwrap();

        assert_eq!(back.language, Language::Python);
        assert_eq!(back.tests.len(), 2);
        assert_eq!(back.tests[0].expected_output, "5");
        assert_eq!(back.time_limit, 2.0);
        assert_eq!(back.memory_limit, 128);
    }

    #[test]
    fn test_submission_pending_defaults() {
        let job = sample_job();
        let submission = Submission::pending(&job);

        assert_eq!(submission.verdict, Verdict::Pending);
        assert_eq!(submission.score, 0);
        assert_eq!(submission.tests_passed, 0);
        assert_eq!(submission.tests_total, 2);
        assert_eq!(submission.submitted_at, job.submitted_at);
        assert!(submission.evaluated_at.is_none());
    }

    #[test]
    fn test_submission_complete_sets_evaluated_at_once() {
        let job = sample_job();
        let mut submission = Submission::pending(&job);

        let first = Utc::now();
        submission.complete(
            EvaluationResult {
                verdict: Verdict::Accepted,
                score: 100,
                tests_passed: 2,
                tests_total: 2,
                elapsed_time: Some(0.01),
                stdout: String::new(),
                stderr: String::new(),
                per_test_detail: Vec::new(),
            },
            first,
        );
        assert_eq!(submission.evaluated_at, Some(first));
        assert!(submission.is_accepted());
        assert_eq!(submission.pass_rate(), 100.0);

        // A second completion must not move the evaluation timestamp
        let later = Utc::now();
        submission.complete(
            EvaluationResult::rejected(Verdict::SystemError, 2, "late"),
            later,
        );
        assert_eq!(submission.evaluated_at, Some(first));
    }

    #[test]
    fn test_rejected_result_shape() {
        let result = EvaluationResult::rejected(Verdict::SystemError, 4, "no tests configured");
        assert_eq!(result.verdict, Verdict::SystemError);
        assert_eq!(result.score, 0);
        assert_eq!(result.tests_passed, 0);
        assert_eq!(result.tests_total, 4);
        assert!(result.elapsed_time.is_none());
        assert!(result.per_test_detail.is_empty());
    }
}
