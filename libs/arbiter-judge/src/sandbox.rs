//! Sandbox executor: one disposable, resource-capped Docker container per run.
//!
//! Every invocation gets a fresh container with the combined source mounted
//! read-only, no network, hard memory cap with no swap fallback, one CPU core
//! equivalent, a process-count ceiling, and a wall-clock bound of the time
//! limit plus a fixed grace margin. The container is killed and force-removed
//! on every exit path, including timeouts and backend errors.

use arbiter_common::types::{Language, Verdict};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Extra wall-clock seconds allowed past the nominal time limit before the
/// container is killed
pub const GRACE_SECS: f64 = 1.0;

/// Smallest memory cap a job may request, MB
pub const MIN_MEMORY_MB: u64 = 32;

/// Ceiling on concurrent processes/threads inside one sandbox
const PIDS_LIMIT: i64 = 64;

/// cpu_quota == cpu_period caps the sandbox at one core equivalent
const CPU_PERIOD: i64 = 100_000;

/// Captured stdout/stderr are bounded; runs that overflow lose their tail
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Exit code the kernel reports for an OOM-killed container
const OOM_EXIT_CODE: i64 = 137;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("could not reach the isolation backend")]
    Backend(#[from] bollard::errors::Error),
    #[error("could not stage the submission source")]
    Staging(#[from] std::io::Error),
}

/// Coarse classification the executor can make on its own. Correctness
/// (accepted vs wrong answer) is decided one layer up, after parsing the
/// harness summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreliminaryVerdict {
    RanOk,
    TimedOut,
    MemoryExceeded,
    CompileError,
    RuntimeError,
}

impl PreliminaryVerdict {
    /// The verdict to propagate directly, None when the run completed and
    /// the harness output decides
    pub fn verdict(self) -> Option<Verdict> {
        match self {
            PreliminaryVerdict::RanOk => None,
            PreliminaryVerdict::TimedOut => Some(Verdict::TimeLimitExceeded),
            PreliminaryVerdict::MemoryExceeded => Some(Verdict::MemoryLimitExceeded),
            PreliminaryVerdict::CompileError => Some(Verdict::CompilationError),
            PreliminaryVerdict::RuntimeError => Some(Verdict::RuntimeError),
        }
    }
}

/// Raw outcome of one sandboxed run
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    /// Wall seconds from container start to exit or kill
    pub elapsed: f64,
    pub preliminary: PreliminaryVerdict,
}

/// Execution recipe for one language: which image to boot, how to invoke the
/// combined source, and what the source file must be called under /code
#[derive(Debug, Clone)]
pub struct RuntimeSpec {
    pub image: String,
    pub command: Vec<String>,
    pub file_name: String,
}

/// Immutable language-to-runtime mapping, injected at sandbox construction
#[derive(Debug, Clone)]
pub struct RuntimeRegistry {
    python: RuntimeSpec,
    java: RuntimeSpec,
    javascript: RuntimeSpec,
}

impl RuntimeRegistry {
    /// Stock images and invocations for the supported set
    pub fn standard() -> Self {
        RuntimeRegistry {
            python: RuntimeSpec {
                image: "python:3.11-slim".to_string(),
                command: vec!["python".to_string(), "/code/solution.py".to_string()],
                file_name: "solution.py".to_string(),
            },
            java: RuntimeSpec {
                // /code is read-only, so compiled classes go to /tmp
                image: "openjdk:17-slim".to_string(),
                command: vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "javac -d /tmp /code/Main.java && java -cp /tmp Main".to_string(),
                ],
                file_name: "Main.java".to_string(),
            },
            javascript: RuntimeSpec {
                image: "node:18-slim".to_string(),
                command: vec!["node".to_string(), "/code/solution.js".to_string()],
                file_name: "solution.js".to_string(),
            },
        }
    }

    /// Replace the recipe for one language (custom image mirrors, pinned tags)
    pub fn with_spec(mut self, language: Language, spec: RuntimeSpec) -> Self {
        match language {
            Language::Python => self.python = spec,
            Language::Java => self.java = spec,
            Language::JavaScript => self.javascript = spec,
        }
        self
    }

    pub fn spec(&self, language: Language) -> &RuntimeSpec {
        match language {
            Language::Python => &self.python,
            Language::Java => &self.java,
            Language::JavaScript => &self.javascript,
        }
    }
}

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Seam between the orchestrator and the isolation mechanism. Any
/// implementation must guarantee a bounded wait: the call returns within
/// time_limit + grace + setup overhead no matter what the code does.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    async fn execute(
        &self,
        language: Language,
        source: &str,
        time_limit: f64,
        memory_limit_mb: u64,
    ) -> Result<ExecutionOutput, SandboxError>;
}

/// Docker-backed sandbox
pub struct DockerSandbox {
    docker: Docker,
    registry: RuntimeRegistry,
}

struct RawRun {
    stdout: String,
    stderr: String,
    exit_code: i64,
    elapsed: f64,
    timed_out: bool,
}

impl DockerSandbox {
    /// Connect to the local Docker daemon; an unreachable daemon is a
    /// construction-time failure, not a per-run verdict
    pub fn new(registry: RuntimeRegistry) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(DockerSandbox { docker, registry })
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    /// Pull the image if it is not already in the local cache
    pub async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        if self.docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image = %image, "pulling sandbox image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress?;
        }
        Ok(())
    }

    /// Pre-populate the shared image cache for every supported language
    pub async fn pull_images(&self) -> Result<(), SandboxError> {
        for language in Language::all_variants() {
            let spec = self.registry.spec(*language);
            tracing::info!(language = %language, image = %spec.image, "ensuring sandbox image");
            self.ensure_image(&spec.image).await?;
        }
        Ok(())
    }

    async fn run_to_completion(
        &self,
        container_id: &str,
        time_limit: f64,
    ) -> Result<RawRun, SandboxError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        let started = Instant::now();

        let deadline = Duration::from_secs_f64(time_limit + GRACE_SECS);
        let mut wait_stream = self.docker.wait_container(
            container_id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        let (exit_code, timed_out) = match tokio::time::timeout(deadline, wait_stream.next()).await
        {
            Ok(Some(Ok(response))) => (response.status_code, false),
            // A non-zero exit surfaces as a wait error carrying the code
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => {
                (code, false)
            }
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => (-1, false),
            Err(_) => {
                let _ = self
                    .docker
                    .kill_container(container_id, None::<KillContainerOptions<String>>)
                    .await;
                (OOM_EXIT_CODE, true)
            }
        };
        let elapsed = started.elapsed().as_secs_f64();

        let stdout = self.collect_logs(container_id, true).await;
        let stderr = self.collect_logs(container_id, false).await;

        Ok(RawRun {
            stdout,
            stderr,
            exit_code,
            elapsed,
            timed_out,
        })
    }

    async fn collect_logs(&self, container_id: &str, want_stdout: bool) -> String {
        let options = LogsOptions::<String> {
            stdout: want_stdout,
            stderr: !want_stdout,
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));
        let mut collected = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => {
                    collected.push_str(&String::from_utf8_lossy(&message));
                    if collected.len() >= MAX_CAPTURE_BYTES {
                        let mut cut = MAX_CAPTURE_BYTES;
                        while !collected.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        collected.truncate(cut);
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        collected
    }
}

#[async_trait]
impl SandboxBackend for DockerSandbox {
    async fn execute(
        &self,
        language: Language,
        source: &str,
        time_limit: f64,
        memory_limit_mb: u64,
    ) -> Result<ExecutionOutput, SandboxError> {
        let spec = self.registry.spec(language);
        self.ensure_image(&spec.image).await?;

        // Exclusive staging dir for this run, removed on drop
        let staging = tempfile::tempdir()?;
        let source_path = staging.path().join(&spec.file_name);
        tokio::fs::write(&source_path, source).await?;

        let memory_bytes = i64::try_from(memory_limit_mb)
            .unwrap_or(i64::MAX)
            .saturating_mul(1024 * 1024);
        let host_config = HostConfig {
            binds: Some(vec![format!(
                "{}:/code:ro",
                staging.path().to_string_lossy()
            )]),
            memory: Some(memory_bytes),
            // memory_swap == memory means no swap fallback
            memory_swap: Some(memory_bytes),
            cpu_period: Some(CPU_PERIOD),
            cpu_quota: Some(CPU_PERIOD),
            pids_limit: Some(PIDS_LIMIT),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some("/code".to_string()),
            network_disabled: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("arbiter-{}", Uuid::new_v4());
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await?;

        let run = self.run_to_completion(&container.id, time_limit).await;

        // Kill, then remove, ignoring errors from either; this runs on every
        // exit path before any error propagates
        let _ = self
            .docker
            .kill_container(&container.id, None::<KillContainerOptions<String>>)
            .await;
        let _ = self
            .docker
            .remove_container(
                &container.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        let run = run?;
        let preliminary = classify(run.exit_code, run.elapsed, time_limit, run.timed_out, &run.stderr);
        tracing::debug!(
            language = %language,
            exit_code = run.exit_code,
            elapsed = run.elapsed,
            preliminary = ?preliminary,
            "sandbox run finished"
        );

        Ok(ExecutionOutput {
            stdout: run.stdout,
            stderr: run.stderr,
            exit_code: run.exit_code,
            elapsed: run.elapsed,
            preliminary,
        })
    }
}

/// Best-effort coarse classification. The stderr substring checks are
/// interpreter-specific and can misread unfamiliar error formats; treat the
/// result as a hint, not a guarantee.
pub fn classify(
    exit_code: i64,
    elapsed: f64,
    time_limit: f64,
    timed_out: bool,
    stderr: &str,
) -> PreliminaryVerdict {
    if timed_out || elapsed >= time_limit {
        return PreliminaryVerdict::TimedOut;
    }

    if exit_code == 0 {
        return PreliminaryVerdict::RanOk;
    }

    if exit_code == OOM_EXIT_CODE
        || stderr.contains("OutOfMemoryError")
        || stderr.contains("MemoryError")
        || stderr.contains("JavaScript heap out of memory")
    {
        return PreliminaryVerdict::MemoryExceeded;
    }

    if stderr.contains("SyntaxError") || (stderr.contains(".java:") && stderr.contains("error:")) {
        return PreliminaryVerdict::CompileError;
    }

    PreliminaryVerdict::RuntimeError
}
