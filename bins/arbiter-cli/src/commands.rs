// CLI commands: local judging, queue submission, sandbox image management
use anyhow::{anyhow, bail, Context, Result};
use arbiter_common::types::{JobRequest, Language, TestSpec, Verdict};
use arbiter_common::{ledger, Config};
use arbiter_judge::{redact, DockerSandbox, Judge, RuntimeRegistry};
use chrono::Utc;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Judge one source file against a JSON test list, in-process
pub async fn judge_file(
    file: &Path,
    language: &str,
    tests_path: &Path,
    time_limit: f64,
    memory_limit: u64,
) -> Result<()> {
    let language = parse_language(language)?;

    let source_code = fs::read_to_string(file)
        .with_context(|| format!("failed to read source file {}", file.display()))?;

    let tests_raw = fs::read_to_string(tests_path)
        .with_context(|| format!("failed to read tests file {}", tests_path.display()))?;
    let tests: Vec<TestSpec> =
        serde_json::from_str(&tests_raw).context("tests file is not a valid test spec array")?;

    let challenge = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "local".to_string());

    let sandbox = DockerSandbox::new(RuntimeRegistry::standard())
        .context("failed to connect to the Docker daemon")?;
    let judge = Judge::new(sandbox);

    let job = JobRequest {
        id: Uuid::new_v4(),
        submitter: "local".to_string(),
        challenge,
        language,
        source_code,
        tests,
        time_limit,
        memory_limit,
        submitted_at: Utc::now(),
    };

    println!(
        "Judging {} ({} tests, {}s / {} MB)...",
        file.display(),
        job.tests.len(),
        time_limit,
        memory_limit
    );
    println!();

    let result = judge.evaluate(&job).await;

    println!("Verdict: {} ({})", result.verdict.code(), verdict_label(result.verdict));
    println!("Score:   {}/100", result.score);
    println!("Tests:   {}/{} passed", result.tests_passed, result.tests_total);
    if let Some(elapsed) = result.elapsed_time {
        println!("Time:    {:.3}s", elapsed);
    }

    // Error text is shown in the same filtered form a submitter would see
    if matches!(
        result.verdict,
        Verdict::RuntimeError | Verdict::CompilationError | Verdict::SystemError
    ) {
        let filtered = redact::redact_stderr(&result.stderr);
        if !filtered.is_empty() {
            println!();
            println!("{}", filtered);
        }
    }

    if !result.is_accepted() {
        std::process::exit(1);
    }
    Ok(())
}

/// Enqueue a job for a worker instead of judging in-process
pub async fn submit_job(
    file: &Path,
    language: &str,
    tests_path: &Path,
    challenge: &str,
    time_limit: f64,
    memory_limit: u64,
) -> Result<()> {
    let language = parse_language(language)?;

    let source_code = fs::read_to_string(file)
        .with_context(|| format!("failed to read source file {}", file.display()))?;
    let tests_raw = fs::read_to_string(tests_path)
        .with_context(|| format!("failed to read tests file {}", tests_path.display()))?;
    let tests: Vec<TestSpec> =
        serde_json::from_str(&tests_raw).context("tests file is not a valid test spec array")?;

    let config = Config::from_env();
    let client = redis::Client::open(config.redis_url.as_str())
        .context("failed to create Redis client")?;
    let mut conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("failed to connect to Redis")?;

    let job = JobRequest {
        id: Uuid::new_v4(),
        submitter: "local".to_string(),
        challenge: challenge.to_string(),
        language,
        source_code,
        tests,
        time_limit,
        memory_limit,
        submitted_at: Utc::now(),
    };

    ledger::push_job(&mut conn, &job)
        .await
        .context("failed to enqueue the job")?;

    println!("Queued submission {} on {}", job.id, ledger::queue_name(&language));
    println!("Result key: {}", ledger::result_key(&job.id));

    Ok(())
}

/// Pre-populate the sandbox image cache
pub async fn pull_images(language: Option<&str>) -> Result<()> {
    let sandbox = DockerSandbox::new(RuntimeRegistry::standard())
        .context("failed to connect to the Docker daemon")?;

    match language {
        Some(name) => {
            let language = parse_language(name)?;
            let image = sandbox.registry().spec(language).image.clone();
            println!("Pulling {} for {}...", image, language);
            sandbox
                .ensure_image(&image)
                .await
                .with_context(|| format!("failed to pull {}", image))?;
            println!("Image {} ready", image);
        }
        None => {
            sandbox
                .pull_images()
                .await
                .context("failed to pull sandbox images")?;
            println!("All sandbox images ready");
        }
    }

    Ok(())
}

/// Print the supported languages with their runtime recipes
pub fn list_languages() -> Result<()> {
    let registry = RuntimeRegistry::standard();

    println!(
        "{:<12} {:<20} {:<14} Command",
        "Language", "Image", "Source file"
    );
    println!("{}", "-".repeat(78));

    for language in Language::all_variants() {
        let spec = registry.spec(*language);
        println!(
            "{:<12} {:<20} {:<14} {}",
            language.to_string(),
            spec.image,
            spec.file_name,
            spec.command.join(" ")
        );
    }

    Ok(())
}

fn parse_language(name: &str) -> Result<Language> {
    if name.trim().is_empty() {
        bail!("language cannot be empty");
    }
    Language::from_str(name).ok_or_else(|| {
        anyhow!(
            "unsupported language: {} (valid: python, java, javascript)",
            name
        )
    })
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Accepted => "Accepted",
        Verdict::WrongAnswer => "Wrong Answer",
        Verdict::TimeLimitExceeded => "Time Limit Exceeded",
        Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
        Verdict::RuntimeError => "Runtime Error",
        Verdict::CompilationError => "Compilation Error",
        Verdict::SystemError => "System Error",
        Verdict::Pending => "Pending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language() {
        assert_eq!(parse_language("python").unwrap(), Language::Python);
        assert_eq!(parse_language("JavaScript").unwrap(), Language::JavaScript);
        assert!(parse_language("").is_err());
        assert!(parse_language("perl").is_err());
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(verdict_label(Verdict::Accepted), "Accepted");
        assert_eq!(verdict_label(Verdict::WrongAnswer), "Wrong Answer");
        assert_eq!(verdict_label(Verdict::SystemError), "System Error");
    }
}
