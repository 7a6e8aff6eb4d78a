//! Filter sandbox stderr before it reaches a submitter.

/// Lines surviving the filter are capped at this many
const MAX_LINES: usize = 20;

/// Substrings that mark a line as internal (mount paths, the isolation
/// backend, container identifiers); matched case-insensitively
const SENSITIVE: [&str; 4] = ["/code/", "/tmp/", "docker", "container"];

/// Drop lines that reveal sandbox internals and bound the result.
/// The unfiltered text stays in the stored record; only this filtered form
/// may be shown for RE/CE/SE verdicts.
pub fn redact_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            !SENSITIVE.iter().any(|keyword| lower.contains(keyword))
        })
        .take(MAX_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_internal_path_lines() {
        let stderr = "Traceback (most recent call last):\n  File \"/code/solution.py\", line 3, in <module>\nZeroDivisionError: division by zero";
        let filtered = redact_stderr(stderr);

        assert!(filtered.contains("Traceback"));
        assert!(filtered.contains("ZeroDivisionError"));
        assert!(!filtered.contains("/code/"));
    }

    #[test]
    fn test_drops_backend_lines_case_insensitively() {
        let stderr = "error from Docker daemon\nOCI runtime create failed in CONTAINER xyz\nuser-visible message";
        let filtered = redact_stderr(stderr);

        assert_eq!(filtered, "user-visible message");
    }

    #[test]
    fn test_caps_line_count() {
        let noisy: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let filtered = redact_stderr(&noisy);

        assert_eq!(filtered.lines().count(), 20);
        assert!(filtered.ends_with("line 19"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(redact_stderr(""), "");
    }
}
