//! Worker output interpretation.
//!
//! The worker's captured stdout/stderr is the only signal the agent gets about
//! a running job. Interpretation is a pure function of the full text: every
//! call re-parses from scratch and nothing is cached.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Marker phrase on the line announcing the tracking URL.
const TRACKING_MARKER: &str = "The url to track the job";

/// Substring marking a successful run.
const SUCCESS_MARKER: &str = "completed successfully";

/// Substring marking a failed run.
const FAILURE_MARKER: &str = "failed with state";

/// Line prefix of a fatal client-side error.
const ERROR_PREFIX: &str = "ERROR: ";

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());

static PROGRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"INFO mapreduce\.Job: {2}map (\S+) reduce (\S+)").unwrap()
});

/// Terminal outcome reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Facts extracted from one read of the captured output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// URL the worker registered with its execution backend. First one wins.
    pub tracking: Option<String>,
    /// Most recent progress report, e.g. `"100% 35%"`.
    pub progress: Option<String>,
    /// Last terminal marker seen, if any.
    pub outcome: Option<Outcome>,
}

/// Turns worker output text into a [`WorkerReport`].
pub trait OutputInterpreter: Send + Sync {
    fn interpret(&self, text: &str) -> WorkerReport;
}

/// Interpreter for Hadoop `jar` client logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HadoopLogInterpreter;

impl OutputInterpreter for HadoopLogInterpreter {
    fn interpret(&self, text: &str) -> WorkerReport {
        WorkerReport {
            tracking: tracking_url(text),
            progress: progress(text),
            outcome: outcome(text),
        }
    }
}

/// Read the capture file. Invalid UTF-8 is replaced rather than rejected.
pub async fn read_capture(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn tracking_url(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| line.contains(TRACKING_MARKER))
        .find_map(|line| URL.find(line))
        .map(|m| m.as_str().to_string())
}

fn progress(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| PROGRESS.captures(line))
        .last()
        .map(|caps| format!("{} {}", &caps[1], &caps[2]))
}

fn outcome(text: &str) -> Option<Outcome> {
    text.lines().map(str::trim).fold(None, |last, line| {
        if line.contains(SUCCESS_MARKER) {
            Some(Outcome::Success)
        } else if line.contains(FAILURE_MARKER) || line.starts_with(ERROR_PREFIX) {
            Some(Outcome::Failure)
        } else {
            last
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNNING_LOG: &str = "\
15/03/02 10:11:09 INFO client.RMProxy: Connecting to ResourceManager at rm/10.0.0.1:8032
15/03/02 10:11:11 INFO mapreduce.Job: The url to track the job: http://tracker/123/ (more text)
15/03/02 10:11:11 INFO mapreduce.Job: Running job: job_1425_0001
15/03/02 10:11:20 INFO mapreduce.Job:  map 0% reduce 0%
15/03/02 10:12:40 INFO mapreduce.Job:  map 57% reduce 0%
15/03/02 10:14:02 INFO mapreduce.Job:  map 100% reduce 19%
";

    fn interpret(text: &str) -> WorkerReport {
        HadoopLogInterpreter.interpret(text)
    }

    #[test]
    fn extracts_tracking_url() {
        let report = interpret(
            "noise\n... The url to track the job http://tracker/123 ...\nmore\n",
        );
        assert_eq!(report.tracking.as_deref(), Some("http://tracker/123"));
    }

    #[test]
    fn tracking_url_keeps_first_and_skips_marker_lines_without_url() {
        let text = "The url to track the job: (pending)\n\
                    The url to track the job: https://rm:8088/proxy/app_1/\n\
                    The url to track the job: https://rm:8088/proxy/app_2/\n";
        assert_eq!(
            interpret(text).tracking.as_deref(),
            Some("https://rm:8088/proxy/app_1/")
        );
    }

    #[test]
    fn progress_uses_last_report() {
        let report = interpret(RUNNING_LOG);
        assert_eq!(report.progress.as_deref(), Some("100% 19%"));
        assert_eq!(report.tracking.as_deref(), Some("http://tracker/123/"));
        assert_eq!(report.outcome, None);
    }

    #[test]
    fn nothing_found_in_fresh_output() {
        assert_eq!(interpret(""), WorkerReport::default());
        assert_eq!(
            interpret("15/03/02 10:11:09 INFO client.RMProxy: Connecting\n"),
            WorkerReport::default()
        );
    }

    #[test]
    fn success_then_failure_is_failure() {
        let text = "Job job_1 completed successfully\nJob job_2 failed with state FAILED\n";
        assert_eq!(interpret(text).outcome, Some(Outcome::Failure));
    }

    #[test]
    fn failure_then_success_is_success() {
        let text = "Job job_1 failed with state KILLED\nJob job_2 completed successfully\n";
        assert_eq!(interpret(text).outcome, Some(Outcome::Success));
    }

    #[test]
    fn error_prefix_is_failure_only_at_line_start() {
        assert_eq!(
            interpret("  ERROR: Could not find jar\n").outcome,
            Some(Outcome::Failure)
        );
        assert_eq!(interpret("15/03/02 10:11 ERROR: retrying\n").outcome, None);
    }

    #[test]
    fn interpretation_is_idempotent() {
        let text = format!("{RUNNING_LOG}15/03/02 10:20:00 INFO mapreduce.Job: Job job_1425_0001 completed successfully\n");
        let first = interpret(&text);
        let second = interpret(&text);
        assert_eq!(first, second);
        assert_eq!(first.outcome, Some(Outcome::Success));
    }

    #[tokio::test]
    async fn read_capture_tolerates_invalid_utf8() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, b"map \xff done\n").unwrap();
        let text = read_capture(&path).await.unwrap();
        assert!(text.starts_with("map "));
        assert!(text.ends_with(" done\n"));
    }

    #[tokio::test]
    async fn read_capture_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(read_capture(&dir.path().join("absent.log")).await.is_err());
    }
}
