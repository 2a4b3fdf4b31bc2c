//! Boundary to the ingestion collaborator.
//!
//! Cloning, traversal, filtering and binary detection all happen on the other
//! side of [`Ingestor`]. This crate only hands over the normalized reference
//! and limits, and receives the summary report plus the packed content.
//!
//! Failures cross the boundary as data ([`IngestionFailure`]) carrying a
//! message, a type tag and a diagnostic trace, which the HTTP layer returns
//! verbatim in its 500 body.

use crate::reference::RepositoryReference;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// What to ingest and under which limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRequest {
    /// Normalized repository URL
    pub reference: RepositoryReference,

    /// Files larger than this many bytes are skipped by the collaborator
    pub max_file_size: u64,

    /// Comma-joined sanitized exclusion globs; `None` means no filter
    pub exclude_patterns: Option<String>,
}

/// What the collaborator returns on success.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestOutput {
    /// Short positional report (see [`crate::summary`])
    pub summary: String,

    /// Directory tree listing; not used for budgeting
    #[serde(default)]
    pub tree: String,

    /// Flat concatenation of every ingested file
    pub content: String,
}

/// A failed ingestion, described as data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct IngestionFailure {
    /// Human-readable description
    pub message: String,

    /// Type tag of the failure, e.g. `Timeout` or the collaborator's exception name
    pub kind: String,

    /// Full diagnostic trace
    pub trace: String,
}

impl IngestionFailure {
    /// Creates a failure record.
    #[must_use]
    pub fn new(message: impl Into<String>, kind: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            trace: trace.into(),
        }
    }
}

/// The external component that clones a repository and flattens its files.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Ingests one repository. A single attempt; no retries.
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestOutput, IngestionFailure>;
}

/// Runs an external bridge command per request.
///
/// The command is invoked as
/// `<program> [args...] <reference> --max-file-size=<bytes> [--exclude-patterns=<globs>]`
/// and must print `{"summary": ..., "tree": ..., "content": ...}` as JSON on
/// stdout. On failure it should exit non-zero; when the last stderr line has
/// the form `<Kind>: <message>` (as a Python traceback does), that line
/// provides the failure's type tag and message.
#[derive(Debug, Clone)]
pub struct CommandIngestor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandIngestor {
    /// Creates an ingestor from a program and its leading arguments.
    ///
    /// `timeout` bounds the whole run; the child is killed when it expires.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn build_command(&self, request: &IngestRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(request.reference.as_str())
            .arg(format!("--max-file-size={}", request.max_file_size));

        // One argument per option: a glob may itself start with `-`.
        if let Some(patterns) = &request.exclude_patterns {
            command.arg(format!("--exclude-patterns={patterns}"));
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Ingestor for CommandIngestor {
    async fn ingest(&self, request: &IngestRequest) -> Result<IngestOutput, IngestionFailure> {
        debug!(program = %self.program, reference = %request.reference, "spawning ingestion command");

        let child = self.build_command(request).spawn().map_err(|e| {
            IngestionFailure::new(
                format!("Failed to start ingestion command '{}': {e}", self.program),
                "SpawnError",
                format!("{e:?}"),
            )
        })?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                warn!(reference = %request.reference, ?limit, "ingestion timed out");
                IngestionFailure::new(
                    format!("Ingestion timed out after {limit:?}"),
                    "Timeout",
                    format!("ingestion of {} exceeded {limit:?}", request.reference),
                )
            })?,
            None => wait.await,
        }
        .map_err(|e| IngestionFailure::new(format!("Ingestion command I/O error: {e}"), "IoError", format!("{e:?}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(failure_from_stderr(&stderr, &output.status.to_string()));
        }

        serde_json::from_slice::<IngestOutput>(&output.stdout).map_err(|e| {
            IngestionFailure::new(
                format!("Ingestion command produced invalid output: {e}"),
                "InvalidIngestOutput",
                stderr,
            )
        })
    }
}

/// Derives message and type tag from the last stderr line when it looks like
/// `SomeError: message`; otherwise reports the exit status.
fn failure_from_stderr(stderr: &str, status: &str) -> IngestionFailure {
    let last_line = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty());

    let parsed = last_line.and_then(|line| {
        let (kind, message) = line.split_once(": ")?;
        is_type_name(kind).then(|| (kind.to_string(), message.to_string()))
    });

    match (parsed, last_line) {
        (Some((kind, message)), _) => IngestionFailure::new(message, kind, stderr),
        (None, Some(line)) => IngestionFailure::new(line, "IngestionCommandError", stderr),
        (None, None) => IngestionFailure::new(
            format!("Ingestion command failed ({status})"),
            "IngestionCommandError",
            stderr,
        ),
    }
}

fn is_type_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ExcludeFilter;
    use crate::reference::normalize;

    fn request(patterns: Option<&str>) -> IngestRequest {
        IngestRequest {
            reference: normalize("https://github.com/octo/demo").unwrap(),
            max_file_size: 1024,
            exclude_patterns: patterns.map(str::to_string),
        }
    }

    fn shell(script: &str, timeout: Option<Duration>) -> CommandIngestor {
        CommandIngestor::new("sh", vec!["-c".to_string(), script.to_string(), "ingest".to_string()], timeout)
    }

    #[test]
    fn test_failure_from_python_traceback() {
        let stderr = "Traceback (most recent call last):\n  File \"x.py\", line 1\nValueError: Repository too big\n";
        let failure = failure_from_stderr(stderr, "exit status: 1");
        assert_eq!(failure.kind, "ValueError");
        assert_eq!(failure.message, "Repository too big");
        assert_eq!(failure.trace, stderr);
    }

    #[test]
    fn test_failure_from_qualified_exception() {
        let failure = failure_from_stderr("gitingest.errors.AsyncTimeoutError: slow\n", "exit status: 1");
        assert_eq!(failure.kind, "gitingest.errors.AsyncTimeoutError");
    }

    #[test]
    fn test_failure_from_plain_line() {
        let failure = failure_from_stderr("fatal: could not read from remote\n", "exit status: 128");
        assert_eq!(failure.kind, "fatal");

        let failure = failure_from_stderr("something went wrong\n", "exit status: 2");
        assert_eq!(failure.kind, "IngestionCommandError");
        assert_eq!(failure.message, "something went wrong");
    }

    #[test]
    fn test_failure_from_empty_stderr() {
        let failure = failure_from_stderr("", "exit status: 3");
        assert_eq!(failure.kind, "IngestionCommandError");
        assert!(failure.message.contains("exit status: 3"));
    }

    #[test]
    fn test_is_type_name() {
        assert!(is_type_name("RuntimeError"));
        assert!(is_type_name("_Private.Error2"));
        assert!(!is_type_name("two words"));
        assert!(!is_type_name("9Lives"));
        assert!(!is_type_name(""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_passes_arguments_and_parses_output() {
        let script = r#"printf '{"summary":"%s %s","content":"%s|%s"}' "$1" "$2" "$3" "$#""#;
        let output = shell(script, None).ingest(&request(Some("*.md,**/*.md"))).await.unwrap();

        assert_eq!(output.summary, "https://github.com/octo/demo --max-file-size=1024");
        assert_eq!(output.content, "--exclude-patterns=*.md,**/*.md|3");
        assert_eq!(output.tree, "");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_keeps_dash_leading_glob_attached() {
        let filter = ExcludeFilter::from_raw(&["-draft*".to_string()]).unwrap();
        let patterns = filter.joined();

        let script = r#"printf '{"summary":"%s","content":"%s"}' "$#" "$3""#;
        let output = shell(script, None).ingest(&request(patterns.as_deref())).await.unwrap();

        assert_eq!(output.summary, "3");
        assert_eq!(output.content, "--exclude-patterns=-draft*,**/-draft*");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_omits_filter_when_absent() {
        let script = r#"printf '{"summary":"%s","content":""}' "$#""#;
        let output = shell(script, None).ingest(&request(None)).await.unwrap();
        assert_eq!(output.summary, "2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_uses_stderr() {
        let script = "echo 'Traceback (most recent call last):' >&2; echo 'RuntimeError: clone failed' >&2; exit 1";
        let failure = shell(script, None).ingest(&request(None)).await.unwrap_err();

        assert_eq!(failure.kind, "RuntimeError");
        assert_eq!(failure.message, "clone failed");
        assert!(failure.trace.contains("Traceback"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_invalid_json() {
        let failure = shell("echo not-json", None).ingest(&request(None)).await.unwrap_err();
        assert_eq!(failure.kind, "InvalidIngestOutput");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let failure = shell("sleep 5", Some(Duration::from_millis(100)))
            .ingest(&request(None))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, "Timeout");
        assert_eq!(failure.message, "Ingestion timed out after 100ms");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let ingestor = CommandIngestor::new("/nonexistent/ingest-bridge", vec![], None);
        let failure = ingestor.ingest(&request(None)).await.unwrap_err();
        assert_eq!(failure.kind, "SpawnError");
    }
}
