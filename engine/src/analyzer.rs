//! The orchestrator: document event in, published diagnostics out.
//!
//! ```text
//! execute(doc) ─▶ ConfigProvider::snapshot ─▶ Invocation::build
//!              ─▶ TaskQueue::enqueue ─▶ ProcessRunner::run ─▶ (await exit)
//!              ─▶ TaskToken::finish_with { classify ─▶ parse ─▶ map ─▶ sink.set }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use packlint_config::{ConfigProvider, SeverityPolicy, StderrPolicy};
use packlint_types::{Diagnostic, DocumentId};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::invocation::Invocation;
use crate::mapper::diagnostics_for_document;
use crate::notifier::Notifier;
use crate::output::{OutputError, parse_output};
use crate::queue::{Task, TaskQueue, TaskToken};
use crate::runner::{ProcessError, ProcessOutput, ProcessRunner, RunningProcess};
use crate::store::DiagnosticSink;

/// Language ids the tool understands.
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["ruby", "gemfile"];

/// An open editor document as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    pub language_id: String,
    /// Live buffer contents, which may differ from what is on disk.
    pub text: String,
    /// Never saved; has no meaningful path yet.
    pub untitled: bool,
}

impl Document {
    pub fn new(id: DocumentId, language_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            language_id: language_id.into(),
            text: text.into(),
            untitled: false,
        }
    }

    #[must_use]
    pub fn is_analysable(&self) -> bool {
        SUPPORTED_LANGUAGES.contains(&self.language_id.as_str())
            && !self.untitled
            && self.id.is_file()
    }
}

/// A finished run that produced a warning instead of diagnostics.
///
/// `Display` is exactly the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("{command} is not executable")]
    NotExecutable { command: String },
    /// The shell could not run the command (exit 127).
    #[error("{stderr}")]
    CommandFailed { stderr: String },
    #[error("{stderr}")]
    Stderr { stderr: String },
    #[error("failed to run {command}: {message}")]
    Io { command: String, message: String },
    #[error("command {command} returns empty output! please check configuration.")]
    EmptyOutput { command: String },
    #[error("Error on parsing output (It might non-JSON output) : \"{output}\"")]
    MalformedOutput { output: String },
}

/// How one run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A full replacement set of `count` diagnostics went to the sink.
    Published { count: usize },
    Warned(AnalysisError),
    /// Superseded or cleared before it could publish. Nothing was observable.
    Canceled,
}

/// Turn a finished process into diagnostics, or the single warning to show.
pub fn classify(
    output: &ProcessOutput,
    command: &str,
    severity: SeverityPolicy,
    stderr_policy: StderrPolicy,
) -> Result<Vec<Diagnostic>, AnalysisError> {
    match &output.error {
        Some(ProcessError::NotFound) => {
            return Err(AnalysisError::NotExecutable {
                command: command.to_string(),
            });
        }
        Some(ProcessError::ExitCode(127)) => {
            return Err(AnalysisError::CommandFailed {
                stderr: output.stderr.clone(),
            });
        }
        Some(ProcessError::Io(message)) => {
            return Err(AnalysisError::Io {
                command: command.to_string(),
                message: message.clone(),
            });
        }
        // The tool exits non-zero whenever it finds violations.
        Some(ProcessError::ExitCode(_) | ProcessError::Aborted) | None => {}
    }

    if !output.stderr.is_empty() {
        match stderr_policy {
            StderrPolicy::Warn => {
                return Err(AnalysisError::Stderr {
                    stderr: output.stderr.clone(),
                });
            }
            StderrPolicy::Ignore => {
                tracing::debug!(stderr = %output.stderr, "Ignoring tool stderr");
            }
        }
    }

    let report = parse_output(&output.stdout).map_err(|err| match err {
        OutputError::Empty => AnalysisError::EmptyOutput {
            command: command.to_string(),
        },
        OutputError::Malformed(output) => AnalysisError::MalformedOutput { output },
    })?;
    tracing::debug!(
        files = report.files.len(),
        violations = report.violation_count(),
        "Parsed report"
    );
    Ok(diagnostics_for_document(&report, severity))
}

/// Awaitable result of one [`Analyzer::execute`] call.
#[derive(Debug)]
pub struct AnalysisHandle {
    id: DocumentId,
    rx: oneshot::Receiver<RunOutcome>,
}

impl AnalysisHandle {
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Wait for the run to end. A run that is dropped without reporting
    /// (its runtime shut down) counts as canceled.
    pub async fn outcome(self) -> RunOutcome {
        self.rx.await.unwrap_or(RunOutcome::Canceled)
    }
}

/// Everything a run needs after the process exits, fixed at `execute` time.
struct Completion {
    id: DocumentId,
    command: String,
    severity: SeverityPolicy,
    stderr: StderrPolicy,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn DiagnosticSink>,
}

impl Completion {
    fn finish(self, token: TaskToken, output: ProcessOutput) -> RunOutcome {
        if output.error == Some(ProcessError::Aborted) {
            token.finish();
            tracing::debug!(document = %self.id, "Run aborted");
            return RunOutcome::Canceled;
        }

        let published = token.finish_with(|| {
            match classify(&output, &self.command, self.severity, self.stderr) {
                Ok(diagnostics) => {
                    let count = diagnostics.len();
                    self.sink.set(&self.id, diagnostics);
                    tracing::info!(document = %self.id, count, "Published diagnostics");
                    RunOutcome::Published { count }
                }
                Err(err) => {
                    tracing::warn!(document = %self.id, "Analysis failed: {err}");
                    self.notifier.warn(&err.to_string());
                    RunOutcome::Warned(err)
                }
            }
        });

        published.unwrap_or_else(|| {
            tracing::debug!(document = %self.id, "Dropping result of superseded run");
            RunOutcome::Canceled
        })
    }
}

/// Runs the tool for documents and publishes what it finds.
///
/// Cheap to clone; clones share the task queue, so a save handled through
/// one clone supersedes a run started through another.
#[derive(Clone)]
pub struct Analyzer {
    config: Arc<dyn ConfigProvider>,
    runner: Arc<dyn ProcessRunner>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn DiagnosticSink>,
    queue: TaskQueue<DocumentId>,
    roots: Vec<PathBuf>,
}

impl Analyzer {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        runner: Arc<dyn ProcessRunner>,
        notifier: Arc<dyn Notifier>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            config,
            runner,
            notifier,
            sink,
            queue: TaskQueue::new(),
            roots: Vec::new(),
        }
    }

    /// Workspace roots, in priority order. The first is the working directory.
    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Start a run for `document`, superseding any run in flight for it.
    ///
    /// Returns `None` without side effects for documents the tool cannot
    /// analyse: other languages, untitled buffers, non-file URIs. Must be
    /// called from within a tokio runtime.
    pub fn execute(&self, document: &Document) -> Option<AnalysisHandle> {
        if !document.is_analysable() {
            tracing::trace!(document = %document.id, language = %document.language_id, "Skipping document");
            return None;
        }
        let path = document.id.to_file_path()?;
        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(document = %document.id, "No tokio runtime; cannot start analysis");
            return None;
        };

        let config = self.config.snapshot();
        let invocation = Invocation::build(&path, &config, &self.roots, self.notifier.as_ref());
        tracing::debug!(
            document = %document.id,
            command = %invocation.command,
            args = ?invocation.args,
            "Queueing analysis"
        );

        let completion = Completion {
            id: document.id.clone(),
            command: config.command,
            severity: config.severity,
            stderr: config.stderr,
            notifier: Arc::clone(&self.notifier),
            sink: Arc::clone(&self.sink),
        };
        let runner = Arc::clone(&self.runner);
        let text = document.text.clone();
        let (tx, rx) = oneshot::channel();

        self.queue.enqueue(Task::new(document.id.clone(), move |token| {
            let RunningProcess { output, abort } = runner.run(&invocation, text);
            runtime.spawn(async move {
                let outcome = completion.finish(token, output.await);
                let _ = tx.send(outcome);
            });
            abort
        }));

        Some(AnalysisHandle {
            id: document.id.clone(),
            rx,
        })
    }

    /// Cancel any run in flight for `id` and drop its published diagnostics.
    pub fn clear(&self, id: &DocumentId) {
        if !id.is_file() {
            return;
        }
        self.queue.cancel(id);
        self.sink.delete(id);
        tracing::debug!(document = %id, "Cleared diagnostics");
    }

    /// Whether runs should wait for saves rather than follow every edit.
    #[must_use]
    pub fn is_on_save(&self) -> bool {
        self.config.snapshot().on_save
    }

    /// Whether a run for `id` is registered and has not finished.
    #[must_use]
    pub fn is_running(&self, id: &DocumentId) -> bool {
        self.queue.is_pending(id)
    }

    /// Cancel everything in flight. Published diagnostics are left alone.
    pub fn shutdown(&self) {
        tracing::debug!(in_flight = self.queue.len(), "Cancelling all analysis runs");
        self.queue.cancel_all();
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("roots", &self.roots)
            .field("in_flight", &self.queue.len())
            .finish_non_exhaustive()
    }
}
