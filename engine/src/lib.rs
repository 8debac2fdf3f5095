//! Packwerk analysis engine.
//!
//! Turns editor document events into tool runs and tool output into
//! published diagnostics, with at most one run in flight per document.
//! Collaborators (process runner, notifier, diagnostic sink, configuration)
//! are traits so the editor bridge and the tests can supply their own.

pub mod analyzer;
pub mod invocation;
pub mod mapper;
pub mod notifier;
pub mod output;
pub mod queue;
pub mod runner;
pub mod store;

pub use analyzer::{
    AnalysisError, AnalysisHandle, Analyzer, Document, RunOutcome, SUPPORTED_LANGUAGES, classify,
};
pub use invocation::{Invocation, JSON_FORMAT_ARGS};
pub use mapper::{FileDiagnostics, diagnostics_for_document, map_report, to_diagnostic};
pub use notifier::{LogNotifier, Notifier};
pub use output::{OutputError, parse_output};
pub use queue::{Task, TaskQueue, TaskState, TaskToken};
pub use runner::{ProcessError, ProcessOutput, ProcessRunner, RunningProcess, TokioProcessRunner};
pub use store::{DiagnosticSink, DiagnosticsStore};
