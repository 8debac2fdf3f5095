//! Shared test utilities and fixtures
//!
//! Fakes for the engine's collaborators, so scenarios can decide exactly
//! when a "process" finishes and what it printed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::FutureExt;
use futures_util::future::AbortHandle;
use packlint_config::{ConfigProvider, PackwerkConfig};
use packlint_engine::{
    Analyzer, DiagnosticSink, Document, Invocation, Notifier, ProcessError, ProcessOutput,
    ProcessRunner, RunningProcess,
};
use packlint_types::{Diagnostic, DocumentId};
use tokio::sync::oneshot;

pub const ONE_VIOLATION: &str = r#"{"files":[{"path":"app/models/a.rb","violations":[
    {"message":"Privacy violation: '::Billing::Card' is private","type":"privacy",
     "location":{"line":3,"column":5,"length":4}}]}]}"#;

pub const CLEAN: &str = r#"{"files":[]}"#;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// A run the fake runner started and the test has not finished yet.
pub struct PendingRun {
    pub invocation: Invocation,
    pub stdin: String,
    pub abort: AbortHandle,
    complete: oneshot::Sender<ProcessOutput>,
}

impl PendingRun {
    /// Let the "process" exit with `output`. Ignored if the run was aborted.
    pub fn complete(self, output: ProcessOutput) {
        let _ = self.complete.send(output);
    }
}

/// Process runner whose runs finish only when the test says so.
///
/// With `honor_abort` off, firing the abort handle is recorded but the run
/// still completes, like a process that ignores its kill signal for a while.
pub struct FakeRunner {
    honor_abort: bool,
    runs: Mutex<Vec<PendingRun>>,
}

impl FakeRunner {
    pub fn new(honor_abort: bool) -> Self {
        Self {
            honor_abort,
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn take_runs(&self) -> Vec<PendingRun> {
        lock(&self.runs).drain(..).collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, invocation: &Invocation, stdin: String) -> RunningProcess {
        let (complete, rx) = oneshot::channel();
        let output = async move {
            rx.await
                .unwrap_or_else(|_| ProcessOutput::failed(ProcessError::Io("run dropped".into())))
        };

        let running = if self.honor_abort {
            RunningProcess::abortable(output)
        } else {
            let (abort, _registration) = AbortHandle::new_pair();
            RunningProcess {
                output: output.boxed(),
                abort,
            }
        };

        lock(&self.runs).push(PendingRun {
            invocation: invocation.clone(),
            stdin,
            abort: running.abort.clone(),
            complete,
        });
        running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Set(DocumentId, Vec<Diagnostic>),
    Delete(DocumentId),
}

#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn set(&self, id: &DocumentId, diagnostics: Vec<Diagnostic>) {
        lock(&self.calls).push(SinkCall::Set(id.clone(), diagnostics));
    }

    fn delete(&self, id: &DocumentId) {
        lock(&self.calls).push(SinkCall::Delete(id.clone()));
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn warn(&self, message: &str) {
        lock(&self.messages).push(message.to_string());
    }
}

/// Configuration the test can swap mid-session.
#[derive(Default)]
pub struct SwitchableConfig {
    current: Mutex<PackwerkConfig>,
}

impl SwitchableConfig {
    pub fn replace(&self, config: PackwerkConfig) {
        *lock(&self.current) = config;
    }
}

impl ConfigProvider for SwitchableConfig {
    fn snapshot(&self) -> PackwerkConfig {
        lock(&self.current).clone()
    }
}

pub struct Harness {
    pub analyzer: Analyzer,
    pub config: Arc<SwitchableConfig>,
    pub runner: Arc<FakeRunner>,
    pub sink: Arc<RecordingSink>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(honor_abort: bool) -> Self {
        Self::with_roots(honor_abort, vec![PathBuf::from("/repo")])
    }

    pub fn with_roots(honor_abort: bool, roots: Vec<PathBuf>) -> Self {
        let config = Arc::new(SwitchableConfig::default());
        let runner = Arc::new(FakeRunner::new(honor_abort));
        let sink = Arc::new(RecordingSink::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let analyzer = Analyzer::new(
            config.clone(),
            runner.clone(),
            notifier.clone(),
            sink.clone(),
        )
        .with_roots(roots);
        Self {
            analyzer,
            config,
            runner,
            sink,
            notifier,
        }
    }
}

pub fn file_id(path: &str) -> DocumentId {
    DocumentId::from_path(Path::new(path)).unwrap()
}

pub fn ruby(path: &str, text: &str) -> Document {
    Document::new(file_id(path), "ruby", text)
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        error: (code != 0).then_some(ProcessError::ExitCode(code)),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}
