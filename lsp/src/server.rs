//! The server loop: read frames, drive the [`Analyzer`], write replies.
//!
//! Reads happen on the calling task. All writes, whether replies from here or
//! diagnostics and warnings from completed runs, go through one writer task
//! fed by an unbounded channel, so frames never interleave.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use packlint_config::{FileConfigProvider, user_config_path};
use packlint_engine::{Analyzer, Document, ProcessRunner, TokioProcessRunner};
use packlint_types::DocumentId;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::bridge::{LspNotifier, LspSink, Outbound};
use crate::codec::{FrameReader, FrameWriter};
use crate::protocol::{
    self, DidChangeParams, DidCloseParams, DidOpenParams, DidSaveParams, Incoming,
    InitializeParams, METHOD_NOT_FOUND, SERVER_NOT_INITIALIZED,
};

/// How long to wait for queued frames to flush after `exit`.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct ServerOptions {
    /// Workspace roots. When empty, the roots the client reports are used.
    pub roots: Vec<PathBuf>,
    /// Forces the tool's `--config` file regardless of `.packlint.toml`.
    pub config_file_path: Option<String>,
    pub user_config: Option<PathBuf>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            config_file_path: None,
            user_config: user_config_path(),
            runner: Arc::new(TokioProcessRunner),
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("roots", &self.roots)
            .field("config_file_path", &self.config_file_path)
            .field("user_config", &self.user_config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeOutcome {
    pub shutdown_requested: bool,
}

impl ServeOutcome {
    /// 0 after an orderly `shutdown` + `exit`, 1 otherwise.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        i32::from(!self.shutdown_requested)
    }
}

pub async fn serve_stdio(options: ServerOptions) -> Result<ServeOutcome> {
    serve(tokio::io::stdin(), tokio::io::stdout(), options).await
}

/// Serve one client until `exit` or end of input.
pub async fn serve<R, W>(input: R, output: W, options: ServerOptions) -> Result<ServeOutcome>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let writer = tokio::spawn(async move {
        let mut writer = FrameWriter::new(output);
        while let Some(frame) = rx.recv().await {
            if let Err(e) = writer.write_frame(&frame).await {
                tracing::warn!("LSP write error: {e:#}");
                break;
            }
        }
    });

    let mut session = Session::new(Outbound::new(tx), options);
    let mut reader = FrameReader::new(input);
    let result = loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => {
                if session.dispatch(frame) == Flow::Exit {
                    break Ok(());
                }
            }
            Ok(None) => {
                tracing::info!("Client closed the connection");
                break Ok(());
            }
            Err(e) => break Err(e.context("reading from client")),
        }
    };

    let outcome = ServeOutcome {
        shutdown_requested: session.shutdown_requested,
    };
    session.close();
    if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        tracing::debug!("Writer still busy at exit; abandoning queued frames");
    }
    result.map(|()| outcome)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct OpenDocument {
    language_id: String,
    text: String,
}

struct Session {
    outbound: Outbound,
    options: ServerOptions,
    /// Built on `initialize`, once the workspace roots are known.
    analyzer: Option<Analyzer>,
    documents: HashMap<DocumentId, OpenDocument>,
    shutdown_requested: bool,
}

impl Session {
    fn new(outbound: Outbound, options: ServerOptions) -> Self {
        Self {
            outbound,
            options,
            analyzer: None,
            documents: HashMap::new(),
            shutdown_requested: false,
        }
    }

    fn dispatch(&mut self, frame: Value) -> Flow {
        match Incoming::classify(&frame) {
            Some(Incoming::Request { id, method, params }) => {
                self.handle_request(id, &method, params);
                Flow::Continue
            }
            Some(Incoming::Notification { method, params }) => {
                self.handle_notification(&method, params)
            }
            Some(Incoming::Response) => Flow::Continue,
            None => {
                tracing::trace!("Ignoring malformed JSON-RPC frame");
                Flow::Continue
            }
        }
    }

    fn handle_request(&mut self, id: Value, method: &str, params: Value) {
        let reply = match method {
            "initialize" => {
                self.initialize(params);
                protocol::response(id, protocol::initialize_result())
            }
            "shutdown" => {
                self.shutdown_requested = true;
                if let Some(analyzer) = &self.analyzer {
                    analyzer.shutdown();
                }
                protocol::response(id, Value::Null)
            }
            _ if self.analyzer.is_none() => {
                protocol::error_response(id, SERVER_NOT_INITIALIZED, "server not initialized")
            }
            _ => {
                tracing::debug!("Client sent request: {method}; replying method not found");
                protocol::error_response(id, METHOD_NOT_FOUND, &format!("Method not found: {method}"))
            }
        };
        self.outbound.send(reply);
    }

    fn handle_notification(&mut self, method: &str, params: Value) -> Flow {
        match method {
            "exit" => return Flow::Exit,
            "textDocument/didOpen" => {
                if let Some(params) = decode(method, params) {
                    self.did_open(params);
                }
            }
            "textDocument/didChange" => {
                if let Some(params) = decode(method, params) {
                    self.did_change(params);
                }
            }
            "textDocument/didSave" => {
                if let Some(params) = decode(method, params) {
                    self.did_save(params);
                }
            }
            "textDocument/didClose" => {
                if let Some(params) = decode(method, params) {
                    self.did_close(params);
                }
            }
            _ => tracing::trace!("Ignoring notification: {method}"),
        }
        Flow::Continue
    }

    fn initialize(&mut self, params: Value) {
        let params: InitializeParams = decode("initialize", params).unwrap_or_default();
        let roots = if self.options.roots.is_empty() {
            params.roots()
        } else {
            self.options.roots.clone()
        };

        let mut config = FileConfigProvider::new(roots.clone())
            .with_user_config(self.options.user_config.clone());
        if let Some(path) = &self.options.config_file_path {
            config = config.with_config_file_path(path.clone());
        }

        tracing::info!(roots = ?roots, "Initialized");
        self.analyzer = Some(
            Analyzer::new(
                Arc::new(config),
                Arc::clone(&self.options.runner),
                Arc::new(LspNotifier::new(self.outbound.clone())),
                Arc::new(LspSink::new(self.outbound.clone())),
            )
            .with_roots(roots),
        );
    }

    fn did_open(&mut self, params: DidOpenParams) {
        let item = params.text_document;
        let Some(id) = document_id(&item.uri) else {
            return;
        };
        self.documents.insert(
            id.clone(),
            OpenDocument {
                language_id: item.language_id,
                text: item.text,
            },
        );
        self.analyze(&id);
    }

    fn did_change(&mut self, params: DidChangeParams) {
        let Some(id) = document_id(&params.text_document.uri) else {
            return;
        };
        if let Some(text) = params.into_text()
            && let Some(open) = self.documents.get_mut(&id)
        {
            open.text = text;
        }
        if self.analyzer.as_ref().is_some_and(|a| !a.is_on_save()) {
            self.analyze(&id);
        }
    }

    fn did_save(&mut self, params: DidSaveParams) {
        let Some(id) = document_id(&params.text_document.uri) else {
            return;
        };
        if let Some(text) = params.text
            && let Some(open) = self.documents.get_mut(&id)
        {
            open.text = text;
        }
        if self.analyzer.as_ref().is_some_and(Analyzer::is_on_save) {
            self.analyze(&id);
        }
    }

    fn did_close(&mut self, params: DidCloseParams) {
        let Some(id) = document_id(&params.text_document.uri) else {
            return;
        };
        self.documents.remove(&id);
        if let Some(analyzer) = &self.analyzer {
            analyzer.clear(&id);
        }
    }

    fn analyze(&self, id: &DocumentId) {
        let Some(analyzer) = &self.analyzer else {
            tracing::debug!(document = %id, "Document event before initialize");
            return;
        };
        let Some(open) = self.documents.get(id) else {
            tracing::debug!(document = %id, "Event for a document that is not open");
            return;
        };
        let document = Document::new(id.clone(), open.language_id.clone(), open.text.clone());
        // Completion publishes on its own; nobody waits on the handle here.
        let _ = analyzer.execute(&document);
    }

    fn close(self) {
        if let Some(analyzer) = &self.analyzer {
            analyzer.shutdown();
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, params: Value) -> Option<T> {
    match serde_json::from_value(params) {
        Ok(params) => Some(params),
        Err(err) => {
            tracing::debug!("Ignoring {method} with malformed params: {err}");
            None
        }
    }
}

fn document_id(uri: &str) -> Option<DocumentId> {
    DocumentId::parse(uri)
        .inspect_err(|err| tracing::debug!("{err}"))
        .ok()
}
