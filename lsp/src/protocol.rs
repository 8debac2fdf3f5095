//! The slice of LSP this server speaks: message classification, the
//! document notifications it consumes, and the messages it sends.

use std::path::PathBuf;

use packlint_types::{Diagnostic, DocumentId};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const SERVER_NOT_INITIALIZED: i64 = -32002;

/// `window/showMessage` type for warnings.
pub const MESSAGE_TYPE_WARNING: u8 = 2;

/// An incoming JSON-RPC frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// Reply to something we sent. We never send requests, so these are dropped.
    Response,
}

impl Incoming {
    #[must_use]
    pub fn classify(frame: &Value) -> Option<Self> {
        let method = frame.get("method").and_then(Value::as_str).map(String::from);
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        let is_response = frame.get("result").is_some() || frame.get("error").is_some();

        match (frame.get("id"), method) {
            (Some(id), Some(method)) => Some(Self::Request {
                id: id.clone(),
                method,
                params,
            }),
            (None, Some(method)) => Some(Self::Notification { method, params }),
            (Some(_), None) if is_response => Some(Self::Response),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub root_uri: Option<String>,
    #[serde(default)]
    pub root_path: Option<String>,
    #[serde(default)]
    pub workspace_folders: Option<Vec<WorkspaceFolder>>,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: String,
}

impl InitializeParams {
    /// Workspace roots on disk: every `file://` workspace folder, else
    /// `rootUri`, else the deprecated `rootPath`.
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        let folders: Vec<PathBuf> = self
            .workspace_folders
            .iter()
            .flatten()
            .filter_map(|folder| file_uri_to_path(&folder.uri))
            .collect();
        if !folders.is_empty() {
            return folders;
        }
        if let Some(root) = self.root_uri.as_deref().and_then(file_uri_to_path) {
            return vec![root];
        }
        self.root_path.iter().map(PathBuf::from).collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    pub uri: String,
    pub language_id: String,
    #[serde(default)]
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
pub struct ContentChange {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeParams {
    pub text_document: TextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

impl DidChangeParams {
    /// With full sync every change carries the whole document; the last wins.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        self.content_changes.into_iter().last().map(|c| c.text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidSaveParams {
    pub text_document: TextDocumentIdentifier,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseParams {
    pub text_document: TextDocumentIdentifier,
}

#[must_use]
pub fn initialize_result() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": {
                "openClose": true,
                "change": 1,
                "save": { "includeText": false }
            }
        },
        "serverInfo": {
            "name": "packlint",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[must_use]
pub fn response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

#[must_use]
pub fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

#[must_use]
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

#[must_use]
pub fn publish_diagnostics(id: &DocumentId, diagnostics: &[Diagnostic]) -> Value {
    let items: Vec<Value> = diagnostics.iter().map(diagnostic_to_lsp).collect();
    notification(
        "textDocument/publishDiagnostics",
        json!({ "uri": id.as_str(), "diagnostics": items }),
    )
}

#[must_use]
pub fn show_warning(message: &str) -> Value {
    notification(
        "window/showMessage",
        json!({ "type": MESSAGE_TYPE_WARNING, "message": message }),
    )
}

fn diagnostic_to_lsp(diagnostic: &Diagnostic) -> Value {
    let range = diagnostic.range();
    json!({
        "range": {
            "start": { "line": range.start.line, "character": range.start.character },
            "end": { "line": range.end.line, "character": range.end.character }
        },
        "severity": diagnostic.severity().to_lsp(),
        "source": diagnostic.source(),
        "message": diagnostic.message()
    })
}

fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}
