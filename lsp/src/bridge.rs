//! Engine collaborators that talk to the editor.

use packlint_engine::{DiagnosticSink, Notifier};
use packlint_types::{Diagnostic, DocumentId};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::protocol;

/// Queue of frames for the single writer task.
///
/// Sending never blocks, so it is safe from the engine's synchronous
/// completion path. Frames sent after the writer is gone are dropped.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<Value>,
}

impl Outbound {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self { tx }
    }

    pub fn send(&self, frame: Value) {
        if self.tx.send(frame).is_err() {
            tracing::debug!("Writer closed; dropping outbound frame");
        }
    }
}

/// Publishes diagnostic sets as `textDocument/publishDiagnostics`.
#[derive(Debug, Clone)]
pub struct LspSink {
    outbound: Outbound,
}

impl LspSink {
    #[must_use]
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

impl DiagnosticSink for LspSink {
    fn set(&self, id: &DocumentId, diagnostics: Vec<Diagnostic>) {
        self.outbound
            .send(protocol::publish_diagnostics(id, &diagnostics));
    }

    // An empty publish is how LSP says "forget this document".
    fn delete(&self, id: &DocumentId) {
        self.outbound.send(protocol::publish_diagnostics(id, &[]));
    }
}

/// Shows warnings as `window/showMessage` and logs them.
#[derive(Debug, Clone)]
pub struct LspNotifier {
    outbound: Outbound,
}

impl LspNotifier {
    #[must_use]
    pub fn new(outbound: Outbound) -> Self {
        Self { outbound }
    }
}

impl Notifier for LspNotifier {
    fn warn(&self, message: &str) {
        tracing::warn!(target: "packlint::notify", "{message}");
        self.outbound.send(protocol::show_warning(message));
    }
}
