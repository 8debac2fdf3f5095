//! Where published diagnostics go.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packlint_types::{Diagnostic, DiagnosticsSnapshot, DocumentId};

/// Receives the per-document diagnostic sets the engine publishes.
pub trait DiagnosticSink: Send + Sync {
    /// Replace everything known for `id` with `diagnostics` (possibly empty).
    fn set(&self, id: &DocumentId, diagnostics: Vec<Diagnostic>);
    fn delete(&self, id: &DocumentId);
}

/// In-memory sink shared between the engine and whoever renders results.
///
/// Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsStore {
    data: Arc<Mutex<HashMap<DocumentId, Vec<Diagnostic>>>>,
}

impl DiagnosticsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, HashMap<DocumentId, Vec<Diagnostic>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<Vec<Diagnostic>> {
        self.data().get(id).cloned()
    }

    /// All documents with diagnostics: documents with errors first, then by URI.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let mut files: Vec<(DocumentId, Vec<Diagnostic>)> = self
            .data()
            .iter()
            .map(|(id, items)| (id.clone(), items.clone()))
            .collect();

        files.sort_by(|a, b| {
            let a_has_errors = a.1.iter().any(|d| d.severity().is_error());
            let b_has_errors = b.1.iter().any(|d| d.severity().is_error());
            b_has_errors.cmp(&a_has_errors).then_with(|| a.0.cmp(&b.0))
        });

        DiagnosticsSnapshot::new(files)
    }
}

impl DiagnosticSink for DiagnosticsStore {
    fn set(&self, id: &DocumentId, diagnostics: Vec<Diagnostic>) {
        let mut data = self.data();
        if diagnostics.is_empty() {
            data.remove(id);
        } else {
            data.insert(id.clone(), diagnostics);
        }
    }

    fn delete(&self, id: &DocumentId) {
        self.data().remove(id);
    }
}
