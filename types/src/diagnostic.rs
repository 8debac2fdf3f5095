//! Diagnostic records as handed to the editor.
//!
//! Positions are 0-based throughout, matching what LSP clients and most
//! editor widgets consume. Conversion from the tool's 1-based lines happens
//! once, in the engine's mapper.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::DocumentId;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Numeric severity as defined by LSP (1=Error, 2=Warning, 3=Info, 4=Hint).
    #[must_use]
    pub fn to_lsp(self) -> u8 {
        self as u8
    }

    /// Interpret a severity label written by the analysis tool.
    ///
    /// Returns `None` for labels we don't recognise; the caller picks the fallback.
    #[must_use]
    pub fn from_tool_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal" => Some(Self::Error),
            "warning" | "convention" | "refactor" => Some(Self::Warning),
            "info" | "information" => Some(Self::Information),
            "hint" => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// 0-indexed line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Half-open span between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A single diagnostic produced for a document.
///
/// Fields are private; construction goes through [`Diagnostic::new`] and the
/// record is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    range: Range,
    severity: DiagnosticSeverity,
    message: String,
    /// Tool that produced the diagnostic (always "packwerk" today).
    source: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        range: Range,
        severity: DiagnosticSeverity,
        message: String,
        source: String,
    ) -> Self {
        Self {
            range,
            severity,
            message,
            source,
        }
    }

    #[must_use]
    pub fn range(&self) -> Range {
        self.range
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `path:line:col: severity: [source] message` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            path.display(),
            self.range.start.line + 1,
            self.range.start.character + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}

/// Immutable snapshot of all published diagnostics, suitable for rendering.
///
/// Counts are computed from `files` on demand so they can never drift.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsSnapshot {
    /// Per-document diagnostics, error-containing documents first.
    files: Vec<(DocumentId, Vec<Diagnostic>)>,
}

impl DiagnosticsSnapshot {
    #[must_use]
    pub fn new(files: Vec<(DocumentId, Vec<Diagnostic>)>) -> Self {
        Self { files }
    }

    #[must_use]
    pub fn files(&self) -> &[(DocumentId, Vec<Diagnostic>)] {
        &self.files
    }

    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&[Diagnostic]> {
        self.files
            .iter()
            .find(|(doc, _)| doc == id)
            .map(|(_, items)| items.as_slice())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn count_by_severity(&self, severity: DiagnosticSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, items)| items)
            .filter(|d| d.severity() == severity)
            .count()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Error)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count_by_severity(DiagnosticSeverity::Warning)
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.files.iter().map(|(_, items)| items.len()).sum()
    }

    /// Compact status string like "E:3 W:5"; empty when nothing is published.
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}
