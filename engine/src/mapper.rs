//! Report → diagnostic records.

use packlint_config::SeverityPolicy;
use packlint_types::{
    DIAGNOSTIC_SOURCE, Diagnostic, DiagnosticSeverity, Position, Range, Report, Violation,
};

/// Diagnostics for one file entry of a report, in report order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiagnostics {
    pub path: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Convert one violation.
///
/// The tool's 1-based line becomes 0-based; `column` is already 0-based.
/// The range spans `length` characters on that line.
#[must_use]
pub fn to_diagnostic(violation: &Violation, policy: SeverityPolicy) -> Diagnostic {
    let loc = violation.location;
    let line = loc.line.saturating_sub(1);
    let range = Range::new(
        Position::new(line, loc.column),
        Position::new(line, loc.column.saturating_add(loc.length)),
    );
    Diagnostic::new(
        range,
        severity_for(violation, policy),
        format!("{} ({})", violation.message, violation.kind),
        DIAGNOSTIC_SOURCE.to_string(),
    )
}

fn severity_for(violation: &Violation, policy: SeverityPolicy) -> DiagnosticSeverity {
    match policy {
        SeverityPolicy::Fixed => DiagnosticSeverity::Error,
        SeverityPolicy::Tool => violation
            .severity
            .as_deref()
            .and_then(DiagnosticSeverity::from_tool_label)
            .unwrap_or(DiagnosticSeverity::Error),
    }
}

/// One [`FileDiagnostics`] per file entry, one diagnostic per violation.
#[must_use]
pub fn map_report(report: &Report, policy: SeverityPolicy) -> Vec<FileDiagnostics> {
    report
        .files
        .iter()
        .map(|file| FileDiagnostics {
            path: file.path.clone(),
            diagnostics: file
                .violations
                .iter()
                .map(|v| to_diagnostic(v, policy))
                .collect(),
        })
        .collect()
}

/// All diagnostics of a stdin run, flattened in report order.
///
/// In stdin mode every entry describes the document that was piped in,
/// whatever path the tool echoes back.
#[must_use]
pub fn diagnostics_for_document(report: &Report, policy: SeverityPolicy) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::with_capacity(report.violation_count());
    for file in map_report(report, policy) {
        diagnostics.extend(file.diagnostics);
    }
    diagnostics
}
