//! Core domain types for packlint.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application: the analysis
//! engine, the LSP bridge and the CLI all speak in these types.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod diagnostic;
mod document;
mod report;

pub use diagnostic::{Diagnostic, DiagnosticSeverity, DiagnosticsSnapshot, Position, Range};
pub use document::{DocumentId, DocumentIdError};
pub use report::{FileEntry, Location, Report, Violation};

/// Value of [`Diagnostic::source`] for everything produced by the packwerk pipeline.
pub const DIAGNOSTIC_SOURCE: &str = "packwerk";
