//! Decoding the tool's stdout.

use packlint_types::Report;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("tool produced no output")]
    Empty,
    /// Carries the offending output with every whitespace character replaced
    /// by a plain space, so it fits on one line of a notification.
    #[error("tool output is not valid JSON: \"{0}\"")]
    Malformed(String),
}

/// Parse raw stdout into a [`Report`].
///
/// `{"files":[]}` is a valid, clean report and is never an error.
pub fn parse_output(raw: &str) -> Result<Report, OutputError> {
    if raw.is_empty() {
        return Err(OutputError::Empty);
    }
    serde_json::from_str(raw).map_err(|err| {
        tracing::debug!("Failed to decode tool output: {err}");
        OutputError::Malformed(flatten_whitespace(raw))
    })
}

/// Replace each whitespace character (newlines, tabs, carriage returns) with
/// a single space.
#[must_use]
pub fn flatten_whitespace(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect()
}
