//! Structured decoding of one analysis run's JSON output.
//!
//! ```json
//! {"files": [{"path": "app/a.rb", "violations": [
//!   {"message": "...", "type": "privacy", "severity": "error",
//!    "location": {"line": 3, "column": 5, "length": 4}}
//! ]}]}
//! ```
//!
//! Unknown fields are ignored so newer tool versions keep decoding.

use serde::Deserialize;

/// Full report of one run. Zero `files` means "no problems found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Report {
    pub files: Vec<FileEntry>,
}

impl Report {
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.files.iter().map(|file| file.violations.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Violation {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Location,
    /// Reported by the tool but ignored unless the severity policy asks for it.
    #[serde(default)]
    pub severity: Option<String>,
}

/// Tool coordinates: `line` is 1-based, `column` 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub length: u32,
}
