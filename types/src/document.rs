//! Document identity - the partition key for analysis tasks and diagnostics.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DocumentIdError {
    #[error("invalid document URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },
    #[error("cannot convert path to file URI: {}", path.display())]
    NotAbsolute { path: PathBuf },
}

/// Stable key distinguishing which open file a task or diagnostic set belongs to.
///
/// Wraps the document's URI. Two ids are equal iff their URIs are equal after
/// `url` normalisation, so `file:///a/./b.rb` and `file:///a/b.rb` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Url);

impl DocumentId {
    #[must_use]
    pub fn new(uri: Url) -> Self {
        Self(uri)
    }

    pub fn parse(uri: &str) -> Result<Self, DocumentIdError> {
        Url::parse(uri)
            .map(Self)
            .map_err(|source| DocumentIdError::InvalidUri {
                uri: uri.to_string(),
                source,
            })
    }

    /// Build a `file://` identity from an absolute path.
    pub fn from_path(path: &Path) -> Result<Self, DocumentIdError> {
        Url::from_file_path(path)
            .map(Self)
            .map_err(|()| DocumentIdError::NotAbsolute {
                path: path.to_path_buf(),
            })
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.0.scheme() == "file"
    }

    /// Filesystem path for `file://` identities.
    #[must_use]
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if !self.is_file() {
            return None;
        }
        self.0.to_file_path().ok()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<Url> for DocumentId {
    fn from(uri: Url) -> Self {
        Self::new(uri)
    }
}
