//! Configuration for packlint.
//!
//! The analysis engine never caches configuration: every run asks a
//! [`ConfigProvider`] for a fresh [`PackwerkConfig`] snapshot, so an edit to
//! `.packlint.toml` takes effect on the next save without a restart.
//!
//! ```toml
//! # <workspace>/.packlint.toml or ~/.packlint/config.toml
//! execute_path = "${HOME}/src/monolith/"
//! use_bundler = false
//! config_file_path = "packwerk.yml"
//! on_save = true
//! extra_args = ["--offenses-formatter", "default"]
//! severity = "fixed"   # or "tool"
//! stderr = "warn"      # or "ignore"
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// The tool invocation every resolved command ends with.
pub const PACKWERK_COMMAND: &str = "bin/packwerk check";

/// File name looked up in each workspace root.
pub const WORKSPACE_CONFIG_FILE: &str = ".packlint.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// How diagnostic severity is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityPolicy {
    /// Every violation is reported as an error; the tool's own field is ignored.
    #[default]
    Fixed,
    /// Use the tool's `severity` field, falling back to error when unrecognised.
    Tool,
}

/// What to do with stderr output on an otherwise normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrPolicy {
    /// Surface stderr as a warning and skip publication.
    #[default]
    Warn,
    /// Log stderr and carry on parsing stdout.
    Ignore,
}

/// Immutable configuration snapshot for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackwerkConfig {
    /// Resolved command line prefix, e.g. `bin/packwerk check`.
    pub command: String,
    /// Run `command` through a shell wrapper (`bundle exec ...`) instead of directly.
    pub use_bundler: bool,
    /// Tool config file (`--config`); empty when unset.
    pub config_file_path: String,
    /// Analyse on save only (as opposed to every change).
    pub on_save: bool,
    /// Arguments inserted before the output-format flag.
    pub extra_args: Vec<String>,
    pub severity: SeverityPolicy,
    pub stderr: StderrPolicy,
}

impl Default for PackwerkConfig {
    fn default() -> Self {
        FileConfig::default().resolve()
    }
}

/// Source of configuration snapshots.
pub trait ConfigProvider: Send + Sync {
    fn snapshot(&self) -> PackwerkConfig;
}

/// Provider that always hands out the same snapshot. Useful for tests and
/// for callers that resolved configuration themselves.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(PackwerkConfig);

impl StaticConfig {
    #[must_use]
    pub fn new(config: PackwerkConfig) -> Self {
        Self(config)
    }
}

impl ConfigProvider for StaticConfig {
    fn snapshot(&self) -> PackwerkConfig {
        self.0.clone()
    }
}

/// Raw on-disk shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub execute_path: Option<String>,
    pub use_bundler: Option<bool>,
    pub config_file_path: Option<String>,
    pub on_save: Option<bool>,
    pub extra_args: Option<Vec<String>>,
    pub severity: Option<SeverityPolicy>,
    pub stderr: Option<StderrPolicy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Turn raw settings into a snapshot.
    ///
    /// An explicit `execute_path` replaces the `bundle exec` prefix but keeps
    /// `use_bundler`, so the command still runs through the shell when asked.
    /// The directory is shell-quoted; it may contain spaces.
    #[must_use]
    pub fn resolve(self) -> PackwerkConfig {
        let execute_path = self
            .execute_path
            .map(|p| expand_env_vars(&p))
            .filter(|p| !p.trim().is_empty());
        let use_bundler = self.use_bundler.unwrap_or(false);

        let command = match execute_path {
            Some(dir) => {
                let dir = if dir.ends_with('/') || dir.ends_with(MAIN_SEPARATOR) {
                    dir
                } else {
                    format!("{dir}/")
                };
                format!("{}{PACKWERK_COMMAND}", shell_words::quote(&dir))
            }
            None if use_bundler => format!("bundle exec {PACKWERK_COMMAND}"),
            None => PACKWERK_COMMAND.to_string(),
        };

        PackwerkConfig {
            command,
            use_bundler,
            config_file_path: self
                .config_file_path
                .map(|p| expand_env_vars(&p))
                .unwrap_or_default(),
            on_save: self.on_save.unwrap_or(true),
            extra_args: self.extra_args.unwrap_or_default(),
            severity: self.severity.unwrap_or_default(),
            stderr: self.stderr.unwrap_or_default(),
        }
    }
}

/// Reads `.packlint.toml` from the first workspace root that has one, then
/// `~/.packlint/config.toml`, on every snapshot.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    roots: Vec<PathBuf>,
    user_config: Option<PathBuf>,
    config_file_override: Option<String>,
}

impl FileConfigProvider {
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            user_config: user_config_path(),
            config_file_override: None,
        }
    }

    /// Replace the user-level config location (`None` disables it).
    #[must_use]
    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    /// Force `config_file_path` regardless of what the files say.
    #[must_use]
    pub fn with_config_file_path(mut self, path: impl Into<String>) -> Self {
        self.config_file_override = Some(path.into());
        self
    }

    fn locate(&self) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(WORKSPACE_CONFIG_FILE))
            .chain(self.user_config.clone())
            .find(|candidate| candidate.is_file())
    }
}

impl ConfigProvider for FileConfigProvider {
    fn snapshot(&self) -> PackwerkConfig {
        let raw = match self.locate() {
            Some(path) => match FileConfig::load(&path) {
                Ok(raw) => {
                    tracing::trace!(path = %path.display(), "Loaded packlint config");
                    raw
                }
                Err(err) => {
                    tracing::warn!("{err}; using defaults");
                    FileConfig::default()
                }
            },
            None => FileConfig::default(),
        };

        let mut config = raw.resolve();
        if let Some(path) = &self.config_file_override {
            config.config_file_path.clone_from(path);
        }
        config
    }
}

/// `~/.packlint/config.toml`
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".packlint").join("config.toml"))
}

/// Expand `${VAR}` references. Unset variables expand to nothing; an
/// unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if !var.is_empty() {
                    out.push_str(&env::var(var).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
