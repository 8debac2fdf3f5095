//! Building the command line for one analysis run.

use std::iter;
use std::path::{Path, PathBuf};

use packlint_config::PackwerkConfig;

use crate::notifier::Notifier;

/// Output format flag. Always the last arguments on the command line.
pub const JSON_FORMAT_ARGS: [&str; 2] = ["--format", "json"];

/// Everything the process runner needs to start one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command prefix from the configuration, e.g. `bin/packwerk check`.
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Run through the platform shell (`bundle exec` style) instead of directly.
    pub use_shell: bool,
}

impl Invocation {
    pub fn build(
        file: &Path,
        config: &PackwerkConfig,
        roots: &[PathBuf],
        notifier: &dyn Notifier,
    ) -> Self {
        let file_name = file.to_string_lossy();
        Self {
            command: config.command.clone(),
            args: build_arguments(&file_name, config, roots, notifier),
            cwd: working_directory(file, roots),
            use_shell: config.use_bundler,
        }
    }
}

/// Argument list for analysing `file_name` read from stdin.
///
/// `--stdin <file> --force-exclusion`, then `--config <path>` when the
/// configured tool config resolves to an existing file, then the configured
/// extra arguments, then `--format json`.
pub fn build_arguments(
    file_name: &str,
    config: &PackwerkConfig,
    roots: &[PathBuf],
    notifier: &dyn Notifier,
) -> Vec<String> {
    let mut args = vec![
        "--stdin".to_string(),
        file_name.to_string(),
        "--force-exclusion".to_string(),
    ];

    if !config.config_file_path.is_empty() {
        let found = resolve_config_file(&config.config_file_path, roots);
        match found.as_slice() {
            [] => {
                notifier.warn(&format!(
                    "{} file does not exist. Ignoring...",
                    config.config_file_path
                ));
            }
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    let all: Vec<String> = found.iter().map(|p| p.display().to_string()).collect();
                    notifier.warn(&format!(
                        "Found multiple files ({}) will use {}",
                        all.join(","),
                        first.display()
                    ));
                }
                args.push("--config".to_string());
                args.push(first.display().to_string());
            }
        }
    }

    args.extend(config.extra_args.iter().cloned());
    args.extend(JSON_FORMAT_ARGS.iter().map(ToString::to_string));
    args
}

/// Existing candidates for the tool config: the literal value first, then the
/// value under each root in root order. Duplicates (an absolute value joins
/// to itself) are dropped.
#[must_use]
pub fn resolve_config_file(value: &str, roots: &[PathBuf]) -> Vec<PathBuf> {
    let literal = PathBuf::from(value);
    let mut found: Vec<PathBuf> = Vec::new();
    for candidate in iter::once(literal).chain(roots.iter().map(|root| root.join(value))) {
        if candidate.exists() && !found.contains(&candidate) {
            found.push(candidate);
        }
    }
    found
}

/// The first workspace root, or the file's own directory outside a workspace.
#[must_use]
pub fn working_directory(file: &Path, roots: &[PathBuf]) -> PathBuf {
    roots
        .first()
        .cloned()
        .or_else(|| file.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
