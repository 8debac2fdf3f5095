//! `packlint check`: analyse files from disk once and print the results.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use packlint_config::FileConfigProvider;
use packlint_engine::{
    Analyzer, DiagnosticsStore, Document, LogNotifier, RunOutcome, TokioProcessRunner,
};
use packlint_types::DocumentId;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Workspace root (repeatable; the first is the working directory).
    /// Defaults to the current directory.
    #[arg(long = "root", value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Packwerk config file passed to the tool as `--config`.
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<String>,

    /// Ruby files (or Gemfiles) to check.
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

/// Exit status: 0 clean, 1 when any error diagnostic was found, 2 when a run
/// could not produce results.
pub async fn run(args: CheckArgs) -> Result<ExitCode> {
    let cwd = env::current_dir().context("reading current directory")?;
    let roots = if args.roots.is_empty() {
        vec![cwd.clone()]
    } else {
        args.roots.iter().map(|root| cwd.join(root)).collect()
    };

    let mut config = FileConfigProvider::new(roots.clone());
    if let Some(path) = args.config_file {
        config = config.with_config_file_path(path);
    }
    let store = DiagnosticsStore::new();
    let analyzer = Analyzer::new(
        Arc::new(config),
        Arc::new(TokioProcessRunner),
        Arc::new(LogNotifier),
        Arc::new(store.clone()),
    )
    .with_roots(roots);

    let mut handles = Vec::new();
    for file in &args.files {
        let path = cwd.join(file);
        let Some(language) = language_for(&path) else {
            tracing::warn!(path = %file.display(), "Not a Ruby file; skipping");
            continue;
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let id = DocumentId::from_path(&path)?;
        if let Some(handle) = analyzer.execute(&Document::new(id, language, text)) {
            handles.push(handle);
        }
    }

    let mut failed = false;
    for handle in handles {
        let id = handle.id().clone();
        match handle.outcome().await {
            RunOutcome::Published { count } => {
                tracing::debug!(document = %id, count, "Checked");
            }
            RunOutcome::Warned(err) => {
                eprintln!("{}: {err}", display_path(&id, &cwd).display());
                failed = true;
            }
            RunOutcome::Canceled => {}
        }
    }

    let snapshot = store.snapshot();
    for (id, diagnostics) in snapshot.files() {
        let path = display_path(id, &cwd);
        for diagnostic in diagnostics {
            println!("{}", diagnostic.display_with_path(&path));
        }
    }
    if !snapshot.is_empty() {
        eprintln!("{}", snapshot.status_string());
    }

    Ok(if failed {
        ExitCode::from(2)
    } else if snapshot.error_count() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Language id for a path, or `None` when the tool has nothing to say about it.
fn language_for(path: &Path) -> Option<&'static str> {
    let name = path.file_name()?.to_str()?;
    if name == "Gemfile" || name.ends_with(".gemfile") {
        return Some("gemfile");
    }
    if matches!(name, "Rakefile" | "Guardfile") {
        return Some("ruby");
    }
    match path.extension()?.to_str()? {
        "rb" | "rake" | "ru" | "gemspec" | "jbuilder" => Some("ruby"),
        _ => None,
    }
}

fn display_path(id: &DocumentId, cwd: &Path) -> PathBuf {
    let Some(path) = id.to_file_path() else {
        return PathBuf::from(id.as_str());
    };
    path.strip_prefix(cwd)
        .map(Path::to_path_buf)
        .unwrap_or(path)
}
