//! Tracing setup.
//!
//! `PACKLINT_LOG` (then `RUST_LOG`) selects the filter; the default is `info`.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use packlint_config::user_config_path;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_ENV: &str = "PACKLINT_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Human-facing runs: log lines share stderr with warnings.
    Stderr,
    /// Protocol runs: stdout is the wire, so logs go to a file or nowhere.
    File,
}

pub fn init(target: Target) {
    let filter = env_filter();
    match target {
        Target::Stderr => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
        }
        Target::File => init_file(filter),
    }
}

fn env_filter() -> EnvFilter {
    env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_file(filter: EnvFilter) {
    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than write into the protocol stream.
    tracing_subscriber::registry().with(filter).init();
}

fn open_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

/// `~/.packlint/logs/packlint.log`, then `./.packlint/logs/packlint.log`.
fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(config_path) = user_config_path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("packlint.log"));
    }
    candidates.push(PathBuf::from(".packlint").join("logs").join("packlint.log"));

    candidates
}
