//! packlint: packwerk boundary diagnostics.
//!
//! ```text
//! packlint check FILE...   one-shot analysis, results on stdout
//! packlint lsp             language server on stdio
//! ```
//!
//! Both commands drive the same [`packlint_engine::Analyzer`]; they differ
//! only in where diagnostics and warnings end up.

mod check;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use packlint_lsp::{ServerOptions, serve_stdio};

use crate::check::CheckArgs;
use crate::logging::Target;

#[derive(Debug, Parser)]
#[command(name = "packlint", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check files and print packwerk violations.
    Check(CheckArgs),
    /// Serve the Language Server Protocol over stdio.
    Lsp(LspArgs),
}

#[derive(Debug, Args)]
struct LspArgs {
    /// Workspace root (repeatable). Overrides the roots the editor reports.
    #[arg(long = "root", value_name = "DIR")]
    roots: Vec<PathBuf>,

    /// Packwerk config file passed to the tool as `--config`.
    #[arg(long, value_name = "FILE")]
    config_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check(args) => {
            logging::init(Target::Stderr);
            check::run(args).await
        }
        Command::Lsp(args) => {
            logging::init(Target::File);
            let outcome = serve_stdio(ServerOptions {
                roots: args.roots,
                config_file_path: args.config_file,
                ..ServerOptions::default()
            })
            .await?;
            tracing::info!(shutdown_requested = outcome.shutdown_requested, "Server exited");
            Ok(ExitCode::from(outcome.exit_code() as u8))
        }
    }
}
