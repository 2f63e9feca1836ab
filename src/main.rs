//! Command-line entry point: weekly time report and chunking maintenance.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskledger::application::commands::{AppState, flag_chunking_impl, weekly_report_impl};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskledger", version, about)]
struct Cli {
    /// Workspace root holding config/, state/ and logs/ (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the weekly time report as JSON.
    Report {
        /// Any date inside the wanted week (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Count calendar events marked as free.
        #[arg(long)]
        include_transparent: bool,
    },

    /// Allow auto-chunking for every task of a project longer than a limit.
    FlagChunking {
        #[arg(long)]
        workspace: String,

        #[arg(long)]
        project: String,

        /// Duration limit in minutes; tasks strictly longer are flagged.
        #[arg(long)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON result; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskledger=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let workspace_root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };
    let state = AppState::new(workspace_root).context("failed to initialize workspace")?;

    let output = match cli.command {
        Command::Report {
            date,
            include_transparent,
        } => {
            let report = weekly_report_impl(&state, date, include_transparent)
                .await
                .context("weekly report failed")?;
            serde_json::to_string_pretty(&report)?
        }
        Command::FlagChunking {
            workspace,
            project,
            limit,
        } => {
            let outcome = flag_chunking_impl(&state, &workspace, &project, limit)
                .await
                .context("flagging tasks for chunking failed")?;
            serde_json::to_string_pretty(&outcome)?
        }
    };

    println!("{output}");
    Ok(())
}
