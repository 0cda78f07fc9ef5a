// src/cli.rs
// Command line arguments and confirmation prompts

use crate::config::Overrides;
use crate::controller::Confirm;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Upload Excel workbooks to the processor web app and follow the job.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload, process and track Excel files")]
pub struct Args {
    /// Server root (overrides EXCEL_UPLOADER_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Session `Cookie` header, e.g. "sessionid=...; csrftoken=..." (overrides EXCEL_UPLOADER_COOKIE)
    #[arg(long, global = true)]
    pub cookie: Option<String>,

    /// Config file to use instead of the per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Milliseconds between status checks (overrides EXCEL_UPLOADER_POLL_INTERVAL_MS)
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Stop after this many status checks (overrides EXCEL_UPLOADER_MAX_POLLS)
    #[arg(long, global = true)]
    pub max_polls: Option<u32>,

    /// Print page events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload a workbook, start processing and wait for the result
    Upload {
        path: PathBuf,

        /// Fill this template instead of producing a new workbook
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Process a file that is already on the server
    Process {
        file_id: u64,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Delete a file from the server
    Delete {
        file_id: u64,

        /// Name shown in the confirmation prompt
        #[arg(long)]
        name: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Follow a job that is already running
    Status { progress_id: String },
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            cookie: self.cookie.clone(),
            poll_interval_ms: self.poll_interval_ms,
            max_polls: self.max_polls,
        }
    }
}

/// Accepts without asking (`--yes`)
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!("Auto-confirmed: {}", prompt);
        true
    }
}

/// Asks on the terminal; anything but y/yes declines.
///
/// The prompt goes to stderr so stdout stays a clean event stream.
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            ask(&prompt, std::io::stdin().lock(), std::io::stderr())
        })
        .await;

        match answer {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Confirmation prompt aborted: {}", e);
                false
            }
        }
    }
}

/// Write `prompt` to `output` and read one answer line from `input`
fn ask<R: BufRead, W: Write>(prompt: &str, mut input: R, mut output: W) -> bool {
    let _ = write!(output, "{} [y/N] ", prompt);
    let _ = output.flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => is_yes(&answer),
        Err(e) => {
            tracing::warn!("Could not read confirmation: {}", e);
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
