pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod render;
pub mod ui;
pub mod upload;

use anyhow::Context;
use api::{CookieJar, HttpApi, ProgressId};
use clap::Parser;
use cli::{Args, AssumeYes, Command, StdinConfirm};
use config::AppConfig;
use controller::{ActionOutcome, Confirm, ControllerError, JobOutcome, UploadController};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use ui::UiHandle;
use upload::{SelectedFile, UploadOptions};

/// Parse the command line, run one command and report how it ended
pub async fn run() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    tracing::debug!("Effective config: {:?}", config);

    let jar = session_cookies(&config);
    if jar.is_empty() {
        tracing::warn!("No session cookie configured; the server will likely refuse the requests");
    }
    let api = HttpApi::new(
        &config.base_url,
        jar.header_value(),
        &config.csrf_header_name,
        config.request_timeout(),
    )?;

    let (ui, events) = UiHandle::new();
    let renderer = tokio::spawn(render::render(events, args.json));
    let controller =
        UploadController::new(Arc::new(api), Arc::new(jar), ui.clone(), config.poll_policy());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted; stopping");
            ctrl_c.cancel();
        }
    });

    let result = match interruptible(dispatch(&controller, args.command, &cancel), &cancel).await
    {
        Some(result) => result,
        None => Ok(ExitCode::from(130)),
    };

    ui.settle().await;
    ui.unload();
    for line in controller.metrics().summary() {
        tracing::info!("{}", line);
    }

    // The renderer finishes once every handle on the page is gone.
    drop(controller);
    drop(ui);
    let _ = renderer.await;

    result
}

/// Run `work` unless `cancel` fires first. `None` means it was interrupted.
async fn interruptible<F, T>(work: F, cancel: &CancellationToken) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("Interrupted before the command finished");
            None
        }
        result = work => Some(result),
    }
}

fn session_cookies(config: &AppConfig) -> CookieJar {
    CookieJar::parse(
        config.cookie.as_deref().unwrap_or_default(),
        &config.csrf_cookie_name,
    )
}

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let path = match args.config.clone() {
        Some(path) => path,
        None => config::default_path()?,
    };
    let mut config = config::load_or_create(&path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.apply_env().context("reading environment")?;
    config.apply_overrides(args.overrides());
    Ok(config)
}

async fn dispatch(
    controller: &UploadController,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::Upload { path, template } => {
            let file = SelectedFile::from_path(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let options = match template {
                Some(template) => UploadOptions::with_template(template),
                None => UploadOptions::default(),
            };
            job_exit(controller.submit(Some(file), &options, cancel).await)
        }
        Command::Status { progress_id } => {
            job_exit(controller.watch(&ProgressId::new(progress_id), cancel).await)
        }
        Command::Process { file_id, yes } => {
            let confirm = confirmer(yes);
            action_exit(controller.process_file(file_id, &*confirm).await)
        }
        Command::Delete { file_id, name, yes } => {
            let name = name.unwrap_or_else(|| format!("file #{}", file_id));
            let confirm = confirmer(yes);
            action_exit(controller.delete_file(file_id, &name, &*confirm).await)
        }
    }
}

fn confirmer(assume_yes: bool) -> Box<dyn Confirm> {
    if assume_yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirm)
    }
}

fn job_exit(result: Result<JobOutcome, ControllerError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(JobOutcome::Completed { progress_id, .. }) => {
            tracing::info!("Job {} finished", progress_id);
            Ok(ExitCode::SUCCESS)
        }
        Ok(JobOutcome::Failed { progress_id, message }) => {
            tracing::info!("Job {} failed: {}", progress_id, message);
            Ok(ExitCode::FAILURE)
        }
        Ok(JobOutcome::Cancelled) => Ok(ExitCode::from(130)),
        Err(e) => {
            tracing::debug!("Flow ended early: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn action_exit(result: Result<ActionOutcome, ControllerError>) -> anyhow::Result<ExitCode> {
    match result {
        Ok(ActionOutcome::Done) => Ok(ExitCode::SUCCESS),
        Ok(ActionOutcome::Declined) => {
            tracing::info!("Nothing done");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::debug!("Action failed: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
