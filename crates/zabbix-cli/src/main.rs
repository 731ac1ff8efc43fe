//! zabbix-cli - command-line client for the Zabbix JSON-RPC API.
//!
//! Runs a single command, a bulk file of commands, or an interactive loop
//! against the configured server.

mod cli;
mod commands;
mod logging;
mod prompt;
mod repl;

use std::io::{self, IsTerminal};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use tracing::{info, warn};

use zabbix_cli_core::auth::Prompter;
use zabbix_cli_core::{ApiClient, BulkExecutor, BulkMode, CommandDispatcher, Config, Context, Environment};

use cli::Cli;
use commands::Dispatcher;
use prompt::TerminalPrompter;

enum Mode {
    Bulk { file: std::path::PathBuf, mode: BulkMode },
    Single { name: String, args: Vec<String> },
    Interactive,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = logging::init_logging(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "zabbix-cli starting");

    let interactive = io::stdin().is_terminal() && io::stderr().is_terminal();
    let mode = match (cli.file, cli.command.split_first()) {
        (Some(file), _) => Mode::Bulk {
            file,
            mode: cli.mode.unwrap_or(config.app.bulk_mode),
        },
        (None, Some((name, args))) => Mode::Single {
            name: name.clone(),
            args: args.to_vec(),
        },
        (None, None) if interactive => Mode::Interactive,
        (None, None) => bail!("No command given. Run with --help for usage"),
    };

    let ctx = Context::new(config, Environment::from_process(), interactive);
    let prompter = interactive.then(|| Box::new(TerminalPrompter) as Box<dyn Prompter>);
    let mut client = ApiClient::from_context(&ctx, prompter)?;
    client
        .login()
        .await
        .with_context(|| format!("Unable to log in to {}", client.identity()))?;

    let mut dispatcher = Dispatcher::new(client);
    let code = match mode {
        Mode::Bulk { file, mode } => run_bulk(&mut dispatcher, &file, mode).await?,
        Mode::Single { name, args } => match dispatcher.execute(&name, &args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
        Mode::Interactive => {
            repl::run(&mut dispatcher).await?;
            ExitCode::SUCCESS
        }
    };

    // Without a session file the server-side session would only linger
    if !ctx.config.app.use_session_file {
        if let Err(e) = dispatcher.client_mut().logout().await {
            warn!(error = %e, "Logout on exit failed");
        }
    }

    info!("zabbix-cli exiting");
    Ok(code)
}

async fn run_bulk(dispatcher: &mut Dispatcher, file: &Path, mode: BulkMode) -> Result<ExitCode> {
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after the current command");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let result = BulkExecutor::new(dispatcher, mode)
        .with_interrupt(interrupt)
        .run_file(file)
        .await?;

    for failure in result.failures() {
        eprintln!(
            "Line {}: {} ({})",
            failure.line_number, failure.command, failure.outcome
        );
    }
    let summary = &result.summary;
    eprintln!(
        "Bulk execution complete. Total: {}, Succeeded: {}, Failed: {}, Skipped: {}",
        summary.total_lines, summary.succeeded, summary.failed, summary.skipped_parse
    );
    if result.aborted {
        eprintln!("Stopped at the first failure ({mode} mode); earlier commands were not rolled back");
    }

    Ok(ExitCode::from(result.exit_code()))
}
