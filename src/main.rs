use std::io::Read;
use std::process::ExitCode;

use clap::Parser;
use konvahti::cli::{is_stdin, Cli};
use konvahti::config::Config;
use konvahti::envvars::EnvVars;
use konvahti::error::{KonvahtiError, Result};
use konvahti::supervisor::Supervisor;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // The logging subscriber may not have been installed yet if
            // setup itself failed, so this is printed to stderr directly
            // rather than through `tracing`.
            eprintln!("konvahti: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    config.validate()?;

    config
        .log
        .clone()
        .overlay_env_vars()
        .setup()
        .map_err(|e| anyhow::anyhow!("failed to set up logging: {e}"))?;

    let supervisor = Supervisor::new();
    install_signal_handler(supervisor.cancellation_token());

    supervisor
        .run(config.watchers, EnvVars::from_process_env())
        .await?;
    Ok(())
}

/// Loads and pools every config file named on the command line (or STDIN,
/// if any is `-`/`STDIN`) into a single document: all watchers across all
/// files run under one supervisor.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut merged: Option<Config> = None;

    for filename in &cli.config_files {
        let document = if is_stdin(filename) {
            read_stdin_to_string()?
        } else {
            std::fs::read_to_string(filename).map_err(|e| {
                KonvahtiError::Config(format!("failed to read configuration file {filename}: {e}"))
            })?
        };

        let mut config = Config::from_yaml(&document).map_err(|e| {
            KonvahtiError::Config(format!("failed to parse configuration file {filename}: {e}"))
        })?;

        if let Some(log_config_path) = &cli.log_config {
            config.log = load_log_config(log_config_path)?;
        }

        merged = Some(match merged {
            Some(existing) => existing.merge(config),
            None => std::mem::take(&mut config),
        });
    }

    merged.ok_or_else(|| KonvahtiError::Config("no configurations specified".into()))
}

fn load_log_config(path: &str) -> Result<konvahti::logging::Config> {
    let document = std::fs::read_to_string(path).map_err(|e| {
        KonvahtiError::Config(format!("failed to read log configuration file {path}: {e}"))
    })?;
    Ok(Config::from_yaml(&document)?.log)
}

fn read_stdin_to_string() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(KonvahtiError::Io)?;
    Ok(buf)
}

fn install_signal_handler(token: tokio_util::sync::CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            error!(event = "shutdown_signal", "received shutdown signal, cancelling watchers");
            token.cancel();
        }
    });
}
