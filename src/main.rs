//! Binary entry point for the letsbake CLI.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use letsbake::steps::Provisioners;
use letsbake::{
    ArtifactError, BuildConfig, BuildError, Builder, CancelTrigger, CommConfig, ConsoleUi,
    LetsCloudClient, LetsCloudError, RemoteShell, Ui, cancellation,
};

mod cli;

use cli::{BuildCommand, Cli};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unable to initialise LetsCloud client: {0}")]
    Client(#[from] LetsCloudError),
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("letsbake=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("letsbake=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli {
        Cli::Build(command) => {
            init_tracing(command.debug);
            build(command).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn build(args: BuildCommand) -> Result<(), CliError> {
    let config =
        BuildConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let comm =
        CommConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let shell =
        RemoteShell::with_process_runner(comm).map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let client = LetsCloudClient::new(&config.api_key)?;

    let provisioners = Provisioners {
        commands: args.provision,
        scripts: args
            .provision_script
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect(),
    };
    let builder = Builder::new(config, client, shell, provisioners);

    let (trigger, signal) = cancellation();
    let interrupt = tokio::spawn(async move { cancel_on_interrupt(&trigger).await });

    let ui: Arc<dyn Ui> = Arc::new(ConsoleUi);
    let outcome = builder.run(Arc::clone(&ui), signal).await;
    interrupt.abort();

    let artifact = outcome?;
    artifact.print_on_ui(ui.as_ref())?;
    Ok(())
}

async fn cancel_on_interrupt(trigger: &CancelTrigger) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("interrupt received, cancelling build");
            trigger.cancel();
        }
        Err(err) => tracing::warn!(error = %err, "failed to listen for Ctrl-C"),
    }
}

fn report_error(err: &CliError) {
    let mut stderr = io::stderr();
    writeln!(stderr, "letsbake: {err}").ok();
}
