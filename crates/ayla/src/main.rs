mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ayla_core::DeviceManager;

use crate::cli::{Cli, Command, GlobalOpts, LogFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = init_tracing(&cli.global);

    let code = match run(cli).await {
        Ok(()) => None,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            Some(code)
        }
    };

    // Flush buffered file logs before exiting.
    drop(guard);
    if let Some(code) = code {
        std::process::exit(code);
    }
}

fn init_tracing(global: &GlobalOpts) -> Option<WorkerGuard> {
    let level = match global.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = match global.log_file {
        Some(ref path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("ayla.log"));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (fmt::writer::BoxMakeWriter::new(writer), Some(guard))
        }
        None => (fmt::writer::BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = global.log_file.is_none();

    let registry = tracing_subscriber::registry().with(filter);
    match global.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_ansi(ansi).with_writer(writer))
            .init(),
    }
    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli { global, command } = cli;

    if let Command::Completions(ref args) = command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Cli::command();
        generate(args.shell, &mut cmd, "ayla", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = ayla_config::load_config_or_default();
    let mut resolved = config::resolve(&global, &cfg)?;

    // Only `watch` keeps a push socket open.
    let wants_stream = matches!(command, Command::Watch(ref args) if !args.no_stream);
    if !wants_stream {
        resolved.config.allow_dss = false;
    }

    let ctx = config::connect(resolved)?;
    let manager = DeviceManager::new(ctx);

    tracing::debug!(command = ?command, "starting device manager");
    let started = manager.start().await;
    if let Err(err) = started {
        manager.shutdown().await;
        return Err(err.into());
    }
    if manager.is_cached_session() {
        tracing::warn!("service unreachable; showing cached device state");
    }

    let result = commands::dispatch(command, &manager, &global).await;
    manager.shutdown().await;
    manager.context().teardown();
    result
}
