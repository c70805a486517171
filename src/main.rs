// src/main.rs

//! The entry point for the uxmgr control tool and monitoring daemon.

use anyhow::Result;
use std::env;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};
use uxmgr::cli::CliArgs;
use uxmgr::config::Config;
use uxmgr::core::errors::{ExitCode, UxMgrError, UxMgrResult};
use uxmgr::{actions, daemon};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let raw_args: Vec<String> = env::args().skip(1).collect();
    if raw_args.iter().any(|a| a == "--version") {
        println!("uxmgr version {VERSION}");
        return Ok(());
    }

    let args = match CliArgs::parse(raw_args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(ExitCode::BadConfig.code());
        }
    };

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "failed to load configuration from \"{}\": {e}",
                args.config.display()
            );
            std::process::exit(ExitCode::BadConfig.code());
        }
    };

    // Keep the file-appender guard alive for the process lifetime.
    let _log_guard = init_logging(&config);

    if args.object == "daemon" && args.verb == "run" {
        if let Err(e) = daemon::run(args.config.clone(), config).await {
            error!("daemon runtime error: {e}");
            return Err(e);
        }
        return Ok(());
    }

    match dispatch(&config, &args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("{e}");
            eprintln!("ERROR: {e}");
            std::process::exit(e.exit_code().code());
        }
    }
}

async fn dispatch(config: &Config, args: &CliArgs) -> UxMgrResult<()> {
    match (args.object.as_str(), args.verb.as_str()) {
        ("primary", "register") => actions::register::primary_register(config, args).await,
        ("primary", "unregister") => actions::register::unregister(config, args, "primary").await,

        ("standby", "register") => actions::register::standby_register(config, args).await,
        ("standby", "unregister") => actions::register::unregister(config, args, "standby").await,
        ("standby", "clone") => actions::clone::run(config, args).await,
        ("standby", "promote") => actions::promote::run(config, args).await,
        ("standby", "follow") => actions::follow::run(config, args).await,
        ("standby", "switchover") => actions::switchover::run(config, args).await,

        ("witness", "register") => actions::register::witness_register(config, args).await,
        ("witness", "unregister") => actions::register::unregister(config, args, "witness").await,

        ("node", "status") => actions::status::run(config, args).await,
        ("node", "check") => actions::check::run(config, args).await,
        ("node", "service") => actions::service::run(config, args).await,
        ("node", "rejoin") => actions::rejoin::run(config, args).await,
        ("node", "control") => actions::control::run(config, args).await,
        ("node", "startup") => actions::startup::run(config, args).await,

        ("cluster", "show") => actions::cluster::show(config, args).await,
        ("cluster", "event") => actions::cluster::event(config, args).await,
        ("cluster", "cleanup") => actions::cluster::cleanup(config, args).await,
        ("cluster", "crosscheck") => actions::cluster::crosscheck(config, args).await,
        ("cluster", "matrix") => actions::cluster::matrix(config, args).await,

        ("service", "pause") => actions::daemon_ctl::pause(config, args, true).await,
        ("service", "unpause") => actions::daemon_ctl::pause(config, args, false).await,
        ("service", "status") => actions::daemon_ctl::status(config, args).await,

        (object, verb) => Err(UxMgrError::Config(format!(
            "unknown operation \"{object} {verb}\""
        ))),
    }
}

/// Sets up tracing with a reloadable filter, to stderr or to a rotating
/// file per the configuration.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let initial_level =
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log.log_level.clone());
    let (filter, _reload_handle) = reload::Layer::new(EnvFilter::new(initial_level));

    if let Some(log_file) = &config.log.log_file {
        let dir = log_file.parent().unwrap_or(std::path::Path::new("."));
        let name = log_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "uxmgr.log".to_string());
        let rotation = if config.log.log_rotation_age.as_secs() <= 3600 {
            tracing_appender::rolling::Rotation::HOURLY
        } else {
            tracing_appender::rolling::Rotation::DAILY
        };
        let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
        None
    }
}
