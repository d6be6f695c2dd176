use std::path::PathBuf;

use anyhow::Result;
use bambu_bridge::Config;
use clap::{Parser, Subcommand};
use slog::Drain;
use tracing_subscriber::prelude::*;

mod cmd_serve;

/// Bridge LAN-mode Bambu Lab printers to an HTTP API.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "bambu-bridge")]
struct Cli {
    /// Config file to use. Missing is fine; `BAMBULAB_*` variables still
    /// apply.
    #[arg(long, short, default_value = "bambu-bridge.toml")]
    config: PathBuf,

    /// Print debug info
    #[arg(short, long)]
    debug: bool,

    /// Print logs as json
    #[arg(short, long)]
    json: bool,

    /// Log filter, overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTP requests for the configured printers.
    Serve {
        /// `host:port` to bind to on the host system.
        #[arg(long, short, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

impl Cli {
    /// Setup the slog logger handed to dropshot.
    fn create_logger(&self, app: &str) -> slog::Logger {
        if self.json {
            let drain = slog_json::Json::default(std::io::stderr()).fuse();
            self.async_root_logger(drain, app)
        } else {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            self.async_root_logger(drain, app)
        }
    }

    fn async_root_logger<T>(&self, drain: T, app: &str) -> slog::Logger
    where
        T: slog::Drain + Send + 'static,
        <T as slog::Drain>::Err: std::fmt::Debug,
    {
        let level = if self.debug {
            slog::Level::Debug
        } else {
            slog::Level::Info
        };

        let level_drain = slog::LevelFilter(drain, level).fuse();
        let async_drain = slog_async::Async::new(level_drain).build().fuse();
        slog::Logger::root(async_drain, slog::o!("app" => app.to_owned()))
    }

    fn init_tracing(&self) {
        let default_filter = if self.debug { "debug" } else { self.log_level.as_str() };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

        let registry = tracing_subscriber::registry().with(filter);
        if self.json {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut cfg = if self.config.exists() {
            Config::from_file(&self.config)?
        } else {
            tracing::info!(path = %self.config.display(), "no config file, using environment only");
            Config::default()
        };

        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }
}

/// Resolve once SIGINT or SIGTERM arrives.
async fn handle_signals() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGINT handler");
            e
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGTERM handler");
            e
        })?;

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up Ctrl+C handler");
            anyhow::Error::new(e)
        })?;

        tracing::info!("received Ctrl+C (SIGINT)");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    let cfg = cli.load_config()?;
    let logger = cli.create_logger("bambu-bridge");

    match cli.command {
        Commands::Serve { ref bind } => cmd_serve::main(&cfg, bind, &logger).await,
    }
}
