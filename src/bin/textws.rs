//! textws server binary.

use clap::{ArgAction, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use textws::config::ServerConfig;
use textws::server::Server;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "textws", version, about = "Text-only WebSocket server")]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'b', long = "bind")]
    bind: Option<SocketAddr>,

    /// Greeting sent to each client after the upgrade
    #[arg(long = "greeting", conflicts_with = "no_greeting")]
    greeting: Option<String>,

    /// Send no greeting
    #[arg(long = "no-greeting", action = ArgAction::SetTrue)]
    no_greeting: bool,

    /// Reply to every text message with the same text
    #[arg(long = "echo", action = ArgAction::SetTrue)]
    echo: bool,

    /// Close connections idle for this many seconds
    #[arg(long = "idle-timeout")]
    idle_timeout_secs: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbosity: u8,
}

impl Cli {
    /// Applies flags on top of file and environment settings.
    fn apply(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(ref greeting) = self.greeting {
            config.greeting = Some(greeting.clone());
        }
        if self.no_greeting {
            config.greeting = None;
        }
        if self.echo {
            config.echo = true;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }

    fn default_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.default_filter());

    let config = match ServerConfig::load(cli.config.as_deref()) {
        Ok(config) => cli.apply(config),
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = run(config).await {
        tracing::error!(error = %err, "server failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(config: ServerConfig) -> textws::Result<()> {
    let server = Server::bind(config).await?;
    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "ctrl-c handler unavailable");
                std::future::pending::<()>().await;
            }
            tracing::info!("ctrl-c received");
        })
        .await
}
