mod channel_commands;
mod doctor_commands;
mod watch_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    livefeed_config::LivefeedConfig,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "livefeed", about = "livefeed: watch reconnecting realtime streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovering livefeed.{toml,yaml,json}.
    #[arg(long, global = true, env = "LIVEFEED_CONFIG")]
    config: Option<PathBuf>,

    /// Origin that relative channel paths resolve against (overrides config).
    #[arg(long, global = true, env = "LIVEFEED_ORIGIN")]
    origin: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a stream and print every inbound envelope as a JSON line.
    Watch(watch_commands::WatchArgs),
    /// List configured channels and their resolved endpoints.
    Channels,
    /// Validate the config file and check channel endpoints.
    Doctor {
        /// Try one connection per channel.
        #[arg(long)]
        probe: bool,
        /// Show informational diagnostics too.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the envelope stream.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the `--config` file, or discover one in the standard locations.
fn load_config(cli: &Cli) -> anyhow::Result<LivefeedConfig> {
    match &cli.config {
        Some(path) => livefeed_config::load_config(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(livefeed_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "livefeed starting");

    match &cli.command {
        Commands::Watch(args) => {
            let config = load_config(&cli)?;
            watch_commands::handle_watch(&config, cli.origin.as_deref(), args).await
        },
        Commands::Channels => {
            let config = load_config(&cli)?;
            channel_commands::handle_channels(&config, cli.origin.as_deref());
            Ok(())
        },
        Commands::Doctor { probe, verbose } => {
            doctor_commands::handle_doctor(
                cli.config.as_deref(),
                cli.origin.as_deref(),
                *probe,
                *verbose,
            )
            .await
        },
    }
}
