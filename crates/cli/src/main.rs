mod check_command;
mod detached;
mod serve;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "rift", about = "Rift, a cross-protocol chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovering `rift.{toml,yaml,json}`.
    #[arg(long, global = true, env = "RIFT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default when no subcommand is provided).
    Serve,
    /// Validate the configuration file and report errors and warnings.
    Check {
        /// Show informational diagnostics too.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "rift starting");
            let config = match cli.config {
                Some(ref path) => rift_config::load_config(path)?,
                None => rift_config::discover_and_load(),
            };
            serve::serve(config).await
        },
        Some(Commands::Check { verbose }) => {
            if check_command::check(cli.config.as_deref(), verbose) {
                std::process::exit(1);
            }
            Ok(())
        },
    }
}
