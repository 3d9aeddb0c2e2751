//! DeepResearch CLI: run a research query in the terminal or serve the
//! HTTP/SSE gateway.

mod commands;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// DeepResearch: search, read, and reason until the question is answered
#[derive(Parser, Debug)]
#[command(name = "deepresearch", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory (holds `.deepresearch/config.toml`)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Research a question and print progress as it runs
    Ask {
        /// The question to research
        query: String,

        /// Budget ceiling in consumed units
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        budget: Option<u64>,

        /// Rejected answers tolerated before beast mode
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_bad_attempts: Option<u32>,

        /// Print events and the answer as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Start the HTTP/SSE gateway
    Serve {
        /// Bind address (overrides gateway.host)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides gateway.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default config to `.deepresearch/config.toml`
    Init,
    /// Print the effective configuration
    Show,
}

fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // stderr keeps stdout clean for answers and --json output
    let filter = std::env::var("RUST_LOG")
        .ok()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(log_filter(cli.verbose, cli.quiet)));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let log_dir = deepresearch_core::config::default_data_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "deepresearch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let code = commands::handle_command(cli.command, &workspace).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
