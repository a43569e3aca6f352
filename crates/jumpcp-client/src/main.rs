//! jumpcp-send: push a file through the tunnel.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use jumpcp_core::{
    AdaptationStrategy, LogFormat, ProgressObserver, RichObserver, SimpleObserver, TransferConfig,
    init_logging,
};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Buffer adaptation strategy for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliAdaptationStrategy {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl From<CliAdaptationStrategy> for AdaptationStrategy {
    fn from(strategy: CliAdaptationStrategy) -> Self {
        match strategy {
            CliAdaptationStrategy::Conservative => AdaptationStrategy::Conservative,
            CliAdaptationStrategy::Balanced => AdaptationStrategy::Balanced,
            CliAdaptationStrategy::Aggressive => AdaptationStrategy::Aggressive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "jumpcp-send", version, about = "Send a file over a tunneled socket")]
struct Args {
    /// File to send.
    file: PathBuf,

    /// Receiver host (usually the local end of the tunnel).
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Receiver port.
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Buffer adaptation strategy.
    #[arg(long, value_enum, default_value = "balanced")]
    strategy: CliAdaptationStrategy,

    /// Override the initial chunk size in bytes instead of probing RTT.
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Plain line output instead of live progress bars.
    #[arg(long)]
    plain: bool,

    /// Increase log verbosity (-v, -vv, ...).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long = "log-format", default_value = "text")]
    log_format: CliLogFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.log_format.into()) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = TransferConfig::default()
        .with_strategy(args.strategy.into())
        .with_rich_progress(!args.plain);
    if let Some(size) = args.buffer_size {
        config = config.with_initial_buffer_size(size);
    }

    let observer: Arc<dyn ProgressObserver> = if config.use_rich_progress {
        Arc::new(RichObserver::new())
    } else {
        Arc::new(SimpleObserver::new())
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c.cancel();
    });

    match jumpcp_client::send_file(
        &args.host,
        args.port,
        &args.file,
        config,
        Some(observer),
        cancel,
    )
    .await
    {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("transfer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
