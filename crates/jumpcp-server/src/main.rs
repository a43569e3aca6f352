//! jumpcp-recv: receive files pushed through the tunnel.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jumpcp_core::{
    AdaptationStrategy, LogFormat, ProgressObserver, RichObserver, SimpleObserver, TransferConfig,
    init_logging,
};
use jumpcp_server::FileServer;

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
#[command(name = "jumpcp-recv", version, about = "Receive files over a tunneled socket")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Directory where received files are written.
    #[arg(short, long, default_value = "received")]
    output_dir: PathBuf,

    /// Buffer adaptation strategy.
    #[arg(long, value_enum, default_value = "balanced")]
    strategy: CliAdaptationStrategy,

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

    if let Err(e) = std::fs::create_dir_all(&args.output_dir) {
        eprintln!(
            "failed to create output directory {}: {e}",
            args.output_dir.display()
        );
        return ExitCode::FAILURE;
    }

    let config = TransferConfig::default()
        .with_strategy(args.strategy.into())
        .with_rich_progress(!args.plain);

    let observer: Arc<dyn ProgressObserver> = if config.use_rich_progress {
        Arc::new(RichObserver::new())
    } else {
        Arc::new(SimpleObserver::new())
    };

    let cancel = CancellationToken::new();
    let server = Arc::new(FileServer::new(
        args.output_dir,
        config,
        observer,
        cancel.child_token(),
    ));

    let listener = match TcpListener::bind((args.bind.as_str(), args.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}:{}: {e}", args.bind, args.port);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        shutdown.cancel();
    });

    match Arc::clone(&server).serve(listener, cancel).await {
        Ok(()) if server.failed_sessions() == 0 => ExitCode::SUCCESS,
        Ok(()) => {
            eprintln!("{} session(s) failed", server.failed_sessions());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}
