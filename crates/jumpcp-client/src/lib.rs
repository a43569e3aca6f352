//! Client-side dialing and the sending convenience wrapper.

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jumpcp_core::constants::CONNECT_BACKOFF;
use jumpcp_core::{Error, ProgressObserver, Result, Role, TransferConfig, TransferEngine};

/// Dial the receiver with per-attempt timeout, retries and backoff.
pub async fn connect(host: &str, port: u16, config: &TransferConfig) -> Result<TcpStream> {
    let attempts = config.connect_retries.max(1);
    let mut last_err: Option<Error> = None;

    for attempt in 1..=attempts {
        match timeout(config.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => {
                debug!(host, port, attempt, "connected");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                warn!(host, port, attempt, error = %e, "connect failed");
                last_err = Some(e.into());
            }
            Err(_) => {
                warn!(host, port, attempt, "connect timed out");
                last_err = Some(Error::timeout("connect"));
            }
        }
        if attempt < attempts {
            sleep(CONNECT_BACKOFF).await;
        }
    }

    Err(last_err.unwrap_or_else(|| Error::timeout("connect")))
}

/// Dial, send one file and close the connection.
///
/// Returns the number of payload bytes sent.
pub async fn send_file(
    host: &str,
    port: u16,
    path: &Path,
    config: TransferConfig,
    observer: Option<Arc<dyn ProgressObserver>>,
    cancel: CancellationToken,
) -> Result<u64> {
    let stream = connect(host, port, &config).await?;
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| format!("{host}:{port}"));

    let mut engine = TransferEngine::new(stream, Role::Sender, peer, config, cancel)?;
    if let Some(observer) = observer {
        engine.attach_observer(observer);
    }

    let bytes = engine.send_file(path).await?;
    engine.close().await?;
    info!(bytes, file = %path.display(), "transfer complete");
    Ok(bytes)
}
