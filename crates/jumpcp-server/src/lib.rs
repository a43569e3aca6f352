//! TCP accept-loop orchestration for the receiving side.
//!
//! [`run_server`] owns the accept loop: per-accept errors are logged and the
//! loop continues; every connection runs in its own task, tracked in a
//! `JoinSet` that is drained on shutdown so active transfers finish their
//! teardown. [`FileServer`] is the stock handler that receives one file per
//! connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jumpcp_core::{ProgressObserver, Result, Role, TransferConfig, TransferEngine};

/// Run the accept loop until `cancel` fires.
///
/// `handler` is invoked once per accepted connection; its future runs on its
/// own task. Handler errors are logged, never propagated into the loop.
pub async fn run_server<F, Fut>(
    listener: TcpListener,
    cancel: CancellationToken,
    handler: F,
) -> Result<()>
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "server listening");

    let mut workers = JoinSet::new();
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    info!(peer = %peer, "connection accepted");
                    let fut = handler(socket, peer);
                    workers.spawn(async move {
                        if let Err(e) = fut.await {
                            warn!(peer = %peer, error = %e, "connection handler failed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
        }

        // Reap finished workers without blocking the accept path.
        while workers.try_join_next().is_some() {}
    }

    info!(active = workers.len(), "server stopping, draining transfers");
    while workers.join_next().await.is_some() {}
    Ok(())
}

/// Stock connection handler: one received file per connection.
pub struct FileServer {
    output_dir: PathBuf,
    config: TransferConfig,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancellationToken,
    failed: AtomicU64,
}

impl FileServer {
    pub fn new(
        output_dir: PathBuf,
        config: TransferConfig,
        observer: Arc<dyn ProgressObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            output_dir,
            config,
            observer,
            cancel,
            failed: AtomicU64::new(0),
        }
    }

    /// Sessions that ended in a failed or cancelled state.
    pub fn failed_sessions(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Receive one file from an accepted connection.
    pub async fn handle(&self, socket: TcpStream, peer: SocketAddr) -> Result<()> {
        let mut engine = TransferEngine::new(
            socket,
            Role::Receiver,
            peer.to_string(),
            self.config.clone(),
            self.cancel.child_token(),
        )?;
        engine.attach_observer(Arc::clone(&self.observer));

        match engine.receive_file(&self.output_dir).await {
            Ok(path) => {
                info!(peer = %peer, path = %path.display(), "file received");
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Run the accept loop with this handler.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        run_server(listener, cancel, move |socket, peer| {
            let server = Arc::clone(&self);
            async move { server.handle(socket, peer).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn server_exits_on_cancellation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();

        let stop = cancel.clone();
        let server = tokio::spawn(run_server(listener, cancel, |_socket, _peer| async {
            Ok(())
        }));

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn handler_runs_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&hits);
        let stop = cancel.clone();
        let server = tokio::spawn(run_server(listener, cancel, move |_socket, _peer| {
            let counted = Arc::clone(&counted);
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        for _ in 0..2 {
            let _ = TcpStream::connect(addr).await.unwrap();
        }

        // The JoinSet drain on shutdown guarantees both handlers ran.
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
