//! Server lifecycle management
//!
//! Starts the HTTP/WebSocket server, waits for a shutdown signal, then
//! closes every subscriber and waits for in-flight requests to drain.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use wormhole_core::{Config, SyncHub};

pub struct WormholeServer {
    config: Config,
    hub: SyncHub,
}

impl WormholeServer {
    pub const fn new(config: Config, hub: SyncHub) -> Self {
        Self { config, hub }
    }

    /// Start the server and wait for shutdown
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let http_handle = self.start_http_server(shutdown_rx).await?;

        self.run(http_handle, shutdown_tx, shutdown_signal()).await
    }

    /// Wait for `signal` or for the HTTP task to exit, then shut down
    ///
    /// An HTTP task that exits on its own is an error.
    async fn run<F>(
        &self,
        mut http_handle: JoinHandle<()>,
        shutdown_tx: watch::Sender<bool>,
        signal: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                self.hub.shutdown();
                return Err(anyhow::anyhow!("HTTP server stopped unexpectedly"));
            }
            () = signal => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        // Stop accepting requests
        let _ = shutdown_tx.send(true);

        self.shutdown(http_handle).await;

        Ok(())
    }

    async fn shutdown(&self, http_handle: JoinHandle<()>) {
        info!("Shutting down wormhole server...");

        // Ends every subscription; WebSocket writers close their sockets
        self.hub.shutdown();

        let drain_timeout = Duration::from_secs(self.config.server.shutdown_drain_seconds);
        if !drain(http_handle, drain_timeout).await {
            warn!(
                "Drain timeout of {}s reached with requests still in flight, proceeding with shutdown",
                drain_timeout.as_secs()
            );
        }

        info!("Wormhole server shut down complete");
    }

    /// Bind the listener up front so address errors surface from `start`
    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let router = wormhole_api::http::create_router(self.hub.clone(), &self.config.sync);

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = wormhole_api::http::serve(listener, router, graceful).await {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for the server task to finish, aborting it after `timeout`
async fn drain(mut handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("HTTP server task failed: {}", e);
            true
        }
        Err(_) => {
            handle.abort();
            false
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
