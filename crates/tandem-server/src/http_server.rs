//! HTTP/2 Server
//!
//! Accept loop serving the inbound dispatcher. Each connection is served by
//! hyper's HTTP/2 connection driver on its own task and registered with a
//! graceful-shutdown watcher; stopping the endpoint drains in-flight
//! connections and force-closes whatever remains after the stop timeout.

use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulShutdown;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, warn};

use tandem_common::protocol::{Result, TandemError};

use crate::dispatcher;
use crate::endpoint::Endpoint;

/// Handle to a running server: its bound address and the shutdown signal.
pub(crate) struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the accept loop to stop and wait for in-flight connections,
    /// force-closing them once `timeout` elapses.
    pub(crate) async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let abort = self.task.abort_handle();
        if tokio::time::timeout(timeout, self.task).await.is_err() {
            warn!("Graceful shutdown timed out, force-closing connections");
            abort.abort();
        }
    }
}

/// Bind the listener and spawn the accept loop.
///
/// Resolves once the socket is accepting; rejects on bind error.
pub(crate) async fn bind(endpoint: Arc<Endpoint>, addr: &str) -> Result<ServerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TandemError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| TandemError::Transport(format!("Failed to get local address: {}", e)))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(endpoint, listener, shutdown_rx));

    Ok(ServerHandle {
        local_addr,
        shutdown_tx,
        task,
    })
}

async fn accept_loop(
    endpoint: Arc<Endpoint>,
    listener: TcpListener,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _peer)) => {
                        let io = TokioIo::new(stream);
                        let endpoint = endpoint.clone();
                        let service = service_fn(move |req| {
                            let endpoint = endpoint.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(
                                    dispatcher::dispatch(endpoint, req).await,
                                )
                            }
                        });

                        let conn = http2::Builder::new(TokioExecutor::new())
                            .serve_connection(io, service);
                        let watched = graceful.watch(conn);
                        connections.spawn(async move {
                            if let Err(err) = watched.await {
                                error!(error = %err, "Error serving connection");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to accept connection");
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Stop accepting, then drain in-flight connections. The force-close
    // fallback lives in ServerHandle::shutdown, which aborts this task (and
    // with it every connection in the set) once the stop timeout elapses.
    drop(listener);
    graceful.shutdown().await;
    while connections.join_next().await.is_some() {}
}
