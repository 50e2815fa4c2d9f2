//! HTTP server implementation.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::handlers::{create_router, AppState};
use crate::error::{PagegateError, Result};

/// HTTP server for the page routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Routes with their shared state
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server serving `state` on `addr`.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            router: create_router(state),
        }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            PagegateError::Server(format!("failed to bind {}: {}", self.addr, e))
        })?;
        self.serve_listener(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server for page routes");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            PagegateError::Io(e)
        })
    }
}
