//! Relay server listener
//!
//! Binds the TCP listener, serves the HTTP/WebSocket router and owns the
//! background tasks (call reclamation and the audio broadcast).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::server::auth::SessionResolver;
use crate::server::config::ServerConfig;
use crate::server::http::{router, AppState};
use crate::server::hub::Hub;

/// Relay server
pub struct RelayServer {
    hub: Arc<Hub>,
}

impl RelayServer {
    /// Create a new server with the given configuration and token resolver
    pub fn new(config: ServerConfig, resolver: Arc<dyn SessionResolver>) -> Self {
        Self {
            hub: Arc::new(Hub::new(config, resolver)),
        }
    }

    /// Get a reference to the hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.hub.config().bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.bind_addr()).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Relay server listening");

        let cleanup_handle = self.hub.spawn_cleanup_task();

        let cancel = CancellationToken::new();
        let pipeline_handle = self
            .hub
            .broadcast_pipeline()
            .map(|pipeline| pipeline.spawn(cancel.child_token()));

        let app = router(AppState::new(Arc::clone(&self.hub)));
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        // Stop background work on shutdown
        cancel.cancel();
        if let Some(handle) = pipeline_handle {
            let _ = handle.await;
        }
        cleanup_handle.abort();

        result.map_err(Into::into)
    }
}
