use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::ProtocolHandler;
use crate::listener::Listener;
use crate::pool::WorkerPool;
use crate::worker::{ConnectionSettings, ConnectionWorker};

/// Depot repository server.
pub struct DepotServer {
    config: ServerConfig,
    socket: TcpListener,
    handler: Arc<ProtocolHandler>,
    pool: WorkerPool,
    settings: ConnectionSettings,
}

impl DepotServer {
    /// Validate `config` and bind its address.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let socket = TcpListener::bind(config.bind_addr).await?;
        info!(
            addr = %socket.local_addr()?,
            root = %config.repos_root.display(),
            workers = config.workers,
            framing = %config.framing,
            "depot server listening"
        );
        Ok(Self {
            handler: Arc::new(ProtocolHandler::from_config(&config)),
            pool: WorkerPool::new(config.workers),
            settings: ConnectionSettings::from_config(&config),
            socket,
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The bound address; differs from the configured one when binding port 0.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then wait for in-flight connections.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        Listener::serve(&self, shutdown).await
    }
}

#[async_trait]
impl Listener for DepotServer {
    fn socket(&self) -> &TcpListener {
        &self.socket
    }

    async fn on_accept(&self, stream: TcpStream, peer: SocketAddr) -> ServerResult<()> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        let worker = ConnectionWorker::new(stream, peer, Arc::clone(&self.handler), self.settings);
        self.pool
            .execute(async move {
                if let Err(e) = worker.run().await {
                    debug!(%peer, kind = e.kind(), error = %e, "connection ended with error");
                }
            })
            .await?;
        Ok(())
    }

    async fn on_shutdown(&self) {
        let busy = self.pool.size() - self.pool.available();
        if busy > 0 {
            info!(connections = busy, "waiting for in-flight connections");
        }
        self.pool.wait_idle().await;
        info!("depot server stopped");
    }
}
