use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::ServerResult;

/// Back-off after a failed `accept`, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// An accept loop with a per-connection hook.
///
/// Implementors decide what happens to each accepted stream; the provided
/// [`serve`](Listener::serve) loop only accepts and stops on shutdown.
#[async_trait]
pub trait Listener: Send + Sync {
    fn socket(&self) -> &TcpListener;

    /// Called for every accepted connection. An error drops the connection
    /// but keeps the loop running. If shutdown is requested before this
    /// resolves, the future is dropped along with the connection.
    async fn on_accept(&self, stream: TcpStream, peer: SocketAddr) -> ServerResult<()>;

    /// Called once after the loop stops accepting.
    async fn on_shutdown(&self) {}

    async fn serve<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.socket().accept() => match accepted {
                    // `on_accept` may wait for capacity; shutdown must still win.
                    Ok((stream, peer)) => tokio::select! {
                        _ = &mut shutdown => {
                            info!(%peer, "shutdown requested while waiting to hand off connection");
                            break;
                        }
                        handed = self.on_accept(stream, peer) => {
                            if let Err(e) = handed {
                                warn!(%peer, error = %e, "connection dropped");
                            }
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
        self.on_shutdown().await;
        Ok(())
    }
}
