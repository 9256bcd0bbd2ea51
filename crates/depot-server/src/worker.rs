use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use depot_protocol::{DepotCodec, ProtocolError, Response};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::ProtocolHandler;

/// Per-connection I/O settings.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionSettings {
    pub codec: DepotCodec,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            codec: config.codec(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }
}

/// Serves exactly one request on one connection, then closes it.
pub struct ConnectionWorker<S> {
    stream: S,
    peer: SocketAddr,
    handler: Arc<ProtocolHandler>,
    settings: ConnectionSettings,
}

impl<S> ConnectionWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        peer: SocketAddr,
        handler: Arc<ProtocolHandler>,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            stream,
            peer,
            handler,
            settings,
        }
    }

    /// Read, handle, respond, close. Returns the number of response parts sent.
    pub async fn run(self) -> ServerResult<usize> {
        let span = info_span!("connection", id = %Uuid::now_v7(), peer = %self.peer);
        self.process().instrument(span).await
    }

    async fn process(mut self) -> ServerResult<usize> {
        let ConnectionSettings {
            codec,
            read_timeout,
            write_timeout,
        } = self.settings;

        let read = timeout(read_timeout, codec.read_message(&mut self.stream))
            .await
            .map_err(|_| {
                warn!(after = ?read_timeout, "read timed out, closing");
                ServerError::Timeout {
                    phase: "read",
                    after: read_timeout,
                }
            })?;

        let responses = match read {
            Ok(Some(raw)) => {
                debug!(bytes = raw.len(), "request received");
                let handler = Arc::clone(&self.handler);
                tokio::task::spawn_blocking(move || handler.handle(&raw))
                    .await
                    .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
            }
            Ok(None) => {
                debug!("peer closed without sending a request");
                return Ok(0);
            }
            Err(ProtocolError::Io(e)) => {
                warn!(error = %e, "failed to read request, closing");
                return Err(ServerError::Io(e));
            }
            Err(e) => self.handler.reject(&e),
        };

        let sent = responses.len();
        timeout(write_timeout, self.send_responses(codec, responses))
            .await
            .map_err(|_| {
                warn!(after = ?write_timeout, "write timed out, closing");
                ServerError::Timeout {
                    phase: "write",
                    after: write_timeout,
                }
            })?
            .inspect_err(|e| warn!(kind = e.kind(), error = %e, "failed to send response, closing"))?;

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown after response failed");
        }
        debug!(parts = sent, "connection finished");
        Ok(sent)
    }

    async fn send_responses(&mut self, codec: DepotCodec, responses: Vec<Response>) -> ServerResult<()> {
        for response in responses {
            let kind = response.kind();
            let bytes = response.into_bytes()?;
            codec.write_message(&mut self.stream, &bytes).await?;
            debug!(kind, bytes = bytes.len(), "response sent");
        }
        Ok(())
    }
}
