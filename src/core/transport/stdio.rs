//! STDIO transport implementation.
//!
//! A single client speaks MCP over stdin/stdout; logs go to stderr.

use rmcp::ServiceExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{TransportError, TransportResult};
use crate::core::McpServer;

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Serve `server` until the client closes stdin or `shutdown` fires.
    pub async fn run(server: McpServer, shutdown: CancellationToken) -> TransportResult<()> {
        info!(
            name = server.name(),
            version = server.version(),
            tools = server.tool_names().len(),
            "Ready - communicating via stdin/stdout"
        );
        Self::serve(server, rmcp::transport::stdio(), shutdown).await
    }

    async fn serve<R, W>(
        server: McpServer,
        io: (R, W),
        shutdown: CancellationToken,
    ) -> TransportResult<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let service = tokio::select! {
            service = server.serve(io) => service.map_err(|e| TransportError::init(e.to_string()))?,
            () = shutdown.cancelled() => {
                info!("Shutdown requested before a client connected");
                return Ok(());
            }
        };

        let cancel = service.cancellation_token();
        let mut waiting = std::pin::pin!(service.waiting());
        let outcome = tokio::select! {
            outcome = &mut waiting => outcome,
            () = shutdown.cancelled() => {
                info!("Shutdown requested, closing STDIO service");
                cancel.cancel();
                waiting.await
            }
        };
        let reason = outcome.map_err(|e| TransportError::ServiceError(e.to_string()))?;

        info!(?reason, "STDIO transport finished");
        Ok(())
    }
}
