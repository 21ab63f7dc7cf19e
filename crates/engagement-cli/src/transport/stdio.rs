//! Stdio transport: reads host messages from stdin, writes engine output to stdout.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::session::SessionHandle;
use crate::types::{HostError, HostOutput, HostResult};

use super::framing;

/// Bridges a host page speaking JSON lines to a running session.
pub struct StdioTransport {
    handle: SessionHandle,
    outputs: mpsc::UnboundedReceiver<HostOutput>,
}

impl StdioTransport {
    pub fn new(handle: SessionHandle, outputs: mpsc::UnboundedReceiver<HostOutput>) -> Self {
        Self { handle, outputs }
    }

    /// Run until stdin reaches EOF and every queued message is handled.
    pub async fn run(self) -> HostResult<()> {
        let Self {
            handle,
            mut outputs,
        } = self;

        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(output) = outputs.recv().await {
                let framed = framing::frame_message(&output)?;
                stdout.write_all(framed.as_bytes()).await?;
                stdout.flush().await?;
            }
            Ok::<(), HostError>(())
        });

        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        tracing::info!("Stdio transport started");

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                tracing::info!("EOF on stdin, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match framing::parse_message(trimmed) {
                Ok(msg) => handle.send(msg).await?,
                Err(e) => {
                    tracing::warn!("Parse error: {e}");
                    handle.report(HostOutput::error(e.to_string()));
                }
            }
        }

        handle.close().await?;
        writer
            .await
            .map_err(|e| HostError::Protocol(format!("Output writer failed: {e}")))??;
        Ok(())
    }
}
