//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Requests are handled concurrently; responses are written by a single
//! writer in completion order, one JSON document per line.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handler::McpHandler;
use super::types::JsonRpcResponse;
use crate::Result;

/// Serve MCP on the process's stdin and stdout until EOF or cancellation.
pub async fn serve_stdio(handler: Arc<McpHandler>, cancel: CancellationToken) -> Result<()> {
    info!("Serving MCP over stdio");
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(handler, stdin, stdout, cancel).await
}

/// Serve MCP on an arbitrary line-oriented reader and writer.
///
/// Returns once the reader hits EOF and every in-flight request has been
/// answered, or as soon as `cancel` fires.
pub async fn serve<R, W>(
    handler: Arc<McpHandler>,
    reader: R,
    mut writer: W,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    // Dropped at EOF so the channel closes once the last request finishes.
    let mut tx = Some(tx);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("stdio transport cancelled");
                break;
            }
            line = lines.next_line(), if tx.is_some() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Some(sender) = tx.clone() {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            if let Some(response) = handler.handle_text(&line).await {
                                let _ = sender.send(response);
                            }
                        });
                    }
                }
                None => {
                    debug!("stdin closed");
                    tx = None;
                }
            },
            response = rx.recv() => match response {
                Some(response) => write_response(&mut writer, &response).await?,
                None => break,
            },
        }
    }

    writer.flush().await?;
    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = match serde_json::to_vec(response) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Failed to encode JSON-RPC response");
            return Ok(());
        }
    };
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}
