use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use canvas_types::envelope::{Envelope, Operation, Reply};

/// Forward one JSON envelope per line to the worker until EOF.
///
/// Lines that are not envelopes carry no usable handle, so they are logged
/// and skipped rather than answered. `shutdown_sent` is set once a
/// `commitShutdown` has been forwarded, so the caller knows whether it still
/// has to send one after the input ends or is abandoned.
pub async fn forward_calls<R>(
    input: R,
    calls: &mpsc::UnboundedSender<Envelope>,
    shutdown_sent: &mut bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Skipping malformed envelope: {}", e);
                continue;
            }
        };

        let is_shutdown = envelope.call == Operation::CommitShutdown.name();
        debug!("-> {}", envelope.call);
        if calls.send(envelope).is_err() {
            debug!("Worker stopped accepting calls");
            break;
        }
        *shutdown_sent |= is_shutdown;
    }

    Ok(())
}

/// Write one JSON reply per line until the worker drops its reply channel.
pub async fn write_replies<W>(mut output: W, mut replies: mpsc::UnboundedReceiver<Reply>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = replies.recv().await {
        let mut line = serde_json::to_vec(&reply)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
