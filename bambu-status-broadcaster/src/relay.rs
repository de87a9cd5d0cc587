//! Relay side: copy the Owner's line stream to our own output

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::Result;

/// Copy complete lines from `reader` to `out` until the Owner goes away.
///
/// Each line is written and flushed as soon as it arrives, byte for byte.
/// End of stream and read errors both end the relay normally; a trailing
/// line without its `\n` is dropped. Returns the number of lines relayed.
///
/// # Errors
/// Only failures to write to `out` are reported.
pub async fn relay_lines<R, W>(reader: R, mut out: W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut relayed = 0;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                tracing::info!("Owner closed the stream after {} lines", relayed);
                break;
            }
            Ok(_) if line.last() != Some(&b'\n') => {
                tracing::debug!("Dropping {} byte partial line at end of stream", line.len());
                break;
            }
            Ok(_) => {
                out.write_all(&line).await?;
                out.flush().await?;
                relayed += 1;
            }
            Err(e) => {
                tracing::warn!("Lost connection to owner: {}", e);
                break;
            }
        }
    }

    Ok(relayed)
}

/// Relay to standard output
pub async fn relay_to_stdout<R>(reader: R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    relay_lines(reader, tokio::io::stdout()).await
}
