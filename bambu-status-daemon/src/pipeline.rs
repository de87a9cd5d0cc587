//! Payload → record → broadcast, once per printer push

use std::sync::Arc;

use bambu_status_broadcaster::StatusBroadcaster;
use bambu_status_format::{Layout, TelemetryError, TelemetrySnapshot};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Owner-side processing of printer pushes
pub struct StatusPipeline {
    layout: Layout,
    broadcaster: Arc<StatusBroadcaster>,
    echo: Option<Echo>,
}

/// Latest line for the Owner's own output, written by a separate task
struct Echo {
    latest: watch::Sender<String>,
    task: JoinHandle<()>,
}

impl StatusPipeline {
    /// Broadcast only. Use [`echo_to`] to also print lines locally.
    ///
    /// [`echo_to`]: StatusPipeline::echo_to
    pub fn new(layout: Layout, broadcaster: Arc<StatusBroadcaster>) -> Self {
        Self {
            layout,
            broadcaster,
            echo: None,
        }
    }

    /// Also write every line to `out` (the Owner is a bar module too).
    ///
    /// Writing happens off the feed path: a sink that stops draining never
    /// holds up the broadcast. While it is stuck, only the newest line is
    /// kept for it.
    pub fn echo_to<W>(mut self, out: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        if let Some(previous) = self.echo.take() {
            previous.task.abort();
        }
        let (latest, rx) = watch::channel(String::new());
        let task = tokio::spawn(echo_lines(rx, out));
        self.echo = Some(Echo { latest, task });
        self
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Decode, format and broadcast one payload.
    ///
    /// Returns the line that went out, or `None` when the payload was
    /// dropped. Bad payloads are logged and never end the feed.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<String> {
        let snapshot = match TelemetrySnapshot::from_payload(payload) {
            Ok(snapshot) => snapshot,
            Err(TelemetryError::NotAPrintReport) => {
                // Printers also publish system and info messages on the topic
                debug!("Ignoring non-print report");
                return None;
            }
            Err(e) => {
                warn!("Dropping printer report: {}", e);
                return None;
            }
        };

        let record = self.layout.format(&snapshot);
        let line = match record.to_json() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize status: {}", e);
                return None;
            }
        };

        if let Some(echo) = &self.echo {
            echo.latest.send_replace(line.clone());
        }

        let delivered = self.broadcaster.broadcast_line(&line).await;
        debug!("{} -> {} relay(s)", record.class, delivered);

        Some(line)
    }
}

impl Drop for StatusPipeline {
    fn drop(&mut self) {
        if let Some(echo) = self.echo.take() {
            echo.task.abort();
        }
    }
}

async fn echo_lines<W>(mut latest: watch::Receiver<String>, mut out: W)
where
    W: AsyncWrite + Unpin,
{
    while latest.changed().await.is_ok() {
        let frame = format!("{}\n", *latest.borrow_and_update());

        let written = async {
            out.write_all(frame.as_bytes()).await?;
            out.flush().await
        };
        if let Err(e) = written.await {
            warn!("Stopped echoing status to stdout: {}", e);
            break;
        }
    }
}
