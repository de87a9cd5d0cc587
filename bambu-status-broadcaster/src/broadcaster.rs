use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bambu_status_format::DisplayRecord;
use tokio::io::AsyncReadExt;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use crate::arbiter::{OwnerEndpoint, SocketFileGuard};
use crate::client::{write_frame, ClientId, ClientRegistry};
use crate::error::{BroadcasterError, Result};

/// Default bound on a single write to one relay
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct BroadcastOptions {
    /// A relay that cannot take a frame within this long is dropped
    pub write_timeout: Duration,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Fans status lines out to every connected relay (Owner side)
pub struct StatusBroadcaster {
    registry: Arc<ClientRegistry>,
    options: BroadcastOptions,
    socket: Mutex<Option<SocketFileGuard>>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    listener_failure: Mutex<Option<oneshot::Receiver<io::Error>>>,
}

impl StatusBroadcaster {
    /// Create new broadcaster
    pub fn new(options: BroadcastOptions) -> Self {
        Self {
            registry: Arc::new(ClientRegistry::new()),
            options,
            socket: Mutex::new(None),
            accept_task: Mutex::new(None),
            listener_failure: Mutex::new(None),
        }
    }

    /// Start accepting relays on the endpoint won by the arbiter
    pub async fn start(&self, endpoint: OwnerEndpoint) -> Result<()> {
        let mut accept_task = self.accept_task.lock().await;
        if accept_task.is_some() {
            return Err(BroadcasterError::AlreadyRunning);
        }

        let (listener, guard) = endpoint.into_parts();
        tracing::info!("Status broadcaster started on {:?}", guard.path());

        let (failure_tx, failure_rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);
        let write_timeout = self.options.write_timeout;

        *accept_task = Some(tokio::spawn(accept_loop(
            listener,
            registry,
            write_timeout,
            failure_tx,
        )));
        *self.socket.lock().await = Some(guard);
        *self.listener_failure.lock().await = Some(failure_rx);

        Ok(())
    }

    /// Stop accepting relays and remove the socket file
    pub async fn stop(&self) -> Result<()> {
        let task = self
            .accept_task
            .lock()
            .await
            .take()
            .ok_or(BroadcasterError::NotStarted)?;

        // Aborting the accept loop also drops its liveness readers. Wait for
        // it so an `admit` in flight cannot add a relay after the drain.
        task.abort();
        let _ = task.await;

        // Relays notice the Owner leaving by the connection closing
        for connection in self.registry.drain().await {
            connection.close().await;
        }

        // Dropping the guard removes the socket file
        self.socket.lock().await.take();

        tracing::info!("Status broadcaster stopped");
        Ok(())
    }

    /// Resolve once the listening socket has failed for good.
    ///
    /// Pends forever if the broadcaster was never started or is stopped.
    pub async fn listener_failed(&self) -> BroadcasterError {
        let receiver = self.listener_failure.lock().await.take();
        match receiver {
            Some(receiver) => match receiver.await {
                Ok(err) => BroadcasterError::Listener(err),
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }

    /// Serialize a record and broadcast it
    pub async fn broadcast_record(&self, record: &DisplayRecord) -> Result<usize> {
        let line = record.to_json()?;
        Ok(self.broadcast_line(&line).await)
    }

    /// Write `line` (without terminator) to every relay.
    ///
    /// Writes run concurrently, each bounded by the write timeout. A relay
    /// whose write fails is closed and removed; the others are unaffected.
    /// Returns the number of relays that received the line.
    pub async fn broadcast_line(&self, line: &str) -> usize {
        let frame: Arc<str> = Arc::from(format!("{}\n", line));
        let targets = self.registry.publish(Arc::clone(&frame)).await;

        let mut writes = JoinSet::new();
        for connection in targets {
            let frame = Arc::clone(&frame);
            let timeout = self.options.write_timeout;
            writes.spawn(async move {
                let result = connection.send(&frame, timeout).await;
                (connection, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((connection, Err(e))) => {
                    tracing::warn!("Failed to send to relay {}: {}", connection.id(), e);
                    connection.close().await;
                    self.registry.remove(connection.id()).await;
                }
                Err(e) => tracing::error!("Relay write task failed: {}", e),
            }
        }

        delivered
    }

    /// Get current client count
    pub async fn client_count(&self) -> usize {
        self.registry.len().await
    }

    /// Path of the socket while running
    pub async fn socket_path(&self) -> Option<PathBuf> {
        self.socket
            .lock()
            .await
            .as_ref()
            .map(|guard| guard.path().to_path_buf())
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(BroadcastOptions::default())
    }
}

impl Drop for StatusBroadcaster {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    registry: Arc<ClientRegistry>,
    write_timeout: Duration,
    failure_tx: oneshot::Sender<io::Error>,
) {
    let mut liveness = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    admit(stream, &registry, write_timeout, &mut liveness).await;
                }
                Err(e) if is_transient_accept_error(&e) => {
                    tracing::warn!("Failed to accept relay: {}", e);
                    // Out of descriptors: give relays a moment to go away
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    tracing::error!("Listener failed: {}", e);
                    let _ = failure_tx.send(e);
                    break;
                }
            },
            Some(_) = liveness.join_next(), if !liveness.is_empty() => {}
        }
    }

    tracing::info!("Relay acceptance task stopped");
}

async fn admit(
    stream: UnixStream,
    registry: &Arc<ClientRegistry>,
    write_timeout: Duration,
    liveness: &mut JoinSet<()>,
) {
    let (read_half, write_half) = stream.into_split();
    let connection = registry.connection(write_half);
    let id = connection.id();

    // Held across `add` so a concurrent broadcast queues behind the catch-up
    let mut writer = connection.writer().lock().await;
    let catch_up = registry.add(Arc::clone(&connection)).await;

    if let Some(frame) = catch_up {
        if let Err(e) = write_frame(&mut writer, &frame, write_timeout).await {
            tracing::warn!("Failed to send catch-up to relay {}: {}", id, e);
            drop(writer);
            registry.remove(id).await;
            return;
        }
    }
    drop(writer);

    liveness.spawn(watch_relay(read_half, id, Arc::clone(registry)));
}

/// Relays never talk; reading only tells us when they hang up
async fn watch_relay(mut reader: OwnedReadHalf, id: ClientId, registry: Arc<ClientRegistry>) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Relay {} hung up", id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("Relay {} read error: {}", id, e);
                break;
            }
        }
    }
    registry.remove(id).await;
}

fn is_transient_accept_error(err: &io::Error) -> bool {
    use io::ErrorKind::*;

    matches!(
        err.kind(),
        ConnectionAborted | ConnectionReset | Interrupted | WouldBlock | TimedOut | OutOfMemory
    ) || matches!(err.raw_os_error(), Some(code) if TRANSIENT_ACCEPT_ERRNOS.contains(&code))
}

// ENFILE, EMFILE, ENOBUFS, EPROTO
#[cfg(target_os = "linux")]
const TRANSIENT_ACCEPT_ERRNOS: &[i32] = &[23, 24, 105, 71];
#[cfg(not(target_os = "linux"))]
const TRANSIENT_ACCEPT_ERRNOS: &[i32] = &[23, 24, 55, 100];
