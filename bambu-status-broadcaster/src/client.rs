use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::{BroadcasterError, Result};

/// Unique per accepted connection, never reused
pub type ClientId = u64;

/// Write side of one connected relay
#[derive(Debug)]
pub struct RelayConnection {
    id: ClientId,
    writer: Mutex<OwnedWriteHalf>,
}

impl RelayConnection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Send one newline-terminated frame, giving up after `timeout`
    pub async fn send(&self, frame: &str, timeout: Duration) -> Result<()> {
        let mut writer = self.writer.lock().await;
        write_frame(&mut writer, frame, timeout).await
    }

    /// Shut down the write side; errors are irrelevant at this point
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    pub(crate) fn writer(&self) -> &Mutex<OwnedWriteHalf> {
        &self.writer
    }
}

pub(crate) async fn write_frame(
    writer: &mut OwnedWriteHalf,
    frame: &str,
    timeout: Duration,
) -> Result<()> {
    let write = async {
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await
    };

    match tokio::time::timeout(timeout, write).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BroadcasterError::WriteTimeout(timeout)),
    }
}

#[derive(Default)]
struct Membership {
    clients: HashMap<ClientId, Arc<RelayConnection>>,
    latest: Option<Arc<str>>,
}

/// Thread-safe set of connected relays
///
/// The lock is only held for the set operation itself; callers write to the
/// returned connections after it has been released. Alongside the members
/// the registry remembers the last published frame so that a relay joining
/// later can be caught up without missing or duplicating a record.
pub struct ClientRegistry {
    inner: Mutex<Membership>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Membership::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap a freshly accepted connection. It is not a member until [`add`].
    ///
    /// [`add`]: ClientRegistry::add
    pub fn connection(&self, writer: OwnedWriteHalf) -> Arc<RelayConnection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(RelayConnection {
            id,
            writer: Mutex::new(writer),
        })
    }

    /// Add a relay and return the frame it needs to catch up on, if any.
    pub async fn add(&self, connection: Arc<RelayConnection>) -> Option<Arc<str>> {
        let mut inner = self.inner.lock().await;
        let id = connection.id();
        inner.clients.insert(id, connection);
        tracing::info!("Relay {} connected. Total relays: {}", id, inner.clients.len());
        inner.latest.clone()
    }

    /// Remove a relay. Removing an absent relay is a no-op.
    pub async fn remove(&self, id: ClientId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.clients.remove(&id).is_some();
        if removed {
            tracing::info!("Removed relay {}. Remaining: {}", id, inner.clients.len());
        }
        removed
    }

    /// Current members
    pub async fn snapshot(&self) -> Vec<Arc<RelayConnection>> {
        self.inner.lock().await.clients.values().cloned().collect()
    }

    /// Record `frame` as the latest one and return the members to send it to.
    ///
    /// Members added after this call get `frame` from [`add`] instead.
    ///
    /// [`add`]: ClientRegistry::add
    pub async fn publish(&self, frame: Arc<str>) -> Vec<Arc<RelayConnection>> {
        let mut inner = self.inner.lock().await;
        inner.latest = Some(frame);
        inner.clients.values().cloned().collect()
    }

    /// Remove every member, handing them back for closing
    pub async fn drain(&self) -> Vec<Arc<RelayConnection>> {
        let mut inner = self.inner.lock().await;
        inner.clients.drain().map(|(_, connection)| connection).collect()
    }

    /// Get current client count
    pub async fn len(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
