//! Owner/Relay election on a well-known socket path
//!
//! The socket file is the mutual-exclusion token: whoever is listening on it
//! owns the printer connection, everybody else relays. Two processes starting
//! at the same instant can both see "no listener"; exactly one bind wins and
//! the loser exits with [`BroadcasterError::Bind`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::error::{BroadcasterError, Result};

/// What this process does for its whole lifetime
#[derive(Debug)]
pub enum Role {
    /// Holds the listening socket and the upstream feed
    Owner(OwnerEndpoint),
    /// Connected to an existing Owner, re-emits its lines
    Relay(UnixStream),
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Owner(_) => "owner",
            Role::Relay(_) => "relay",
        }
    }
}

/// Listening socket plus the file that backs it
#[derive(Debug)]
pub struct OwnerEndpoint {
    listener: UnixListener,
    guard: SocketFileGuard,
}

impl OwnerEndpoint {
    pub fn path(&self) -> &Path {
        self.guard.path()
    }

    pub(crate) fn into_parts(self) -> (UnixListener, SocketFileGuard) {
        (self.listener, self.guard)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(listener: UnixListener, path: PathBuf) -> Self {
        Self {
            listener,
            guard: SocketFileGuard { path },
        }
    }
}

/// Removes the socket file when dropped
#[derive(Debug)]
pub struct SocketFileGuard {
    path: PathBuf,
}

impl SocketFileGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed socket {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove socket {:?}: {}", self.path, e),
        }
    }
}

/// Decide whether this process becomes the Owner or a Relay.
///
/// A successful connect means an Owner is alive: the connection is returned
/// as [`Role::Relay`] and no bind is attempted. Otherwise any stale socket
/// file is removed and a fresh listener is bound (mode 0600).
///
/// # Errors
/// Bind failures are fatal. They are never retried and never turned into a
/// Relay role. A connect that fails for any reason other than "no such
/// file" or "connection refused" is fatal too, so a live owner's socket is
/// never unlinked.
pub async fn determine_role(socket_path: impl AsRef<Path>) -> Result<Role> {
    let socket_path = socket_path.as_ref();

    match UnixStream::connect(socket_path).await {
        Ok(stream) => {
            tracing::info!("Owner found on {:?}, running as relay", socket_path);
            return Ok(Role::Relay(stream));
        }
        // Nothing there, or a file nobody listens on
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            tracing::debug!("No owner on {:?} ({}), taking ownership", socket_path, e);
        }
        // A full backlog or a permission problem may hide a live owner
        Err(source) => {
            return Err(BroadcasterError::Connect {
                path: socket_path.to_path_buf(),
                source,
            });
        }
    }

    bind_owner(socket_path).map(Role::Owner)
}

fn bind_owner(socket_path: &Path) -> Result<OwnerEndpoint> {
    // Best effort: a crashed Owner leaves its socket file behind
    match std::fs::remove_file(socket_path) {
        Ok(()) => tracing::info!("Removed stale socket {:?}", socket_path),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Could not remove stale socket {:?}: {}", socket_path, e),
    }

    bambu_status_paths::ensure_socket_parent(socket_path)
        .map_err(|e| BroadcasterError::SocketPath(format!("{:#}", e)))?;

    let listener = UnixListener::bind(socket_path).map_err(|source| BroadcasterError::Bind {
        path: socket_path.to_path_buf(),
        source,
    })?;

    // From here on the file is ours to clean up
    let guard = SocketFileGuard {
        path: socket_path.to_path_buf(),
    };

    bambu_status_paths::secure_socket_permissions(socket_path)
        .map_err(|e| BroadcasterError::SocketPath(format!("{:#}", e)))?;

    tracing::info!("Listening on {:?} (permissions: 0600)", socket_path);

    Ok(OwnerEndpoint { listener, guard })
}
