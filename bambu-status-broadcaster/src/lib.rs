//! Single-instance status broadcaster for waybar-bambu-status
//!
//! Many copies of the status program may be started (one per bar, per
//! monitor, ...). Only one of them should talk to the printer. This crate
//! decides who that is and moves status lines from it to everyone else over
//! a Unix domain socket.
//!
//! # Roles
//!
//! - **Owner** - won the socket; feeds [`StatusBroadcaster`] with records
//! - **Relay** - found an Owner; copies its lines to stdout until it leaves
//!
//! # Protocol
//!
//! Newline-delimited JSON, Owner → Relay only. Every line is one
//! `DisplayRecord` (`text`, `tooltip`, `class`). A relay that connects gets
//! the most recent line straight away.
//!
//! # Example Usage
//!
//! ```no_run
//! use bambu_status_broadcaster::{determine_role, relay_to_stdout, Role, StatusBroadcaster};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     match determine_role("/tmp/waybar-bambu-status.sock").await? {
//!         Role::Relay(stream) => {
//!             relay_to_stdout(stream).await?;
//!         }
//!         Role::Owner(endpoint) => {
//!             let broadcaster = StatusBroadcaster::default();
//!             broadcaster.start(endpoint).await?;
//!
//!             broadcaster
//!                 .broadcast_line(r#"{"text":"42%","tooltip":"","class":"running"}"#)
//!                 .await;
//!
//!             broadcaster.stop().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod arbiter;
pub mod broadcaster;
pub mod client;
pub mod error;
pub mod relay;

// Re-exports
pub use arbiter::{determine_role, OwnerEndpoint, Role};
pub use broadcaster::{BroadcastOptions, StatusBroadcaster, DEFAULT_WRITE_TIMEOUT};
pub use client::{ClientId, ClientRegistry, RelayConnection};
pub use error::{BroadcasterError, Result};
pub use relay::{relay_lines, relay_to_stdout};
