//! waybar-bambu-status daemon
//!
//! Owner-side plumbing: configuration, the printer's MQTT feed and the
//! pipeline that turns each push into a broadcast status line. Role
//! selection and relaying live in `bambu-status-broadcaster`.

pub mod config;
pub mod feed;
pub mod pipeline;

use std::path::PathBuf;

use bambu_status_format::Layout;
use bambu_status_paths::{COMPACT_SOCKET_NAME, DETAILED_SOCKET_NAME};

pub use config::{BroadcastConfig, DaemonConfig, PrinterConfig};
pub use feed::{BrokerAddress, PrinterFeed};
pub use pipeline::StatusPipeline;

/// Socket file name for a layout
pub fn socket_name(layout: Layout) -> &'static str {
    match layout {
        Layout::Detailed => DETAILED_SOCKET_NAME,
        Layout::Compact => COMPACT_SOCKET_NAME,
    }
}

/// Endpoint for `layout` in the runtime directory
pub fn default_socket_path(layout: Layout) -> anyhow::Result<PathBuf> {
    Ok(bambu_status_paths::get_socket_path(socket_name(layout))?)
}
