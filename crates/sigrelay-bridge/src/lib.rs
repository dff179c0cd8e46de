//! One-way event bridge from the observed chat client to the pipeline host.
//!
//! Provides:
//! - A self-describing single-line wire record for chat messages
//! - An in-process, unacknowledged, ordered text transport
//! - DevTools connection plumbing and a shared reconnect policy
//! - A CDP console listener that feeds console lines from the desktop
//!   client into the transport, with automatic reconnection

pub mod console;
pub mod devtools;
pub mod error;
pub mod reconnect;
pub mod record;
pub mod transport;

pub use console::{ConnectionState, ConsoleListener};
pub use devtools::{
    command, connect_devtools, discover_page_ws_url, CdpFrame, DevToolsConfig, DevToolsStream,
};
pub use error::{BridgeError, BridgeResult};
pub use reconnect::ReconnectPolicy;
pub use record::{decode, decode_record, encode, DropReason, MESSAGE_RECORD_TYPE};
pub use transport::{bridge_channel, BridgeReceiver, BridgeSender, BridgeSink, BridgeStats};
