//! DOM mutation watcher and chat message extraction heuristics.
//!
//! The watcher runs against any [`DomHost`]; it owns no document itself.
//! [`CdpDomHost`] is the host backed by a DevTools connection to the page.
//! Extracted messages leave through a [`sigrelay_bridge::BridgeSink`].

pub mod cdp;
pub mod dom;
pub mod driver;
pub mod error;
pub mod extract;
pub mod mirror;
pub mod watcher;

pub use cdp::{CdpContainer, CdpDomHost, CdpDomSession};
pub use dom::{DomChild, DomNode};
pub use driver::WatchDriver;
pub use error::{WatchError, WatchResult};
pub use extract::{extract_message, is_message_node, PageContext};
pub use mirror::{DocumentMirror, NodeId};
pub use watcher::{
    ContainerQuery, DomHost, DriftCheck, MutationBatch, ScrollMetrics, WatchState, Watcher,
};
