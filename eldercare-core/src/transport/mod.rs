//! Byte sources feeding the relay
//!
//! A [`Transport`] yields connection lifecycle events and raw notification
//! payloads. [`BleTransport`] talks to the wearable over Bluetooth LE;
//! [`ReplayTransport`] replays a captured byte stream from disk.

mod ble;
mod replay;

pub use ble::BleTransport;
pub use replay::{ReplayTransport, DEFAULT_CHUNK_SIZE};

use crate::error::Result;
use async_trait::async_trait;

/// Something that happened on the link to the wearable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A device connected and notifications are subscribed
    Connected { peripheral: String },
    /// One notification payload, in arrival order
    Notification(Vec<u8>),
    /// The link dropped
    Disconnected { reason: String },
}

/// Source of [`TransportEvent`]s.
///
/// `Ok(None)` ends the stream. An error leaves the transport usable; the
/// next call starts a fresh connection attempt.
#[async_trait]
pub trait Transport: Send {
    async fn next_event(&mut self) -> Result<Option<TransportEvent>>;
}
