//! Replay of a captured notification stream

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::{Transport, TransportEvent};
use crate::error::{Error, Result};

/// Notification payload size of a BLE 4.x link without MTU negotiation
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Replays a byte capture as one connection.
///
/// Emits `Connected`, the capture in `chunk_size` notifications,
/// `Disconnected`, then ends the stream.
#[derive(Debug)]
pub struct ReplayTransport {
    source: String,
    pending: VecDeque<TransportEvent>,
    delay: Option<Duration>,
}

impl ReplayTransport {
    /// Load a capture file
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            chunk_size,
            "Loaded capture for replay"
        );
        Self::from_bytes(path_label(path), &bytes, chunk_size)
    }

    /// Replay `bytes` under the peripheral name `source`
    pub fn from_bytes(source: impl Into<String>, bytes: &[u8], chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("replay chunk size must be at least 1".to_string()));
        }

        let source = source.into();
        let mut pending = VecDeque::with_capacity(bytes.len() / chunk_size + 2);
        pending.push_back(TransportEvent::Connected {
            peripheral: source.clone(),
        });
        pending.extend(
            bytes
                .chunks(chunk_size)
                .map(|chunk| TransportEvent::Notification(chunk.to_vec())),
        );
        pending.push_back(TransportEvent::Disconnected {
            reason: "end of capture".to_string(),
        });

        Ok(Self {
            source,
            pending,
            delay: None,
        })
    }

    /// Pause between notifications
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Events not yet emitted
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn next_event(&mut self) -> Result<Option<TransportEvent>> {
        let event = self.pending.pop_front();
        if let (Some(TransportEvent::Notification(_)), Some(delay)) = (&event, self.delay) {
            tokio::time::sleep(delay).await;
        }
        Ok(event)
    }
}

fn path_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
