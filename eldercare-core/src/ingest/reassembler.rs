//! Frame reassembly for the wearable's notification stream
//!
//! The device sends flat JSON objects split across BLE notifications at
//! arbitrary byte boundaries. The first `}` in the buffer always closes the
//! current frame because frames never nest.

use crate::types::ParsedFrame;

const FRAME_END: u8 = b'}';

/// Result of feeding one chunk.
#[derive(Debug, Default)]
pub struct FeedOutcome {
    /// Complete frames, in arrival order
    pub frames: Vec<ParsedFrame>,
    /// Slices that ended in `}` but did not decode as a JSON object
    pub malformed: usize,
}

/// Accumulates raw chunks and carves out complete frames.
///
/// Works on bytes rather than text so a chunk boundary in the middle of a
/// multi-byte character does not corrupt the frame.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: Vec<u8>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completes.
    ///
    /// Malformed slices are dropped and never retried; extraction continues
    /// with whatever follows them.
    pub fn feed(&mut self, chunk: &[u8]) -> FeedOutcome {
        self.buffer.extend_from_slice(chunk);

        let mut outcome = FeedOutcome::default();
        let mut consumed = 0;

        while let Some(offset) = self.buffer[consumed..]
            .iter()
            .position(|&b| b == FRAME_END)
        {
            let end = consumed + offset + 1;
            let slice = &self.buffer[consumed..end];
            consumed = end;

            match serde_json::from_slice::<ParsedFrame>(slice) {
                Ok(frame) => outcome.frames.push(frame),
                Err(e) => {
                    outcome.malformed += 1;
                    tracing::warn!(
                        error = %e,
                        slice = %String::from_utf8_lossy(slice),
                        "Dropping malformed frame"
                    );
                }
            }
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }

        if !self.buffer.is_empty() {
            tracing::trace!(pending = self.buffer.len(), "Waiting for more data");
        }

        outcome
    }

    /// Discard any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Bytes held that do not yet form a complete frame
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
