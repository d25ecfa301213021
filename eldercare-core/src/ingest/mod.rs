//! Ingestion layer for the wearable's telemetry stream
//!
//! Turns raw notification bytes into classified telemetry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ BLE notification│ ──► │ FrameReassembler │ ──► │    classify     │
//! │   (raw bytes)   │     │  (first `}` cut) │     │                 │
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                                                          │
//!                              ┌───────────────────────────┼──────────────┐
//!                              ▼                           ▼              ▼
//!                       RegularSample            HighHeartRateAlert   FallAlert
//!                     (sample buffer)              (gateway, now)   (gateway, now)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use eldercare_core::ingest::{classify, FrameReassembler, Outcome};
//!
//! let mut reassembler = FrameReassembler::new();
//! assert!(reassembler.feed(br#"{"bpm":72,"timestamp":"2024-01-01T00:00:00Z""#).frames.is_empty());
//!
//! let outcome = reassembler.feed(b"}");
//! assert!(matches!(classify(&outcome.frames[0]), Outcome::RegularSample(_)));
//! ```

mod classifier;
mod reassembler;

pub use classifier::{classify, Outcome};
pub use reassembler::{FeedOutcome, FrameReassembler};
