//! Dispatch to the telemetry backend
//!
//! The relay never talks HTTP directly. It hands single alerts and bulk
//! sample batches to a [`Gateway`], and the production gateway is
//! [`ApiClient`].
//!
//! ## Delivery
//!
//! All telemetry delivery is at-most-once:
//! - submissions are fire-and-forget from the relay's point of view
//! - a failed submission is never retried or re-buffered
//! - single-event failures are reported to observers, bulk failures are only logged
//!
//! ## Usage
//!
//! Point the client at the backend in `~/.config/eldercare/config.toml`:
//!
//! ```toml
//! [api]
//! base_url = "https://care.example.com"
//! timeout_secs = 30
//! ```

mod account;
mod batcher;
mod client;

pub use account::Registration;
pub use batcher::{BatchState, FlushTimer, SampleBuffer};
pub use client::ApiClient;

use crate::error::Result;
use crate::types::{Endpoint, HeartRateSample};
use async_trait::async_trait;

/// Path of the bulk upload endpoint, relative to the API base URL
pub const BULK_HEART_RATE_PATH: &str = "/api/HeartRate/bulkHeartRate";

/// Where the relay sends telemetry.
///
/// Implementations serialize payloads as JSON, attach the session's bearer
/// token when there is one, and resolve to the response body on HTTP 200.
/// Anything else is an error carrying the response body as diagnostic text.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Submit one event to a single-event endpoint
    async fn send_single(&self, endpoint: Endpoint, payload: serde_json::Value) -> Result<String>;

    /// Submit a batch of regular samples in one request
    async fn send_bulk(&self, samples: Vec<HeartRateSample>) -> Result<String>;
}
