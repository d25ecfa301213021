//! # eldercare-core
//!
//! Core library for eldercare - a relay from a wrist-worn health monitor to
//! a telemetry backend.
//!
//! This library provides:
//! - Reassembly and classification of the wearable's JSON telemetry frames
//! - Bulk batching of regular heart-rate samples, immediate alert forwarding
//! - The HTTP gateway to the backend, plus account login and registration
//! - Bluetooth LE and capture-replay transports
//! - Configuration, session persistence and logging
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Transport:** notification bytes from the device (or a capture file)
//! - **Ingest:** bytes become frames, frames become samples or alerts
//! - **Dispatch:** samples are flushed in bulk on a timer, alerts go out at once
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eldercare_core::{ApiClient, Config, RelayPipeline, SessionStore};
//! use eldercare_core::transport::ReplayTransport;
//!
//! # async fn demo() -> eldercare_core::Result<()> {
//! let config = Config::load()?;
//! let sessions = Arc::new(SessionStore::open(Config::session_path())?);
//! let client = Arc::new(ApiClient::new(&config.api, sessions)?);
//!
//! let relay = RelayPipeline::new(client, &config.relay);
//! let mut transport = ReplayTransport::open("capture.bin".as_ref(), 20)?;
//! relay.run(&mut transport).await?;
//! relay.settle().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use dispatch::{ApiClient, Gateway};
pub use error::{Error, Result};
pub use relay::RelayPipeline;
pub use session::SessionStore;
pub use types::*;

// Public modules
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod relay;
pub mod session;
pub mod transport;
pub mod types;
