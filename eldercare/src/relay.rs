//! eldercare-relay - relay telemetry from the wearable to the care backend
//!
//! Commands:
//! - `run`: connect to the wearable over Bluetooth LE and relay until Ctrl-C
//! - `replay <FILE>`: push a captured byte stream through the same pipeline
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/eldercare/config.toml (~/.config/eldercare/config.toml)
//! - Session: $XDG_DATA_HOME/eldercare/session.json
//! - Logs: $XDG_STATE_HOME/eldercare/eldercare.log

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eldercare_core::transport::{BleTransport, ReplayTransport, DEFAULT_CHUNK_SIZE};
use eldercare_core::{
    ApiClient, Config, Gateway, RelayEvent, RelayEventKind, RelayPipeline, RelayStats,
    SessionStore,
};
use tokio::sync::broadcast::{self, error::RecvError};

#[derive(Parser)]
#[command(name = "eldercare-relay")]
#[command(about = "Relay telemetry from the wearable to the care backend")]
#[command(version)]
struct Args {
    /// Don't print relay events as they happen
    #[arg(short, long)]
    quiet: bool,

    /// Seconds between bulk uploads (default: from config)
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Upload pending samples when the device disconnects instead of dropping them
    #[arg(long)]
    flush_on_disconnect: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the wearable over Bluetooth LE and relay until interrupted
    Run,

    /// Relay a captured notification stream instead of a live device
    Replay {
        /// Capture file (raw bytes as received from the RX characteristic)
        file: PathBuf,

        /// Bytes per simulated notification
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Milliseconds to wait between notifications
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(secs) = args.flush_interval {
        config.relay.flush_interval_secs = secs;
    }
    if args.flush_on_disconnect {
        config.relay.flush_on_disconnect = true;
    }
    config.validate().context("invalid configuration")?;

    let _log_guard =
        eldercare_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let sessions = Arc::new(
        SessionStore::open(Config::session_path()).context("failed to open session store")?,
    );
    match sessions.current() {
        Some(session) => println!("Relaying as {}", session.username),
        None => println!("Not logged in; submissions will be sent without a token"),
    }

    let client = ApiClient::new(&config.api, sessions).context("failed to create API client")?;
    let gateway: Arc<dyn Gateway> = Arc::new(client);
    let relay = RelayPipeline::new(gateway, &config.relay);

    let printer = (!args.quiet).then(|| tokio::spawn(print_events(relay.subscribe())));

    let outcome = match args.command {
        Command::Run => cmd_run(&config, &relay).await,
        Command::Replay {
            file,
            chunk_size,
            delay_ms,
        } => cmd_replay(&relay, file, chunk_size, delay_ms).await,
    };

    settle(&relay, config.relay.settle_timeout()).await;

    if let Some(printer) = printer {
        printer.abort();
    }

    print_stats(&relay.stats());
    outcome
}

async fn cmd_run(config: &Config, relay: &RelayPipeline) -> Result<()> {
    let mut transport = BleTransport::new(&config.device)
        .await
        .context("failed to open Bluetooth adapter")?;
    let retry_delay = config.device.reconnect_delay();

    println!("Waiting for the wearable (Ctrl-C to stop)...");

    let session = async {
        loop {
            if let Err(e) = relay.run(&mut transport).await {
                eprintln!("Connection error: {}", e.diagnostic());
            }
            tokio::time::sleep(retry_delay).await;
        }
    };

    tokio::select! {
        _ = session => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            println!();
            println!("Interrupted, shutting down");
        }
    }

    if relay.is_connected() {
        relay.on_disconnected("interrupted");
    }
    if let Err(e) = transport.disconnect().await {
        tracing::warn!(error = %e, "Failed to disconnect cleanly");
    }

    Ok(())
}

async fn cmd_replay(
    relay: &RelayPipeline,
    file: PathBuf,
    chunk_size: usize,
    delay_ms: u64,
) -> Result<()> {
    let mut transport = ReplayTransport::open(&file, chunk_size)
        .with_context(|| format!("failed to open capture {}", file.display()))?
        .with_delay(Duration::from_millis(delay_ms));

    println!("Replaying {}", file.display());
    relay
        .run(&mut transport)
        .await
        .context("replay failed")?;
    Ok(())
}

/// Wait for in-flight submissions, but not forever
async fn settle(relay: &RelayPipeline, timeout: Duration) {
    if tokio::time::timeout(timeout, relay.settle()).await.is_err() {
        tracing::warn!(timeout_secs = timeout.as_secs(), "Gave up waiting for submissions");
        eprintln!(
            "Some submissions were still in flight after {}s",
            timeout.as_secs()
        );
    }
}

async fn print_events(mut events: broadcast::Receiver<RelayEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", describe(&event)),
            Err(RecvError::Lagged(skipped)) => println!("... {} events skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn describe(event: &RelayEvent) -> String {
    let time = event.observed_at.format("%H:%M:%S");
    match &event.kind {
        RelayEventKind::HeartRate(sample) => {
            format!("[{}] heart rate {} bpm ({})", time, sample.measurement, sample.timestamp)
        }
        RelayEventKind::Alert(alert) => format!("[{}] ALERT {} forwarded", time, alert.endpoint()),
        RelayEventKind::ConnectionStatus { connected: true } => format!("[{}] connected", time),
        RelayEventKind::ConnectionStatus { connected: false } => {
            format!("[{}] disconnected", time)
        }
        RelayEventKind::DeliveryFailed { endpoint, error } => {
            format!("[{}] {} delivery failed: {}", time, endpoint, error)
        }
    }
}

fn print_stats(stats: &RelayStats) {
    println!();
    println!("Relay Summary");
    println!("=============");
    println!("Frames parsed:     {}", stats.frames_parsed);
    println!("Malformed frames:  {}", stats.frames_malformed);
    println!("Invalid frames:    {}", stats.frames_invalid);
    println!("Samples buffered:  {}", stats.samples_buffered);
    println!("Samples uploaded:  {}", stats.samples_flushed);
    println!("Samples discarded: {}", stats.samples_discarded);
    println!("Bulk uploads:      {}", stats.bulk_flushes);
    println!("Alerts forwarded:  {}", stats.alerts_forwarded);
    println!("Failed deliveries: {}", stats.delivery_failures);
}
