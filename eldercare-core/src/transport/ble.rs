//! Bluetooth LE link to the wearable
//!
//! Scans for a peripheral advertising the telemetry service, subscribes to
//! the RX characteristic and yields each notification payload. A dropped
//! link is reported once; the following call scans again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use super::{Transport, TransportEvent};
use crate::config::DeviceConfig;
use crate::error::{Error, Result};

/// How often discovered peripherals are re-checked while scanning
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;
type CentralEventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// A connected, subscribed peripheral
struct Link {
    peripheral: Peripheral,
    label: String,
    notifications: Mutex<NotificationStream>,
    central_events: Mutex<CentralEventStream>,
}

/// BLE central bound to the first adapter on the host
pub struct BleTransport {
    central: Adapter,
    service_uuid: Uuid,
    rx_uuid: Uuid,
    scan_timeout: Duration,
    link: Option<Link>,
}

impl BleTransport {
    /// Open the first Bluetooth adapter.
    pub async fn new(config: &DeviceConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("no Bluetooth adapter found".to_string()))?;

        if let Ok(info) = central.adapter_info().await {
            tracing::info!(adapter = %info, "Using Bluetooth adapter");
        }

        Ok(Self {
            central,
            service_uuid: config.service_uuid()?,
            rx_uuid: config.rx_characteristic_uuid()?,
            scan_timeout: config.scan_timeout(),
            link: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Drop the current link, if any
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            tracing::info!(peripheral = %link.label, "Disconnecting");
            link.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn connect(&self) -> Result<Link> {
        tracing::info!(
            service = %self.service_uuid,
            timeout_secs = self.scan_timeout.as_secs(),
            "Scanning for wearable"
        );

        self.central
            .start_scan(ScanFilter {
                services: vec![self.service_uuid],
            })
            .await?;
        let found = self.find_peripheral().await;
        if let Err(e) = self.central.stop_scan().await {
            tracing::warn!(error = %e, "Failed to stop scan");
        }

        let peripheral = found?.ok_or_else(|| {
            Error::Transport(format!(
                "no device advertising {} within {}s",
                self.service_uuid,
                self.scan_timeout.as_secs()
            ))
        })?;

        let label = match peripheral.properties().await {
            Ok(Some(props)) => props
                .local_name
                .unwrap_or_else(|| peripheral.address().to_string()),
            _ => peripheral.address().to_string(),
        };

        // Subscribe to adapter events first so an early drop is not missed
        let central_events = self.central.events().await?;

        peripheral.connect().await?;
        let notifications = release_on_error(self.subscribe_rx(&peripheral, &label), async {
            peripheral.disconnect().await.map_err(Error::from)
        })
        .await?;

        tracing::info!(peripheral = %label, "Connected and subscribed");

        Ok(Link {
            peripheral,
            label,
            notifications: Mutex::new(notifications),
            central_events: Mutex::new(central_events),
        })
    }

    /// Discover services on a connected peripheral and subscribe to RX
    async fn subscribe_rx(
        &self,
        peripheral: &Peripheral,
        label: &str,
    ) -> Result<NotificationStream> {
        peripheral.discover_services().await?;

        let rx = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == self.rx_uuid)
            .ok_or_else(|| {
                Error::Transport(format!("{} has no characteristic {}", label, self.rx_uuid))
            })?;
        peripheral.subscribe(&rx).await?;
        Ok(peripheral.notifications().await?)
    }

    async fn find_peripheral(&self) -> Result<Option<Peripheral>> {
        let deadline = tokio::time::Instant::now() + self.scan_timeout;

        loop {
            for peripheral in self.central.peripherals().await? {
                if let Ok(Some(props)) = peripheral.properties().await {
                    if props.services.contains(&self.service_uuid) {
                        return Ok(Some(peripheral));
                    }
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn next_event(&mut self) -> Result<Option<TransportEvent>> {
        let Some(link) = self.link.as_mut() else {
            let link = self.connect().await?;
            let peripheral = link.label.clone();
            self.link = Some(link);
            return Ok(Some(TransportEvent::Connected { peripheral }));
        };

        let reason = loop {
            tokio::select! {
                notification = link.notifications.get_mut().unwrap().next() => match notification {
                    Some(n) if n.uuid == self.rx_uuid => {
                        return Ok(Some(TransportEvent::Notification(n.value)));
                    }
                    Some(_) => continue,
                    None => break "notification stream ended",
                },
                event = link.central_events.get_mut().unwrap().next() => match event {
                    Some(CentralEvent::DeviceDisconnected(id)) if id == link.peripheral.id() => {
                        break "peripheral disconnected";
                    }
                    Some(_) => continue,
                    None => break "adapter event stream ended",
                },
            }
        };

        if let Some(link) = self.link.take() {
            tracing::warn!(peripheral = %link.label, reason, "Link lost");
            // The stream may end while the OS still holds the connection
            if let Err(e) = link.peripheral.disconnect().await {
                tracing::debug!(
                    peripheral = %link.label,
                    error = %e,
                    "Disconnect after link loss failed"
                );
            }
        }
        Ok(Some(TransportEvent::Disconnected {
            reason: reason.to_string(),
        }))
    }
}

/// Await `setup`; if it fails, run `release` before returning the error.
///
/// A failed release is logged and the setup error wins.
async fn release_on_error<T, S, R>(setup: S, release: R) -> Result<T>
where
    S: Future<Output = Result<T>>,
    R: Future<Output = Result<()>>,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(release_err) = release.await {
                tracing::warn!(error = %release_err, "Failed to release peripheral");
            }
            Err(e)
        }
    }
}
