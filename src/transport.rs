use async_trait::async_trait;
use btleplug::{
    api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Adapter, Manager, Peripheral},
};
use futures::{future::BoxFuture, stream::StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{PadError, Result},
    types::ScanParams,
    WALKINGPAD_NOTIFY_CHAR_UUID, WALKINGPAD_WRITE_CHAR_UUID,
};

/// Service UUIDs advertised by KingSmith WalkingPad models
///
/// Older firmware revisions advertise different subsets of these, so
/// discovery matches a device if any advertised service is in this set.
pub const WALKINGPAD_SERVICE_UUIDS: [&str; 15] = [
    "00001800-0000-1000-8000-00805f9b34fb",
    "0000180a-0000-1000-8000-00805f9b34fb",
    "00010203-0405-0607-0809-0a0b0c0d1912",
    "0000fe00-0000-1000-8000-00805f9b34fb",
    "0000fe01-0000-1000-8000-00805f9b34fb",
    "0000fe02-0000-1000-8000-00805f9b34fb",
    "00002a00-0000-1000-8000-00805f9b34fb",
    "00002a01-0000-1000-8000-00805f9b34fb",
    "00002a04-0000-1000-8000-00805f9b34fb",
    "00002a24-0000-1000-8000-00805f9b34fb",
    "00002a25-0000-1000-8000-00805f9b34fb",
    "00002a26-0000-1000-8000-00805f9b34fb",
    "00002a28-0000-1000-8000-00805f9b34fb",
    "00002a29-0000-1000-8000-00805f9b34fb",
    "00010203-0405-0607-0809-0a0b0c0d2b12",
];

/// Raw write/disconnect surface of a connected pad
///
/// The session driver talks to the device exclusively through this trait so
/// tests can substitute a mock for the BLE link.
#[async_trait]
pub trait PadTransport: Send + Sync {
    /// Write a command frame to the device
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Ble`] if the underlying write fails. The writer
    /// logs and drops failed writes; they are not retried.
    async fn write(&self, frame: &[u8]) -> Result<()>;

    /// Check whether the link is still up
    async fn is_connected(&self) -> bool;

    /// Release the link
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Ble`] if the disconnect fails.
    async fn disconnect(&self) -> Result<()>;
}

/// Stream of raw notification frames from the device
pub type NotificationStream = mpsc::UnboundedReceiver<Vec<u8>>;

type ConnectFn = Box<dyn FnOnce() -> BoxFuture<'static, ConnectResult> + Send>;

/// Result of connecting a candidate: the write surface plus raw notifications
pub type ConnectResult = Result<(Arc<dyn PadTransport>, NotificationStream)>;

/// A device found during scanning that can be connected into a transport
///
/// Carries a one-shot connect closure so discovery strategies decide how the
/// link is established while the supervisor stays strategy-agnostic.
pub struct Candidate {
    /// Advertised device name, if any
    pub name: Option<String>,
    /// Device address
    pub address: String,
    connect: ConnectFn,
}

impl Candidate {
    /// Create a candidate from an address and connect closure
    pub fn new(
        name: Option<String>,
        address: String,
        connect: impl FnOnce() -> BoxFuture<'static, ConnectResult> + Send + 'static,
    ) -> Self {
        Self {
            name,
            address,
            connect: Box::new(connect),
        }
    }

    /// Connect this candidate, consuming it
    ///
    /// # Errors
    ///
    /// Returns [`PadError::ConnectionFailed`] or [`PadError::Ble`] if the
    /// link or characteristic discovery fails.
    pub async fn connect(self) -> ConnectResult {
        (self.connect)().await
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// A discovery strategy: decides what counts as a pad of its class
///
/// The supervisor is constructed with an explicit list of discoverers; there
/// is no ambient registration.
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Scan for candidate devices
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Ble`] if scanning fails outright. Finding no
    /// device is not an error; the result is simply empty.
    async fn scan(&self, params: &ScanParams) -> Result<Vec<Candidate>>;
}

/// Discovery strategy for KingSmith WalkingPad treadmills
///
/// Matches devices advertising any of [`WALKINGPAD_SERVICE_UUIDS`] and
/// prefers an exact address match when a preferred device is configured.
pub struct KingsmithDiscoverer {
    adapter: Adapter,
}

impl KingsmithDiscoverer {
    /// Create a discoverer on the first available Bluetooth adapter
    ///
    /// # Errors
    ///
    /// Returns [`PadError::Ble`] if the Bluetooth stack cannot be
    /// initialized, or [`PadError::DeviceNotFound`] if no adapter exists.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(PadError::DeviceNotFound)?;
        Ok(Self { adapter })
    }

    async fn matches(peripheral: &Peripheral) -> bool {
        let Ok(Some(properties)) = peripheral.properties().await else {
            return false;
        };
        properties
            .services
            .iter()
            .any(|uuid| walkingpad_service_uuids().contains(uuid))
    }
}

#[async_trait]
impl Discoverer for KingsmithDiscoverer {
    async fn scan(&self, params: &ScanParams) -> Result<Vec<Candidate>> {
        info!("starting scan for walkingpad devices");

        self.adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(params.timeout).await;
        self.adapter.stop_scan().await?;

        let mut candidates = Vec::new();
        for peripheral in self.adapter.peripherals().await? {
            if !Self::matches(&peripheral).await {
                continue;
            }

            let address = peripheral.address().to_string();
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|p| p.local_name);

            info!(device = %address, "found walkingpad");

            let preferred = params
                .preferred_device
                .as_ref()
                .is_some_and(|want| want.eq_ignore_ascii_case(&address));

            let candidate = Candidate::new(name, address, move || {
                Box::pin(async move { connect_peripheral(peripheral).await })
            });

            if preferred {
                // the configured device always wins the candidate ordering
                candidates.insert(0, candidate);
            } else {
                candidates.push(candidate);
            }
        }

        info!("scan completed, found {} candidate(s)", candidates.len());
        Ok(candidates)
    }
}

fn walkingpad_service_uuids() -> Vec<Uuid> {
    WALKINGPAD_SERVICE_UUIDS
        .iter()
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect()
}

async fn connect_peripheral(peripheral: Peripheral) -> ConnectResult {
    peripheral
        .connect()
        .await
        .map_err(|e| PadError::ConnectionFailed(e.to_string()))?;
    peripheral.discover_services().await?;

    let mut notify_char = None;
    let mut write_char = None;
    for service in peripheral.services() {
        for characteristic in &service.characteristics {
            let uuid = characteristic.uuid.to_string();
            if uuid.starts_with(&WALKINGPAD_NOTIFY_CHAR_UUID[..8]) {
                notify_char = Some(characteristic.clone());
            }
            if uuid.starts_with(&WALKINGPAD_WRITE_CHAR_UUID[..8]) {
                write_char = Some(characteristic.clone());
            }
        }
    }

    let notify_char =
        notify_char.ok_or_else(|| PadError::Protocol("notify characteristic not found".into()))?;
    let write_char =
        write_char.ok_or_else(|| PadError::Protocol("write characteristic not found".into()))?;

    peripheral.subscribe(&notify_char).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut notifications = peripheral.notifications().await?;
    let notify_uuid = notify_char.uuid;
    tokio::spawn(async move {
        while let Some(data) = notifications.next().await {
            if data.uuid != notify_uuid {
                continue;
            }
            debug!("notification: {:02X?}", data.value);
            if tx.send(data.value).is_err() {
                break;
            }
        }
        debug!("notification stream ended");
    });

    let transport = BleTransport {
        peripheral,
        write_char,
    };
    Ok((Arc::new(transport), rx))
}

/// Production [`PadTransport`] backed by a btleplug peripheral
pub struct BleTransport {
    peripheral: Peripheral,
    write_char: btleplug::api::Characteristic,
}

#[async_trait]
impl PadTransport for BleTransport {
    async fn write(&self, frame: &[u8]) -> Result<()> {
        debug!("writing frame: {:02X?}", frame);
        self.peripheral
            .write(&self.write_char, frame, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self) -> Result<()> {
        if let Err(err) = self.peripheral.disconnect().await {
            warn!(error = %err, "disconnect failed");
            return Err(err.into());
        }
        Ok(())
    }
}

/// Scan all strategies in order and return the combined candidate list
///
/// # Errors
///
/// Returns the first scan error encountered; individual strategies finding
/// nothing is not an error.
pub async fn discover_candidates(
    discoverers: &[Box<dyn Discoverer>],
    params: &ScanParams,
) -> Result<Vec<Candidate>> {
    let mut all = Vec::new();
    for discoverer in discoverers {
        all.extend(discoverer.scan(params).await?);
    }
    Ok(all)
}

/// Default discovery timeout used by the supervisor
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuids_parse() {
        for uuid in WALKINGPAD_SERVICE_UUIDS {
            assert!(Uuid::parse_str(uuid).is_ok(), "invalid uuid: {uuid}");
        }
        assert_eq!(
            walkingpad_service_uuids().len(),
            WALKINGPAD_SERVICE_UUIDS.len()
        );
    }

    #[test]
    fn test_char_uuid_prefixes() {
        assert_eq!(&WALKINGPAD_NOTIFY_CHAR_UUID[..8], "0000fe01");
        assert_eq!(&WALKINGPAD_WRITE_CHAR_UUID[..8], "0000fe02");
    }

    #[tokio::test]
    async fn test_candidate_connect_closure() {
        let candidate = Candidate::new(None, "AA:BB:CC:DD:EE:FF".to_string(), || {
            Box::pin(async { Err(PadError::DeviceNotFound) })
        });
        assert_eq!(candidate.address, "AA:BB:CC:DD:EE:FF");
        assert!(matches!(
            candidate.connect().await,
            Err(PadError::DeviceNotFound)
        ));
    }
}
