//! btleplug backend, plus the scan and GATT listing utilities

use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Transport, TransportError};

/// A peripheral seen during a scan
#[derive(Debug, Clone)]
pub struct LampDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

/// A GATT service and its characteristics
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<(Uuid, CharPropFlags)>,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(TransportError::NoAdapter)
}

/// Scan for BLE devices for `duration`
pub async fn scan(duration: Duration) -> Result<Vec<LampDevice>, TransportError> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "(no name)".to_string());
            let address = peripheral.address().to_string();
            devices.push(LampDevice { name, address, rssi: props.rssi });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// List the GATT services of the device at `address`
pub async fn services(address: &str) -> Result<Vec<ServiceInfo>, TransportError> {
    let transport = BtleplugTransport::new().await?;
    let conn = transport.connect(address).await?;

    let listing = transport.discover(&conn).await.map(|()| {
        conn.peripheral
            .services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| (c.uuid, c.properties))
                    .collect(),
            })
            .collect()
    });

    if let Err(e) = transport.close(conn).await {
        warn!(%address, "disconnect failed: {e}");
    }
    listing
}

// macOS reports zeroed addresses, so lookups there never match.
fn matches_address(peripheral: &Peripheral, address: &str) -> bool {
    peripheral.address().to_string().eq_ignore_ascii_case(address)
}

// A future dropped mid-await never reaches its cleanup code, so the guards
// below hand that cleanup to the runtime instead.
fn spawn_cleanup<F>(what: &'static str, cleanup: F)
where
    F: Future<Output = Result<(), btleplug::Error>> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = cleanup.await {
                    warn!("{what} after cancelled connect failed: {e}");
                }
            });
        }
        Err(_) => warn!("{what} skipped, no runtime"),
    }
}

/// Stops the scan it started, even if the owner is cancelled
struct ScanGuard {
    adapter: Option<Adapter>,
}

impl ScanGuard {
    async fn start(adapter: &Adapter) -> Result<Self, TransportError> {
        adapter.start_scan(ScanFilter::default()).await?;
        Ok(Self { adapter: Some(adapter.clone()) })
    }

    async fn stop(mut self) -> Result<(), TransportError> {
        match self.adapter.take() {
            Some(adapter) => Ok(adapter.stop_scan().await?),
            None => Ok(()),
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if let Some(adapter) = self.adapter.take() {
            spawn_cleanup("stop_scan", async move { adapter.stop_scan().await });
        }
    }
}

/// Disconnects a peripheral whose connect never completed
struct PendingConnect {
    peripheral: Option<Peripheral>,
}

impl PendingConnect {
    fn disarm(mut self) {
        self.peripheral = None;
    }
}

impl Drop for PendingConnect {
    fn drop(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            spawn_cleanup("disconnect", async move { peripheral.disconnect().await });
        }
    }
}

async fn lookup(
    adapter: &Adapter,
    events: &mut (impl Stream<Item = CentralEvent> + Unpin),
    address: &str,
) -> Result<Peripheral, TransportError> {
    // Already known from an earlier scan
    for peripheral in adapter.peripherals().await? {
        if matches_address(&peripheral, address) {
            return Ok(peripheral);
        }
    }

    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) = event {
            let peripheral = adapter.peripheral(&id).await?;
            if matches_address(&peripheral, address) {
                return Ok(peripheral);
            }
        }
    }
    Err(TransportError::DeviceNotFound(address.to_string()))
}

/// Scan until a peripheral with `address` shows up. Runs until the adapter
/// stops reporting events, so callers bound it with a timeout.
async fn find_peripheral(adapter: &Adapter, address: &str) -> Result<Peripheral, TransportError> {
    let mut events = adapter.events().await?;
    let scan = ScanGuard::start(adapter).await?;
    let found = lookup(adapter, &mut events, address).await;
    scan.stop().await?;
    found
}

/// A connected lamp
pub struct BleConnection {
    peripheral: Peripheral,
}

/// [`Transport`] over the platform Bluetooth stack
#[derive(Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Use the first adapter the platform reports
    pub async fn new() -> Result<Self, TransportError> {
        Ok(Self { adapter: get_adapter().await? })
    }
}

impl Transport for BtleplugTransport {
    type Connection = BleConnection;

    async fn connect(&self, address: &str) -> Result<BleConnection, TransportError> {
        let peripheral = find_peripheral(&self.adapter, address).await?;

        let pending = PendingConnect { peripheral: Some(peripheral.clone()) };
        peripheral.connect().await?;
        pending.disarm();

        info!(%address, "connected");
        Ok(BleConnection { peripheral })
    }

    async fn discover(&self, conn: &BleConnection) -> Result<(), TransportError> {
        conn.peripheral.discover_services().await?;
        debug!(address = %conn.peripheral.address(), "services discovered");
        Ok(())
    }

    async fn write(
        &self,
        conn: &BleConnection,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let characteristics = conn.peripheral.characteristics();
        let target = characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))?;

        let write_type = if target.properties.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        debug!(%characteristic, ?write_type, len = payload.len(), "write");
        conn.peripheral.write(target, payload, write_type).await?;
        Ok(())
    }

    async fn close(&self, conn: BleConnection) -> Result<(), TransportError> {
        conn.peripheral.disconnect().await?;
        info!(address = %conn.peripheral.address(), "disconnected");
        Ok(())
    }
}
