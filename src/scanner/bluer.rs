//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ exposes advertisement content as device properties rather than raw
//! GAP records, so the payload is reassembled here into the on-air byte
//! order (company/service ID in little-endian, then the data) and the GAP
//! Flags value is reported as unknown.

use super::{EVENT_CHANNEL_BUFFER_SIZE, Scan, ScanControl, ScanError};
use crate::gap::AdFields;
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use tokio::sync::mpsc;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
const MANUFACTURER_DATA_TYPE: u8 = 0xFF;

/// Leading payload bytes of the supported sensor families, used as monitor
/// patterns so bluetoothd only wakes us for plausible advertisers.
const PATTERN_LEADS: [[u8; 2]; 3] = [
    [0x88, 0xEC], // Govee H5051/H5072/H5074/H5075
    [0x01, 0x00], // Govee H5101/H5102
    [0x00, 0x10], // Moat S2
];

/// The monitor handle keeps the scan registered for as long as it lives;
/// there is nothing to re-arm, so restart is a no-op.
struct BluerControl;

impl ScanControl for BluerControl {
    fn restart(&self) -> Result<(), ScanError> {
        Ok(())
    }
}

/// Start scanning through the BlueZ daemon.
///
/// Registers an advertisement monitor on the given adapter and forwards
/// every matching device event through the returned channel. Runs until the
/// receiver is dropped.
pub async fn start_scan(adapter: u16) -> Result<Scan, ScanError> {
    let session = Session::new().await?;
    let adapter = session.adapter(&format!("hci{adapter}"))?;
    adapter.set_powered(true).await?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);

    let patterns = PATTERN_LEADS
        .iter()
        .map(|lead| Pattern {
            data_type: MANUFACTURER_DATA_TYPE,
            start_position: 0,
            content: lead.to_vec(),
        })
        .collect();

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(patterns),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            if let MonitorEvent::DeviceFound(device_id) = event {
                match process_device(&adapter, device_id.device).await {
                    Ok(fields) => {
                        if tx.send(fields).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => log::debug!("failed to read device {}: {e}", device_id.device),
                }
            }
        }
    });

    Ok(Scan {
        events: rx,
        control: Box::new(BluerControl),
    })
}

/// Read the advertisement-derived properties of a discovered device and
/// reassemble them into [`AdFields`].
async fn process_device(adapter: &Adapter, address: Address) -> Result<AdFields, ScanError> {
    let device = adapter.device(address)?;

    let rssi = device.rssi().await?;
    let name = device.name().await?;

    // Prefer manufacturer data; fall back to service data. Either way the
    // two-byte identifier is restored in front so the downstream layout
    // checks see the same bytes as on the raw-socket path.
    let mut payload = None;
    if let Some(data) = device.manufacturer_data().await? {
        payload = data.into_iter().next().map(|(id, bytes)| {
            let mut payload = id.to_le_bytes().to_vec();
            payload.extend_from_slice(&bytes);
            payload
        });
    }
    if payload.is_none()
        && let Some(data) = device.service_data().await?
    {
        payload = data.into_iter().next().map(|(uuid, bytes)| {
            // 16-bit service UUIDs live in bits 96..112 of the expanded
            // 128-bit form.
            let short = ((uuid.as_u128() >> 96) & 0xFFFF) as u16;
            let mut payload = short.to_le_bytes().to_vec();
            payload.extend_from_slice(&bytes);
            payload
        });
    }

    Ok(AdFields {
        address: address.into(),
        rssi,
        flags: None,
        name,
        payload,
    })
}
