//! Registry of tracked devices, shared between the ingest and report flows.
//!
//! Each configured device owns one [`DeviceAggregator`] behind its own
//! mutex. Both `ingest` (arrival-driven) and `flush` (timer-driven) take
//! that lock for the whole operation, so a sample lands wholly in either
//! the pre-reset or the post-reset period and a report is never torn
//! between a cleared list and a stale counter. Nothing blocks while a lock
//! is held.

use crate::aggregate::{AggregationParams, DeviceAggregator, Sample};
use crate::config::DeviceConfig;
use crate::gap::AdFields;
use crate::mac_address::MacAddress;
use crate::report::PeriodReport;
use crate::vendor;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

struct TrackedDevice {
    config: DeviceConfig,
    aggregator: Mutex<DeviceAggregator>,
}

impl TrackedDevice {
    fn lock(&self) -> MutexGuard<'_, DeviceAggregator> {
        // A poisoned lock means a panic elsewhere mid-operation; the sample
        // lists are still internally consistent, so keep going.
        self.aggregator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Address-keyed map of tracked devices. Immutable after construction;
/// all mutability lives inside the per-device aggregator mutexes, so the
/// registry can be shared freely across tasks.
pub struct DeviceRegistry {
    devices: BTreeMap<MacAddress, TrackedDevice>,
}

impl DeviceRegistry {
    /// Build the registry from assembled device configurations. `base`
    /// carries the global aggregation settings; per-device calibration
    /// offsets come from each configuration.
    pub fn new(configs: Vec<DeviceConfig>, base: &AggregationParams) -> Self {
        let devices = configs
            .into_iter()
            .map(|config| {
                let params = AggregationParams {
                    calibrate_temperature: config.calibrate_temperature,
                    calibrate_humidity: config.calibrate_humidity,
                    ..base.clone()
                };
                let aggregator = Mutex::new(DeviceAggregator::new(config.address, params));
                (config.address, TrackedDevice { config, aggregator })
            })
            .collect();
        DeviceRegistry { devices }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Fold one advertisement into its device's aggregator. Advertisements
    /// from addresses outside the allow-list are ignored; recognized
    /// devices record RSSI even when the payload carried no measurement
    /// data.
    pub fn ingest(&self, fields: &AdFields) {
        let Some(device) = self.devices.get(&fields.address) else {
            log::trace!("ignoring advertisement from untracked {}", fields.address);
            return;
        };

        let reading = fields
            .payload
            .as_deref()
            .and_then(|payload| vendor::decode(device.config.brand, payload, fields.flags));

        let mut aggregator = device.lock();
        if let Some(reading) = &reading {
            log::debug!(
                "{}: {} read {:.2} degC {:.1}% battery {}%",
                fields.address,
                reading.model,
                reading.temperature,
                reading.humidity,
                reading.battery
            );
            aggregator.note_model(reading.model);
            aggregator.record(Sample::from(reading));
        }
        aggregator.record_signal(fields.rssi);
    }

    /// Capture one report per device and start the next period, atomically
    /// per device with respect to concurrent `ingest` calls.
    pub fn flush(&self) -> Vec<PeriodReport> {
        let timestamp = SystemTime::now();
        self.devices
            .values()
            .map(|device| {
                let mut aggregator = device.lock();
                let report = PeriodReport {
                    address: device.config.address,
                    name: device.config.display_name(),
                    model: aggregator.model(),
                    temperature_mean: aggregator.mean_temperature(),
                    temperature_median: aggregator.median_temperature(),
                    humidity_mean: aggregator.mean_humidity(),
                    humidity_median: aggregator.median_humidity(),
                    battery: aggregator.battery_percentage(),
                    battery_millivolts: aggregator.battery_millivolts(),
                    rssi: aggregator.average_rssi(),
                    samples: aggregator.num_measurements(),
                    raw_packet: aggregator.last_raw_data().map(String::from),
                    timestamp,
                };
                aggregator.reset();
                report
            })
            .collect()
    }
}
