//! Per-period report data produced by flushing the device registry.

use crate::mac_address::MacAddress;
use std::time::SystemTime;

/// Which derived outputs to publish. Sample count is always published on
/// any emitted line and has no toggle here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outputs {
    pub temperature: bool,
    pub humidity: bool,
    pub battery: bool,
    pub rssi: bool,
}

impl Default for Outputs {
    fn default() -> Self {
        Outputs {
            temperature: true,
            humidity: true,
            battery: false,
            rssi: false,
        }
    }
}

/// Everything one device reduced to over one reporting period.
///
/// Mean and median are both captured; the formatter selects which one is
/// the primary value and exposes the other as an auxiliary field. `None`
/// means no accepted samples this period, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub address: MacAddress,
    pub name: String,
    pub model: Option<&'static str>,
    pub temperature_mean: Option<f64>,
    pub temperature_median: Option<f64>,
    pub humidity_mean: Option<f64>,
    pub humidity_median: Option<f64>,
    pub battery: Option<u8>,
    pub battery_millivolts: Option<u16>,
    pub rssi: Option<i16>,
    /// Decode attempts this period, including rejected spikes.
    pub samples: u32,
    pub raw_packet: Option<String>,
    pub timestamp: SystemTime,
}
