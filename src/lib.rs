//! BLE listener for Moat and Govee thermometer/hygrometer advertisements.
//!
//! Listens for advertising packets from configured devices, decodes the
//! vendor-specific temperature, humidity, and battery payloads, and emits
//! per-device aggregates in InfluxDB line protocol once per reporting
//! period. Designed to feed a metrics pipeline through Telegraf's `execd`
//! input or similar.

pub mod aggregate;
pub mod app;
pub mod config;
pub mod gap;
pub mod mac_address;
pub mod output;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod vendor;

#[cfg(test)]
pub mod test_utils;

pub use mac_address::MacAddress;
