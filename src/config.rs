//! Operator configuration: device allow-lists, calibration, durations.
//!
//! Devices are supplied per brand on the command line
//! (`--moat AA:BB:CC:DD:EE:FF=Cellar`), optionally with per-device
//! calibration offsets. All addresses are validated here, before any
//! scanning starts.

use crate::mac_address::MacAddress;
use crate::vendor::Brand;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// One `MAC[=Name]` entry from a brand allow-list argument.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub address: MacAddress,
    pub name: Option<String>,
}

/// Parse a device entry in the format "MAC" or "MAC=Name".
///
/// # Example
/// ```
/// use temphum_listener::config::parse_device;
///
/// let spec = parse_device("AA:BB:CC:DD:EE:FF=Cellar").unwrap();
/// assert_eq!(spec.name.as_deref(), Some("Cellar"));
/// ```
pub fn parse_device(src: &str) -> Result<DeviceSpec, String> {
    let (address, name) = match src.split_once('=') {
        Some((address, name)) => (address, Some(name.to_string())),
        None => (src, None),
    };
    let address = MacAddress::from_str(address.trim()).map_err(|e| e.to_string())?;
    Ok(DeviceSpec { address, name })
}

/// One `MAC=OFFSET` calibration entry.
#[derive(Debug, Clone)]
pub struct CalibrationSpec {
    pub address: MacAddress,
    pub offset: f64,
}

/// Parse a calibration entry in the format "MAC=OFFSET".
pub fn parse_calibration(src: &str) -> Result<CalibrationSpec, String> {
    let (address, offset) = src
        .split_once('=')
        .ok_or_else(|| "invalid calibration: expected format MAC=OFFSET".to_string())?;
    let address = MacAddress::from_str(address.trim()).map_err(|e| e.to_string())?;
    let offset: f64 = offset
        .trim()
        .parse()
        .map_err(|_| format!("invalid calibration offset: {}", offset))?;
    Ok(CalibrationSpec { address, offset })
}

/// A fully assembled device configuration, immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub address: MacAddress,
    pub name: Option<String>,
    pub brand: Brand,
    pub calibrate_temperature: f64,
    pub calibrate_humidity: f64,
}

impl DeviceConfig {
    /// Display name for output: the configured name, or the address.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.address.to_string(),
        }
    }
}

/// Configuration errors, surfaced at setup time before scanning begins.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("no devices configured; pass at least one --moat or --govee entry")]
    NoDevices,
    #[error("device {0} is listed more than once")]
    DuplicateDevice(MacAddress),
    #[error("calibration for {0} does not match any configured device")]
    UnknownCalibrationTarget(MacAddress),
}

/// Merge the per-brand allow-lists and calibration entries into the final
/// device configurations.
pub fn assemble_devices(
    moat: &[DeviceSpec],
    govee: &[DeviceSpec],
    calibrate_temperature: &[CalibrationSpec],
    calibrate_humidity: &[CalibrationSpec],
) -> Result<Vec<DeviceConfig>, ConfigError> {
    let mut devices: Vec<DeviceConfig> = Vec::new();
    let mut seen = HashSet::new();

    for (specs, brand) in [(moat, Brand::Moat), (govee, Brand::Govee)] {
        for spec in specs {
            if !seen.insert(spec.address) {
                return Err(ConfigError::DuplicateDevice(spec.address));
            }
            devices.push(DeviceConfig {
                address: spec.address,
                name: spec.name.clone(),
                brand,
                calibrate_temperature: 0.0,
                calibrate_humidity: 0.0,
            });
        }
    }

    if devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    for cal in calibrate_temperature {
        let device = devices
            .iter_mut()
            .find(|d| d.address == cal.address)
            .ok_or(ConfigError::UnknownCalibrationTarget(cal.address))?;
        device.calibrate_temperature = cal.offset;
    }
    for cal in calibrate_humidity {
        let device = devices
            .iter_mut()
            .find(|d| d.address == cal.address)
            .ok_or(ConfigError::UnknownCalibrationTarget(cal.address))?;
        device.calibrate_humidity = cal.offset;
    }

    Ok(devices)
}

/// Parse a duration from a human-readable string.
///
/// Supports the suffixes `ms`, `s`, `m`, and `h`; a bare number is taken as
/// seconds.
///
/// # Examples
/// ```
/// use temphum_listener::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return Ok(Duration::from_secs(minutes * 60));
    }

    if let Some(num) = src.strip_suffix('s') {
        let secs: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds: {}", num))?;
        return Ok(Duration::from_secs(secs));
    }

    let secs: u64 = src
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(last: u8) -> MacAddress {
        MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    fn spec(last: u8, name: Option<&str>) -> DeviceSpec {
        DeviceSpec {
            address: mac(last),
            name: name.map(String::from),
        }
    }

    #[test]
    fn test_parse_device_with_name() {
        let spec = parse_device("AA:BB:CC:DD:EE:FF=Living Room").unwrap();
        assert_eq!(spec.address, mac(0xFF));
        assert_eq!(spec.name.as_deref(), Some("Living Room"));
    }

    #[test]
    fn test_parse_device_without_name() {
        let spec = parse_device("aa:bb:cc:dd:ee:01").unwrap();
        assert_eq!(spec.address, mac(0x01));
        assert!(spec.name.is_none());
    }

    #[test]
    fn test_parse_device_invalid_mac() {
        assert!(parse_device("not-a-mac=Name").is_err());
    }

    #[test]
    fn test_parse_calibration() {
        let cal = parse_calibration("AA:BB:CC:DD:EE:FF=-1.5").unwrap();
        assert_eq!(cal.address, mac(0xFF));
        assert_eq!(cal.offset, -1.5);
    }

    #[test]
    fn test_parse_calibration_invalid() {
        assert!(parse_calibration("AA:BB:CC:DD:EE:FF").is_err());
        assert!(parse_calibration("AA:BB:CC:DD:EE:FF=abc").is_err());
    }

    #[test]
    fn test_assemble_devices() {
        let devices = assemble_devices(
            &[spec(0x01, Some("Cellar"))],
            &[spec(0x02, None)],
            &[CalibrationSpec {
                address: mac(0x01),
                offset: 0.5,
            }],
            &[],
        )
        .unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].brand, Brand::Moat);
        assert_eq!(devices[0].calibrate_temperature, 0.5);
        assert_eq!(devices[0].display_name(), "Cellar");
        assert_eq!(devices[1].brand, Brand::Govee);
        assert_eq!(devices[1].display_name(), "AA:BB:CC:DD:EE:02");
    }

    #[test]
    fn test_assemble_rejects_duplicates() {
        let result = assemble_devices(&[spec(0x01, None)], &[spec(0x01, None)], &[], &[]);
        assert_eq!(result.unwrap_err(), ConfigError::DuplicateDevice(mac(0x01)));
    }

    #[test]
    fn test_assemble_rejects_unknown_calibration_target() {
        let result = assemble_devices(
            &[spec(0x01, None)],
            &[],
            &[],
            &[CalibrationSpec {
                address: mac(0x09),
                offset: 1.0,
            }],
        );
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownCalibrationTarget(mac(0x09))
        );
    }

    #[test]
    fn test_assemble_rejects_empty_config() {
        assert_eq!(
            assemble_devices(&[], &[], &[], &[]).unwrap_err(),
            ConfigError::NoDevices
        );
    }

    #[test]
    fn test_parse_duration_suffixes() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
