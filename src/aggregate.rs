//! Per-device sample accumulation for one reporting period.
//!
//! A [`DeviceAggregator`] collects validated samples between reporting
//! ticks, rejects spikes outside the configured plausible ranges, and
//! reduces the accepted lists to mean/median values with unit conversion
//! and calibration applied at read time. `reset()` starts the next period.

use crate::mac_address::MacAddress;
use crate::vendor::SensorReading;

/// Fixed plausible bounds for relative humidity, in percent.
pub const HUMIDITY_MIN: f64 = 0.0;
pub const HUMIDITY_MAX: f64 = 99.9;

/// Immutable per-device aggregation configuration.
#[derive(Debug, Clone)]
pub struct AggregationParams {
    /// Report temperatures in Fahrenheit instead of Celsius.
    pub report_fahrenheit: bool,
    /// Decimal places for rounded output, or `None` for no rounding.
    pub decimal_places: Option<u32>,
    /// Log rejected out-of-range samples at warning level.
    pub log_spikes: bool,
    /// Accepted temperature range, always in Celsius.
    pub temp_range_min: f64,
    pub temp_range_max: f64,
    /// Calibration offsets, applied after unit conversion.
    pub calibrate_temperature: f64,
    pub calibrate_humidity: f64,
}

impl Default for AggregationParams {
    fn default() -> Self {
        AggregationParams {
            report_fahrenheit: false,
            decimal_places: Some(2),
            log_spikes: true,
            temp_range_min: -45.0,
            temp_range_max: 70.0,
            calibrate_temperature: 0.0,
            calibrate_humidity: 0.0,
        }
    }
}

/// One decode result offered to the aggregator. Each field is validated
/// independently; the raw packet identifier is kept regardless.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<u8>,
    pub battery_millivolts: Option<u16>,
    pub packet: String,
}

impl From<&SensorReading> for Sample {
    fn from(reading: &SensorReading) -> Self {
        Sample {
            temperature: Some(reading.temperature),
            humidity: Some(reading.humidity),
            battery: Some(reading.battery),
            battery_millivolts: reading.battery_millivolts,
            packet: reading.packet.to_string(),
        }
    }
}

/// Accumulates samples for one device over one reporting period.
///
/// Invariant: every value in a sample list satisfies that list's bound.
/// The detected model is a property of the hardware, not the period, and
/// survives `reset()`.
#[derive(Debug)]
pub struct DeviceAggregator {
    address: MacAddress,
    params: AggregationParams,
    num_measurements: u32,
    temperature: Vec<f64>,
    humidity: Vec<f64>,
    battery: Vec<u8>,
    battery_millivolts: Vec<u16>,
    rssi: Vec<i16>,
    last_raw_data: Option<String>,
    model: Option<&'static str>,
}

impl DeviceAggregator {
    pub fn new(address: MacAddress, params: AggregationParams) -> Self {
        DeviceAggregator {
            address,
            params,
            num_measurements: 0,
            temperature: Vec::new(),
            humidity: Vec::new(),
            battery: Vec::new(),
            battery_millivolts: Vec::new(),
            rssi: Vec::new(),
            last_raw_data: None,
            model: None,
        }
    }

    /// Record one decoded sample. Out-of-range fields are dropped from the
    /// period's reduction (optionally logged); the attempt counter and the
    /// raw packet identifier are updated unconditionally.
    pub fn record(&mut self, sample: Sample) {
        if let Some(value) = sample.temperature {
            // Validated in Celsius even when reporting Fahrenheit.
            if value >= self.params.temp_range_min && value <= self.params.temp_range_max {
                self.temperature.push(value);
            } else if self.params.log_spikes {
                log::warn!("Temperature spike: {} ({})", value, self.address);
            }
        }

        if let Some(value) = sample.humidity {
            if (HUMIDITY_MIN..=HUMIDITY_MAX).contains(&value) {
                self.humidity.push(value);
            } else if self.params.log_spikes {
                log::warn!("Humidity spike: {} ({})", value, self.address);
            }
        }

        if let Some(value) = sample.battery {
            if value <= 100 {
                self.battery.push(value);
            } else if self.params.log_spikes {
                log::warn!("Battery percentage spike: {} ({})", value, self.address);
            }
        }

        // No plausible-range knowledge for battery voltage; not all models
        // report it at all.
        if let Some(value) = sample.battery_millivolts {
            self.battery_millivolts.push(value);
        }

        self.last_raw_data = Some(sample.packet);
        self.num_measurements += 1;
    }

    /// Record a signal-strength observation. Valid RSSI values are strictly
    /// negative dBm; anything else is silently ignored.
    pub fn record_signal(&mut self, rssi: Option<i16>) {
        if let Some(value) = rssi
            && value < 0
        {
            self.rssi.push(value);
        }
    }

    /// Remember the detected hardware model.
    pub fn note_model(&mut self, model: &'static str) {
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&'static str> {
        self.model
    }

    /// Number of decode attempts this period, including rejected ones.
    pub fn num_measurements(&self) -> u32 {
        self.num_measurements
    }

    /// Last raw packet identifier seen this period, for diagnostics.
    pub fn last_raw_data(&self) -> Option<&str> {
        self.last_raw_data.as_deref()
    }

    pub fn mean_temperature(&self) -> Option<f64> {
        mean(&self.temperature).map(|v| self.finish_temperature(v))
    }

    pub fn median_temperature(&self) -> Option<f64> {
        median(&self.temperature).map(|v| self.finish_temperature(v))
    }

    pub fn mean_humidity(&self) -> Option<f64> {
        mean(&self.humidity).map(|v| self.finish_humidity(v))
    }

    pub fn median_humidity(&self) -> Option<f64> {
        median(&self.humidity).map(|v| self.finish_humidity(v))
    }

    pub fn battery_percentage(&self) -> Option<u8> {
        int_mean(&self.battery).map(|m| m.round() as u8)
    }

    pub fn battery_millivolts(&self) -> Option<u16> {
        int_mean(&self.battery_millivolts).map(|m| m.round() as u16)
    }

    pub fn average_rssi(&self) -> Option<i16> {
        int_mean(&self.rssi).map(|m| m.round() as i16)
    }

    /// Clear all period state. The caller captures counter and reductions
    /// first; the detected model is deliberately kept.
    pub fn reset(&mut self) {
        self.num_measurements = 0;
        self.temperature.clear();
        self.humidity.clear();
        self.battery.clear();
        self.battery_millivolts.clear();
        self.rssi.clear();
        self.last_raw_data = None;
    }

    /// Unit conversion, then calibration, then rounding - in that order.
    fn finish_temperature(&self, value: f64) -> f64 {
        let mut value = if self.params.report_fahrenheit {
            celsius_to_fahrenheit(value)
        } else {
            value
        };
        value += self.params.calibrate_temperature;
        round_to(value, self.params.decimal_places)
    }

    fn finish_humidity(&self, value: f64) -> f64 {
        round_to(value + self.params.calibrate_humidity, self.params.decimal_places)
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn round_to(value: f64, decimal_places: Option<u32>) -> f64 {
    match decimal_places {
        Some(places) => {
            let factor = 10f64.powi(places as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

fn int_mean<T: Copy + Into<f64>>(values: &[T]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().map(|&v| v.into()).sum::<f64>() / values.len() as f64)
    }
}
