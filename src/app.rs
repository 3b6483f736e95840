//! Core application runner (business logic) for `temphum-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit
//! codes so it can be tested deterministically.

use crate::aggregate::AggregationParams;
use crate::config::{CalibrationSpec, DeviceSpec, assemble_devices};
use crate::output::ReportFormatter;
use crate::output::influxdb::InfluxDbFormatter;
use crate::registry::DeviceRegistry;
use crate::report::Outputs;
use crate::scanner::{Backend, Scan, ScanError};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, default_value = "temphum_measurement")]
    pub influxdb_measurement: String,

    /// Track a Moat thermometer.
    /// Format: --moat DE:AD:BE:EF:00:00=Cellar (name optional)
    #[arg(long = "moat", value_parser = crate::config::parse_device, value_name = "MAC[=NAME]")]
    pub moat: Vec<DeviceSpec>,

    /// Track a Govee thermometer.
    /// Format: --govee DE:AD:BE:EF:00:00=Cellar (name optional)
    #[arg(long = "govee", value_parser = crate::config::parse_device, value_name = "MAC[=NAME]")]
    pub govee: Vec<DeviceSpec>,

    /// Temperature calibration offset for one device, applied after unit
    /// conversion. Format: --calibrate-temperature DE:AD:BE:EF:00:00=-0.7
    #[arg(long, value_parser = crate::config::parse_calibration, value_name = "MAC=OFFSET")]
    pub calibrate_temperature: Vec<CalibrationSpec>,

    /// Humidity calibration offset for one device.
    /// Format: --calibrate-humidity DE:AD:BE:EF:00:00=3.0
    #[arg(long, value_parser = crate::config::parse_calibration, value_name = "MAC=OFFSET")]
    pub calibrate_humidity: Vec<CalibrationSpec>,

    /// Reporting period. Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::config::parse_duration, default_value = "60s")]
    pub period: Duration,

    /// Report temperatures in Fahrenheit.
    #[arg(long)]
    pub fahrenheit: bool,

    /// Decimal places for rounded values.
    #[arg(long, default_value_t = 2)]
    pub decimals: u32,

    /// Disable rounding of reported values.
    #[arg(long)]
    pub no_rounding: bool,

    /// Report the per-period median instead of the mean.
    #[arg(long)]
    pub median: bool,

    /// Do not log out-of-range readings.
    #[arg(long)]
    pub no_log_spikes: bool,

    /// Suppress the output line for devices not heard from all period.
    #[arg(long)]
    pub skip_unavailable: bool,

    /// Lowest plausible temperature in Celsius; readings below are dropped.
    #[arg(long, default_value_t = -45.0, allow_hyphen_values = true)]
    pub temp_min: f64,

    /// Highest plausible temperature in Celsius; readings above are dropped.
    #[arg(long, default_value_t = 70.0)]
    pub temp_max: f64,

    /// Include battery fields in the output.
    #[arg(long)]
    pub battery: bool,

    /// Include the averaged RSSI in the output.
    #[arg(long)]
    pub rssi: bool,

    /// Omit temperature fields from the output.
    #[arg(long)]
    pub no_temperature: bool,

    /// Omit humidity fields from the output.
    #[arg(long)]
    pub no_humidity: bool,

    /// Bluetooth scanner backend to use
    #[arg(long, default_value_t, value_enum)]
    pub backend: Backend,

    /// HCI adapter index to scan on (0 for hci0).
    #[arg(long, default_value_t = 0)]
    pub adapter: u16,
}

impl Options {
    fn aggregation_params(&self) -> AggregationParams {
        AggregationParams {
            report_fahrenheit: self.fahrenheit,
            decimal_places: (!self.no_rounding).then_some(self.decimals),
            log_spikes: !self.no_log_spikes,
            temp_range_min: self.temp_min,
            temp_range_max: self.temp_max,
            calibrate_temperature: 0.0,
            calibrate_humidity: 0.0,
        }
    }

    fn outputs(&self) -> Outputs {
        Outputs {
            temperature: !self.no_temperature,
            humidity: !self.no_humidity,
            battery: self.battery,
            rssi: self.rssi,
        }
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
        backend: Backend,
        adapter: u16,
    ) -> Pin<Box<dyn Future<Output = Result<Scan, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
        backend: Backend,
        adapter: u16,
    ) -> Pin<Box<dyn Future<Output = Result<Scan, ScanError>> + Send + '_>> {
        Box::pin(async move { crate::scanner::start_scan(backend, adapter).await })
    }
}

fn flush_reports(
    registry: &DeviceRegistry,
    formatter: &dyn ReportFormatter,
    out: &mut dyn Write,
) -> io::Result<()> {
    for report in registry.flush() {
        if let Some(line) = formatter.format(&report) {
            writeln!(out, "{line}")?;
        }
    }
    out.flush()
}

/// Run the core processing loop, writing formatted output to `out`.
///
/// Advertisements are folded into per-device aggregators as they arrive;
/// once per period the scan is re-armed and every device's reductions are
/// written out. When the advertisement stream closes, a final flush
/// captures whatever the last partial period collected.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    out: &mut dyn Write,
) -> Result<(), RunError> {
    let devices = assemble_devices(
        &options.moat,
        &options.govee,
        &options.calibrate_temperature,
        &options.calibrate_humidity,
    )?;
    let registry = DeviceRegistry::new(devices, &options.aggregation_params());
    let formatter = InfluxDbFormatter::new(
        options.influxdb_measurement.clone(),
        options.outputs(),
        options.median,
        !options.skip_unavailable,
    );

    let mut scan = scanner.start_scan(options.backend, options.adapter).await?;

    let mut interval = tokio::time::interval(options.period);
    // The first tick completes immediately; consume it so the first report
    // covers a full period.
    interval.tick().await;

    loop {
        tokio::select! {
            maybe_fields = scan.events.recv() => match maybe_fields {
                Some(fields) => registry.ingest(&fields),
                None => break,
            },
            _ = interval.tick() => {
                if let Err(e) = scan.control.restart() {
                    log::warn!("failed to restart scan: {e}");
                }
                flush_reports(&registry, &formatter, out)?;
            }
        }
    }

    flush_reports(&registry, &formatter, out)?;
    Ok(())
}
