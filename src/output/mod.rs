//! Output formatters for per-period device reports.
//!
//! Currently supports InfluxDB line protocol, with extensibility for
//! future formats like JSON and CSV.

pub mod influxdb;

use crate::report::PeriodReport;

/// Trait for formatting period reports into output lines.
///
/// `None` means the formatter chose to suppress the line, e.g. a device
/// that went unheard all period when unavailable updates are disabled.
pub trait ReportFormatter: Send + Sync {
    fn format(&self, report: &PeriodReport) -> Option<String>;
}
