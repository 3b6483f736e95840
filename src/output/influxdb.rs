//! InfluxDB line protocol output formatter.

use crate::output::ReportFormatter;
use crate::report::{Outputs, PeriodReport};
use std::collections::BTreeMap;
use std::fmt;
#[cfg(test)]
use std::time::Duration;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
            FieldValue::String(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Tag keys and values must escape commas, equals signs, and spaces.
fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", key, escape_tag_value(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", key, value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    if let Some(time) = data_point.timestamp {
        let nanos = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        write!(fmt, " {}", nanos)?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// InfluxDB line protocol formatter for period reports.
///
/// Emits one line per device per period, tagged with the MAC address and
/// the configured device name. The `samples` field is always present, so
/// an emitted line never has an empty field set.
pub struct InfluxDbFormatter {
    /// The measurement name in InfluxDB
    measurement_name: String,
    outputs: Outputs,
    /// Publish the median as the primary value instead of the mean.
    use_median: bool,
    /// Emit a line even when no advertisement was decoded all period.
    update_when_unavailable: bool,
}

impl InfluxDbFormatter {
    pub fn new(
        measurement_name: String,
        outputs: Outputs,
        use_median: bool,
        update_when_unavailable: bool,
    ) -> Self {
        Self {
            measurement_name,
            outputs,
            use_median,
            update_when_unavailable,
        }
    }

    fn tag_set(&self, report: &PeriodReport) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("mac".to_string(), report.address.to_string());
        tags.insert("name".to_string(), report.name.clone());
        tags
    }

    /// Build the field set. The selected reduction becomes the plain
    /// `temperature`/`humidity` field; the other reduction is kept as an
    /// auxiliary field named for what it is.
    fn field_set(&self, report: &PeriodReport) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();

        macro_rules! add_float {
            ($name:expr, $val:expr) => {
                if let Some(v) = $val {
                    fields.insert($name.into(), FieldValue::Float(v));
                }
            };
        }

        if self.outputs.temperature {
            if self.use_median {
                add_float!("temperature", report.temperature_median);
                add_float!("temperature_mean", report.temperature_mean);
            } else {
                add_float!("temperature", report.temperature_mean);
                add_float!("temperature_median", report.temperature_median);
            }
        }
        if self.outputs.humidity {
            if self.use_median {
                add_float!("humidity", report.humidity_median);
                add_float!("humidity_mean", report.humidity_mean);
            } else {
                add_float!("humidity", report.humidity_mean);
                add_float!("humidity_median", report.humidity_median);
            }
        }
        if self.outputs.battery {
            if let Some(v) = report.battery {
                fields.insert("battery".into(), FieldValue::Integer(i64::from(v)));
            }
            if let Some(v) = report.battery_millivolts {
                fields.insert(
                    "battery_millivolts".into(),
                    FieldValue::Integer(i64::from(v)),
                );
            }
        }
        if self.outputs.rssi
            && let Some(v) = report.rssi
        {
            fields.insert("rssi".into(), FieldValue::Integer(i64::from(v)));
        }

        if let Some(model) = report.model {
            fields.insert("model".into(), FieldValue::String(model.to_string()));
        }
        if let Some(packet) = &report.raw_packet {
            fields.insert("raw_packet".into(), FieldValue::String(packet.clone()));
        }
        fields.insert(
            "samples".into(),
            FieldValue::Integer(i64::from(report.samples)),
        );

        fields
    }

    fn to_data_point(&self, report: &PeriodReport) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(report),
            field_set: self.field_set(report),
            timestamp: Some(report.timestamp),
        }
    }
}

impl ReportFormatter for InfluxDbFormatter {
    fn format(&self, report: &PeriodReport) -> Option<String> {
        if !self.update_when_unavailable && report.raw_packet.is_none() {
            return None;
        }
        Some(format!("{}", self.to_data_point(report)))
    }
}
