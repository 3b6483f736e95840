//! Vendor format detection and decoding for Moat and Govee payloads.
//!
//! Each supported model has an entry in [`FORMATS`]: a pure predicate over
//! (payload, flags) and a decoder. Entries are evaluated in priority order
//! because shapes can be ambiguous by length alone; the length-only Govee
//! matches sit last so they cannot shadow more specific entries. The brand
//! hint comes from which configured allow-list the advertiser matched, never
//! from sniffing the payload.

use std::fmt;

/// Sensor family, as configured by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Brand {
    Moat,
    Govee,
}

/// Opaque raw-packet identifier, kept for diagnostics only.
///
/// Moat and H5074-family packets are reported as hex strings, the packed
/// Govee formats as the raw 24-bit integer, matching what each device
/// family actually puts on the air.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPacket {
    Hex(String),
    Value(u32),
}

impl fmt::Display for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawPacket::Hex(s) => write!(f, "{s}"),
            RawPacket::Value(v) => write!(f, "{v}"),
        }
    }
}

/// One fully decoded measurement set.
///
/// Fields are all-or-nothing per decode attempt: either the payload matched
/// a known layout and every field is populated from it, or no reading is
/// produced at all. Only battery millivolts is optional, since not all
/// hardware reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub model: &'static str,
    /// Temperature in °C, unconverted and uncalibrated.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Battery level as a percentage estimate.
    pub battery: u8,
    /// Battery voltage in millivolts (Moat only).
    pub battery_millivolts: Option<u16>,
    pub packet: RawPacket,
}

type Predicate = fn(&[u8], Option<u8>) -> bool;
type Decoder = fn(&[u8]) -> Option<SensorReading>;

struct VendorFormat {
    brand: Brand,
    matches: Predicate,
    decode: Decoder,
}

/// Known payload layouts, in match-precedence order.
const FORMATS: &[VendorFormat] = &[
    VendorFormat {
        brand: Brand::Moat,
        matches: is_moat_s2,
        decode: decode_moat_s2,
    },
    VendorFormat {
        brand: Brand::Govee,
        matches: is_gvh5075,
        decode: decode_gvh5075,
    },
    VendorFormat {
        brand: Brand::Govee,
        matches: is_gvh5102,
        decode: decode_gvh5102,
    },
    VendorFormat {
        brand: Brand::Govee,
        matches: is_gvh5074,
        decode: decode_gvh5074_family,
    },
    VendorFormat {
        brand: Brand::Govee,
        matches: is_gvh5051,
        decode: decode_gvh5074_family,
    },
];

/// Try to decode a manufacturer/service payload against the known layouts
/// for the given brand. `None` means "not a supported payload", which is an
/// expected outcome for many advertisements, not an error.
///
/// `flags` is the GAP Flags value where known; backends that cannot observe
/// it pass `None` and the flags check is skipped.
pub fn decode(brand: Brand, payload: &[u8], flags: Option<u8>) -> Option<SensorReading> {
    FORMATS
        .iter()
        .filter(|format| format.brand == brand)
        .find(|format| (format.matches)(payload, flags))
        .and_then(|format| (format.decode)(payload))
}

fn shape_matches(payload: &[u8], flags: Option<u8>, length: usize, expected_flags: u8) -> bool {
    payload.len() == length && flags.is_none_or(|f| f == expected_flags)
}

fn leading_bytes_match(payload: &[u8], lead: [u8; 2]) -> bool {
    payload.len() > 2 && payload[0..2] == lead
}

fn is_moat_s2(payload: &[u8], flags: Option<u8>) -> bool {
    shape_matches(payload, flags, 20, 6) && leading_bytes_match(payload, [0x00, 0x10])
}

fn is_gvh5075(payload: &[u8], flags: Option<u8>) -> bool {
    shape_matches(payload, flags, 8, 5) && leading_bytes_match(payload, [0x88, 0xEC])
}

fn is_gvh5102(payload: &[u8], flags: Option<u8>) -> bool {
    shape_matches(payload, flags, 8, 5) && leading_bytes_match(payload, [0x01, 0x00])
}

fn is_gvh5074(payload: &[u8], flags: Option<u8>) -> bool {
    shape_matches(payload, flags, 9, 6)
}

fn is_gvh5051(payload: &[u8], flags: Option<u8>) -> bool {
    shape_matches(payload, flags, 11, 6)
}

fn u16_le(bytes: &[u8]) -> Option<u16> {
    Some(u16::from_le_bytes([*bytes.first()?, *bytes.get(1)?]))
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Clamped linear interpolation from `[in_min, in_max]` to `[out_min, out_max]`.
fn rescale_clamped(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    if value >= in_max {
        out_max
    } else if value <= in_min {
        out_min
    } else {
        out_min + (out_max - out_min) * (value - in_min) / (in_max - in_min)
    }
}

/// Battery voltage to percentage for the Moat S2.
///
/// A crude approximation: the real curve is nonlinear and
/// temperature-dependent, but it tracks well enough near end of life.
fn moat_s2_battery_percentage(millivolts: u16) -> f64 {
    rescale_clamped(f64::from(millivolts), 2760.0, 2820.0, 1.0, 100.0)
}

/// Decode the packed 24-bit Govee temperature field.
///
/// The value jams temperature*10 and humidity*10 into one base-10 integer;
/// the last three decimal digits are the humidity, masked out here with an
/// integer divide. Negative temperatures set bit 0x800000 rather than using
/// two's complement, distinct from the 16-bit scheme of the H5074 family.
pub fn decode_govee_temp(packet: u32) -> f64 {
    if packet & 0x80_0000 != 0 {
        -(f64::from((packet ^ 0x80_0000) / 1000) / 10.0)
    } else {
        f64::from(packet / 1000) / 10.0
    }
}

fn decode_moat_s2(payload: &[u8]) -> Option<SensorReading> {
    // Field layout provided by the Moat developer. Bytes 8..12 are a device
    // timestamp, unused here.
    let temperature_raw = u16_le(payload.get(12..14)?)?;
    let humidity_raw = u16_le(payload.get(14..16)?)?;
    let millivolts = u16_le(payload.get(16..18)?)?;
    Some(SensorReading {
        model: "Moat S2",
        temperature: -46.85 + 175.72 * (f64::from(temperature_raw) / 65536.0),
        humidity: -6.0 + 125.0 * (f64::from(humidity_raw) / 65536.0),
        battery: moat_s2_battery_percentage(millivolts) as u8,
        battery_millivolts: Some(millivolts),
        packet: RawPacket::Hex(hex_string(payload.get(8..18)?)),
    })
}

fn decode_gvh5075(payload: &[u8]) -> Option<SensorReading> {
    decode_govee_packed(payload, 3, "Govee H5072/H5075")
}

fn decode_gvh5102(payload: &[u8]) -> Option<SensorReading> {
    decode_govee_packed(payload, 4, "Govee H5101/H5102")
}

fn decode_govee_packed(payload: &[u8], offset: usize, model: &'static str) -> Option<SensorReading> {
    let raw = payload.get(offset..offset + 3)?;
    let packet = u32::from(raw[0]) << 16 | u32::from(raw[1]) << 8 | u32::from(raw[2]);
    let battery = *payload.get(offset + 3)?;
    Some(SensorReading {
        model,
        temperature: decode_govee_temp(packet),
        humidity: f64::from(packet % 1000) / 10.0,
        battery,
        battery_millivolts: None,
        packet: RawPacket::Value(packet),
    })
}

fn decode_gvh5074_family(payload: &[u8]) -> Option<SensorReading> {
    let raw = payload.get(3..7)?;
    let temperature_raw = u16::from_le_bytes([raw[0], raw[1]]);
    let humidity_raw = u16::from_le_bytes([raw[2], raw[3]]);
    let battery = *payload.get(7)?;
    Some(SensorReading {
        model: "Govee H5074/H5051",
        // Sixteen-bit two's complement here, unlike the packed formats.
        temperature: f64::from(temperature_raw as i16) / 100.0,
        humidity: f64::from(humidity_raw) / 100.0,
        battery,
        battery_millivolts: None,
        packet: RawPacket::Hex(format!("{temperature_raw:04x}{humidity_raw:04x}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn moat_payload(temp_raw: u16, hum_raw: u16, millivolts: u16) -> Vec<u8> {
        let mut payload = vec![0x00, 0x10, 0, 0, 0, 0, 0, 0];
        payload.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]); // timestamp
        payload.extend_from_slice(&temp_raw.to_le_bytes());
        payload.extend_from_slice(&hum_raw.to_le_bytes());
        payload.extend_from_slice(&millivolts.to_le_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        assert_eq!(payload.len(), 20);
        payload
    }

    /// Build a packed 24-bit Govee value from signed deci-degrees and
    /// deci-percent humidity.
    fn encode_govee_packed(temp_decidegrees: i32, humidity_decipercent: u32) -> u32 {
        let magnitude = temp_decidegrees.unsigned_abs() * 1000 + humidity_decipercent;
        if temp_decidegrees < 0 {
            magnitude | 0x80_0000
        } else {
            magnitude
        }
    }

    #[test]
    fn test_moat_s2_decode() {
        // u16LE fields 0x1234 (temp), 0x2345 (humidity), 2736 mV.
        let payload = moat_payload(0x1234, 0x2345, 2736);
        let reading = decode(Brand::Moat, &payload, Some(6)).unwrap();

        let expected_temp = -46.85 + 175.72 * (f64::from(0x1234u16) / 65536.0);
        let expected_hum = -6.0 + 125.0 * (f64::from(0x2345u16) / 65536.0);
        assert!((reading.temperature - expected_temp).abs() < EPSILON);
        assert!((reading.humidity - expected_hum).abs() < EPSILON);
        assert_eq!(reading.battery_millivolts, Some(2736));
        // 2736 mV is below the 2760 mV floor, so the estimate clamps to 1%.
        assert_eq!(reading.battery, 1);
        assert_eq!(reading.model, "Moat S2");
        // Bytes 8..18: timestamp 01020304, then the three u16LE fields.
        assert_eq!(reading.packet, RawPacket::Hex("0102030434124523b00a".into()));
    }

    #[test]
    fn test_moat_s2_battery_rescale() {
        assert_eq!(moat_s2_battery_percentage(2700), 1.0);
        assert_eq!(moat_s2_battery_percentage(2760), 1.0);
        assert_eq!(moat_s2_battery_percentage(2820), 100.0);
        assert_eq!(moat_s2_battery_percentage(3000), 100.0);
        let midpoint = moat_s2_battery_percentage(2790);
        assert!((midpoint - 50.5).abs() < EPSILON);
    }

    #[test]
    fn test_gvh5075_decode() {
        // Packed field 0x025D14 = 154900 -> 15.4 degC, 90.0 %.
        let payload = vec![0x88, 0xEC, 0x00, 0x02, 0x5D, 0x14, 0x64, 0x00];
        let reading = decode(Brand::Govee, &payload, Some(5)).unwrap();
        assert!((reading.temperature - 15.4).abs() < EPSILON);
        assert!((reading.humidity - 90.0).abs() < EPSILON);
        assert_eq!(reading.battery, 100);
        assert_eq!(reading.battery_millivolts, None);
        assert_eq!(reading.model, "Govee H5072/H5075");
        assert_eq!(reading.packet, RawPacket::Value(154_900));
    }

    #[test]
    fn test_gvh5102_decode() {
        let packed = encode_govee_packed(231, 455); // 23.1 degC, 45.5 %
        let bytes = packed.to_be_bytes();
        let payload = vec![0x01, 0x00, 0x01, 0x01, bytes[1], bytes[2], bytes[3], 0x5A];
        let reading = decode(Brand::Govee, &payload, Some(5)).unwrap();
        assert!((reading.temperature - 23.1).abs() < EPSILON);
        assert!((reading.humidity - 45.5).abs() < EPSILON);
        assert_eq!(reading.battery, 0x5A);
        assert_eq!(reading.model, "Govee H5101/H5102");
    }

    #[test]
    fn test_govee_packed_negative_temperature() {
        let packed = encode_govee_packed(-101, 455); // -10.1 degC, 45.5 %
        assert!(packed & 0x80_0000 != 0);
        assert!((decode_govee_temp(packed) + 10.1).abs() < EPSILON);
    }

    #[test]
    fn test_govee_packed_round_trip() {
        for temp in [-400, -101, -1, 0, 1, 154, 600] {
            for humidity in [0, 455, 900, 999] {
                let packet = encode_govee_packed(temp, humidity);
                let decoded_temp = decode_govee_temp(packet);
                assert!(
                    (decoded_temp - f64::from(temp) / 10.0).abs() < EPSILON,
                    "temp {temp} decoded as {decoded_temp}"
                );
                if temp < 0 {
                    assert!(decoded_temp < 0.0);
                }
                assert!(
                    (f64::from(packet % 1000) / 10.0 - f64::from(humidity) / 10.0).abs() < EPSILON
                );
            }
        }
    }

    #[test]
    fn test_gvh5074_decode_negative_temperature() {
        let temp_raw = (-1021i16) as u16; // -10.21 degC
        let hum_raw = 4550u16; // 45.50 %
        let mut payload = vec![0x01, 0x02, 0x03];
        payload.extend_from_slice(&temp_raw.to_le_bytes());
        payload.extend_from_slice(&hum_raw.to_le_bytes());
        payload.push(0x62);
        payload.push(0x00);
        assert_eq!(payload.len(), 9);

        let reading = decode(Brand::Govee, &payload, Some(6)).unwrap();
        assert!((reading.temperature + 10.21).abs() < EPSILON);
        assert!((reading.humidity - 45.5).abs() < EPSILON);
        assert_eq!(reading.battery, 0x62);
        assert_eq!(reading.model, "Govee H5074/H5051");
        assert_eq!(reading.packet, RawPacket::Hex("fc0311c6".into()));
    }

    #[test]
    fn test_gvh5051_length_only_match() {
        let mut payload = vec![0x01, 0x02, 0x03];
        payload.extend_from_slice(&1234u16.to_le_bytes());
        payload.extend_from_slice(&5678u16.to_le_bytes());
        payload.extend_from_slice(&[0x55, 0x00, 0x00, 0x00]);
        assert_eq!(payload.len(), 11);

        let reading = decode(Brand::Govee, &payload, Some(6)).unwrap();
        assert!((reading.temperature - 12.34).abs() < EPSILON);
        assert!((reading.humidity - 56.78).abs() < EPSILON);
    }

    #[test]
    fn test_no_match_wrong_flags() {
        let payload = moat_payload(0x1234, 0x2345, 2800);
        assert!(decode(Brand::Moat, &payload, Some(5)).is_none());
    }

    #[test]
    fn test_no_match_wrong_length() {
        let mut payload = moat_payload(0x1234, 0x2345, 2800);
        payload.push(0x00);
        assert!(decode(Brand::Moat, &payload, Some(6)).is_none());
    }

    #[test]
    fn test_no_match_wrong_leading_bytes() {
        let mut payload = moat_payload(0x1234, 0x2345, 2800);
        payload[0] = 0xFF;
        assert!(decode(Brand::Moat, &payload, Some(6)).is_none());
    }

    #[test]
    fn test_brand_hint_restricts_candidates() {
        // A valid Moat payload must not decode under the Govee hint.
        let payload = moat_payload(0x1234, 0x2345, 2800);
        assert!(decode(Brand::Govee, &payload, Some(6)).is_none());

        let govee = vec![0x88, 0xEC, 0x00, 0x02, 0x5D, 0x14, 0x64, 0x00];
        assert!(decode(Brand::Moat, &govee, Some(5)).is_none());
    }

    #[test]
    fn test_unknown_flags_match_as_wildcard() {
        let payload = vec![0x88, 0xEC, 0x00, 0x02, 0x5D, 0x14, 0x64, 0x00];
        assert!(decode(Brand::Govee, &payload, None).is_some());
    }

    #[test]
    fn test_empty_payload_does_not_panic() {
        assert!(decode(Brand::Moat, &[], Some(6)).is_none());
        assert!(decode(Brand::Govee, &[], Some(6)).is_none());
    }

    #[test]
    fn test_raw_packet_display() {
        assert_eq!(RawPacket::Hex("ab01".into()).to_string(), "ab01");
        assert_eq!(RawPacket::Value(154_900).to_string(), "154900");
    }
}
