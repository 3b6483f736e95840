//! GAP field scanner for raw BLE advertising reports.
//!
//! A raw report (as delivered by the HCI event stream, starting at the
//! num-reports byte) has a fixed header:
//!
//! - byte 0: number of reports (expected 1)
//! - byte 1: ADV type (ADV_IND or SCAN_RSP)
//! - byte 2: address type
//! - bytes 3..9: advertiser address, little-endian octet order
//! - byte 9: length of the GAP region
//! - bytes 10..len-1: GAP records, each `length, type, payload[length-1]`
//! - final byte: RSSI
//!
//! The walk advances by declared record length and never trusts a length
//! beyond the region bounds; a length that would run past the end stops the
//! scan rather than failing. A name record that is not ASCII invalidates the
//! whole advertisement (the measurement payload is discarded, address and
//! RSSI are kept).

use crate::mac_address::MacAddress;

/// GAP record type tags we recognize. Everything else is skipped by length.
pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_NAME_COMPLETE: u8 = 0x09;
pub const AD_TYPE_SERVICE_DATA: u8 = 0x16;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Flags value assumed when the advertisement carries no Flags record.
pub const DEFAULT_FLAGS: u8 = 0x06;

/// Offset of the first GAP record in a raw report.
const GAP_REGION_START: usize = 10;

/// Fields extracted from one advertisement, prior to vendor decoding.
///
/// `flags` is `None` only on backends that cannot observe the Flags record
/// (BlueZ exposes device properties, not raw records); raw frames always
/// yield `Some`, defaulting to [`DEFAULT_FLAGS`] when the record is absent.
/// `payload` holds the manufacturer or service data bytes; when both records
/// appear the later one in the sequence wins.
#[derive(Debug, Clone, PartialEq)]
pub struct AdFields {
    pub address: MacAddress,
    pub rssi: Option<i16>,
    pub flags: Option<u8>,
    pub name: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl AdFields {
    /// Scan a raw advertising report.
    ///
    /// Returns `None` when the buffer is too short to carry an address.
    /// Any malformed content past the header degrades to an `AdFields` with
    /// no payload; it is a recognized "not a supported advertisement"
    /// outcome, not an error.
    pub fn from_frame(data: &[u8]) -> Option<AdFields> {
        if data.len() < 9 {
            return None;
        }

        let mut addr = [0u8; 6];
        addr.copy_from_slice(&data[3..9]);
        let address = MacAddress::from_le_bytes(addr);
        let rssi = Some(i16::from(data[data.len() - 1] as i8));

        let mut flags = DEFAULT_FLAGS;
        let mut name = None;
        let mut payload = None;

        // The GAP region ends just before the trailing RSSI byte.
        let end = data.len() - 1;
        let mut pos = GAP_REGION_START;
        while pos + 1 < end {
            let length = data[pos] as usize;
            if length == 0 {
                break;
            }
            let record_end = pos + 1 + length;
            if record_end > end {
                // Declared length runs past the GAP region; defensive stop.
                break;
            }
            let gap_type = data[pos + 1];
            let record = &data[pos + 2..record_end];
            log::trace!(
                "gap record pos={} type={:02x} len={} for {}",
                pos,
                gap_type,
                length,
                address
            );

            match gap_type {
                AD_TYPE_FLAGS => {
                    if let Some(&value) = record.first() {
                        flags = value;
                    }
                }
                AD_TYPE_NAME_COMPLETE => match std::str::from_utf8(record) {
                    Ok(s) if s.is_ascii() => name = Some(s.to_owned()),
                    _ => {
                        // Undecodable name invalidates the whole parse.
                        return Some(AdFields {
                            address,
                            rssi,
                            flags: Some(DEFAULT_FLAGS),
                            name: None,
                            payload: None,
                        });
                    }
                },
                AD_TYPE_SERVICE_DATA | AD_TYPE_MANUFACTURER_DATA => {
                    payload = Some(record.to_vec());
                }
                _ => {}
            }

            pos += length + 1;
        }

        Some(AdFields {
            address,
            rssi,
            flags: Some(flags),
            name,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_MAC, raw_frame};

    #[test]
    fn test_full_frame() {
        let frame = raw_frame(
            TEST_MAC,
            &[
                (AD_TYPE_FLAGS, &[0x05]),
                (AD_TYPE_NAME_COMPLETE, b"GVH5075_AABB"),
                (AD_TYPE_MANUFACTURER_DATA, &[0x88, 0xEC, 0x00, 0x02, 0x5D, 0x14, 0x64, 0x00]),
            ],
            -61,
        );

        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.address, TEST_MAC);
        assert_eq!(fields.rssi, Some(-61));
        assert_eq!(fields.flags, Some(0x05));
        assert_eq!(fields.name.as_deref(), Some("GVH5075_AABB"));
        assert_eq!(
            fields.payload.as_deref(),
            Some(&[0x88, 0xEC, 0x00, 0x02, 0x5D, 0x14, 0x64, 0x00][..])
        );
    }

    #[test]
    fn test_flags_default_when_absent() {
        let frame = raw_frame(TEST_MAC, &[(AD_TYPE_MANUFACTURER_DATA, &[0x00, 0x10])], -50);
        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.flags, Some(DEFAULT_FLAGS));
    }

    #[test]
    fn test_unknown_tags_are_skipped() {
        let frame = raw_frame(
            TEST_MAC,
            &[
                (0x0A, &[0x04]), // TX power, not of interest
                (AD_TYPE_FLAGS, &[0x06]),
            ],
            -50,
        );
        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.flags, Some(0x06));
        assert!(fields.payload.is_none());
    }

    #[test]
    fn test_later_payload_record_wins() {
        let frame = raw_frame(
            TEST_MAC,
            &[
                (AD_TYPE_SERVICE_DATA, &[0x01, 0x02]),
                (AD_TYPE_MANUFACTURER_DATA, &[0x03, 0x04]),
            ],
            -50,
        );
        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.payload.as_deref(), Some(&[0x03, 0x04][..]));
    }

    #[test]
    fn test_overlong_record_stops_scan() {
        let mut frame = raw_frame(TEST_MAC, &[(AD_TYPE_FLAGS, &[0x05])], -50);
        // Corrupt the record length so it claims to run past the buffer.
        frame[10] = 0x7F;
        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.address, TEST_MAC);
        assert_eq!(fields.rssi, Some(-50));
        assert_eq!(fields.flags, Some(DEFAULT_FLAGS));
        assert!(fields.payload.is_none());
    }

    #[test]
    fn test_truncated_frame_keeps_address_and_rssi() {
        // Header only, no GAP region at all.
        let frame = raw_frame(TEST_MAC, &[], -42);
        let truncated = &frame[..frame.len() - 1];
        let fields = AdFields::from_frame(truncated).unwrap();
        assert_eq!(fields.address, TEST_MAC);
        assert!(fields.payload.is_none());
        assert!(fields.name.is_none());
    }

    #[test]
    fn test_too_short_for_address() {
        assert!(AdFields::from_frame(&[0x01, 0x00, 0x00, 0xAA, 0xBB]).is_none());
    }

    #[test]
    fn test_non_ascii_name_discards_payload() {
        let frame = raw_frame(
            TEST_MAC,
            &[
                (AD_TYPE_MANUFACTURER_DATA, &[0x88, 0xEC, 0x00]),
                (AD_TYPE_NAME_COMPLETE, &[0xC3, 0x28]), // invalid UTF-8
            ],
            -50,
        );
        let fields = AdFields::from_frame(&frame).unwrap();
        assert!(fields.name.is_none());
        assert!(fields.payload.is_none());
        assert_eq!(fields.rssi, Some(-50));
    }

    #[test]
    fn test_zero_length_record_stops_scan() {
        let mut frame = raw_frame(TEST_MAC, &[(AD_TYPE_FLAGS, &[0x05])], -50);
        frame[10] = 0x00;
        let fields = AdFields::from_frame(&frame).unwrap();
        assert_eq!(fields.flags, Some(DEFAULT_FLAGS));
    }
}
