//! Shared helpers for building synthetic advertising reports in tests.

use crate::gap::{AD_TYPE_FLAGS, AD_TYPE_MANUFACTURER_DATA};
use crate::mac_address::MacAddress;

pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Assemble a raw advertising report: header, address in wire (little-endian)
/// order, GAP records, trailing RSSI byte.
pub fn raw_frame(address: MacAddress, records: &[(u8, &[u8])], rssi: i8) -> Vec<u8> {
    let mut gap = Vec::new();
    for (gap_type, payload) in records {
        gap.push((payload.len() + 1) as u8);
        gap.push(*gap_type);
        gap.extend_from_slice(payload);
    }

    let mut addr_le = address.0;
    addr_le.reverse();

    let mut frame = vec![0x01, 0x00, 0x00];
    frame.extend_from_slice(&addr_le);
    frame.push(gap.len() as u8);
    frame.extend_from_slice(&gap);
    frame.push(rssi as u8);
    frame
}

/// A complete H5075-style report carrying the given packed 24-bit
/// temperature/humidity value and battery percentage.
pub fn gvh5075_frame(address: MacAddress, packet: u32, battery: u8, rssi: i8) -> Vec<u8> {
    let be = packet.to_be_bytes();
    let payload = [0x88, 0xEC, 0x00, be[1], be[2], be[3], battery, 0x00];
    raw_frame(
        address,
        &[
            (AD_TYPE_FLAGS, &[0x05]),
            (AD_TYPE_MANUFACTURER_DATA, &payload),
        ],
        rssi,
    )
}
