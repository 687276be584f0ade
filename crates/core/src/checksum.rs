//! CRC-32 fingerprints for the `Content-Hash` request header.
//!
//! The fingerprint is only an optimization hint: origins compare it against
//! their current body and answer `204 No Content` when nothing changed. It is
//! never used to verify response integrity.

/// Header carrying the fingerprint of the locally cached payload.
pub const CHECKSUM_HEADER: &str = "Content-Hash";

/// Bytes fingerprinted when nothing is cached, so the header is always sent.
pub const EMPTY_PAYLOAD: &[u8] = b"null";

const POLYNOMIAL: u32 = 0xEDB8_8320;

const CRC_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 == 1 { POLYNOMIAL ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Compute the CRC-32 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> u32 {
    let crc = bytes
        .iter()
        .fold(u32::MAX, |crc, &b| (crc >> 8) ^ CRC_TABLE[((crc ^ u32::from(b)) & 0xFF) as usize]);
    crc ^ u32::MAX
}

/// Render the header value for an optional cached payload.
pub fn header_value(cached: Option<&[u8]>) -> String {
    fingerprint(cached.unwrap_or(EMPTY_PAYLOAD)).to_string()
}
