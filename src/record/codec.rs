//! # Record Codec
//!
//! Fixed-size binary layout of a `TelemetryRecord` on the storage medium.
//!
//! Fields are written in declaration order, little-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  pressure            u32
//!      4     4  reference_pressure  u32
//!      8     4  altitude            f32
//!     12     4  altitude_climbed    f32
//!     16     4  temperature         f32
//!     20     1  archived            0x00 / 0x01
//!     21     4  up_time             u32
//!     25     8  timestamp           i64 epoch seconds
//! ```

use std::io;

use super::TelemetryRecord;

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 33;

/// Encode a record into its on-medium representation
///
/// # Examples
///
/// ```
/// use altimeter_sync::record::TelemetryRecord;
/// use altimeter_sync::record::codec::{encode_record, RECORD_SIZE};
///
/// let record = TelemetryRecord::new(95_000, 101_325, 540.2, 0.0, 21.3, 60);
/// assert_eq!(encode_record(&record).len(), RECORD_SIZE);
/// ```
pub fn encode_record(record: &TelemetryRecord) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];

    buf[0..4].copy_from_slice(&record.pressure.to_le_bytes());
    buf[4..8].copy_from_slice(&record.reference_pressure.to_le_bytes());
    buf[8..12].copy_from_slice(&record.altitude.to_le_bytes());
    buf[12..16].copy_from_slice(&record.altitude_climbed.to_le_bytes());
    buf[16..20].copy_from_slice(&record.temperature.to_le_bytes());
    buf[20] = u8::from(record.archived);
    buf[21..25].copy_from_slice(&record.up_time.to_le_bytes());
    buf[25..33].copy_from_slice(&record.timestamp.to_le_bytes());

    buf
}

/// Decode a record from its on-medium representation
///
/// # Errors
///
/// Returns `InvalidData` if:
/// - The buffer is shorter than `RECORD_SIZE`
/// - The archived flag is neither 0 nor 1
pub fn decode_record(bytes: &[u8]) -> io::Result<TelemetryRecord> {
    if bytes.len() < RECORD_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("record too short: expected {} bytes, got {}", RECORD_SIZE, bytes.len()),
        ));
    }

    let archived = match bytes[20] {
        0 => false,
        1 => true,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid archived flag: 0x{:02X}", other),
            ))
        }
    };

    Ok(TelemetryRecord::from_parts(
        u32::from_le_bytes(word(bytes, 0)),
        u32::from_le_bytes(word(bytes, 4)),
        f32::from_le_bytes(word(bytes, 8)),
        f32::from_le_bytes(word(bytes, 12)),
        f32::from_le_bytes(word(bytes, 16)),
        archived,
        u32::from_le_bytes(word(bytes, 21)),
        i64::from_le_bytes([
            bytes[25], bytes[26], bytes[27], bytes[28],
            bytes[29], bytes[30], bytes[31], bytes[32],
        ]),
    ))
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> TelemetryRecord {
        TelemetryRecord::new(95_123, 101_325, 548.7, 31.5, -4.25, 86_400)
            .with_timestamp(Some(Utc.with_ymd_and_hms(2017, 5, 20, 8, 30, 0).unwrap()))
            .into_archived()
    }

    #[test]
    fn test_layout_offsets() {
        let bytes = encode_record(&sample());

        assert_eq!(&bytes[0..4], &95_123u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &101_325u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &548.7f32.to_le_bytes());
        assert_eq!(bytes[20], 1);
        assert_eq!(&bytes[21..25], &86_400u32.to_le_bytes());
    }

    #[test]
    fn test_decode_restores_every_field_bit_for_bit() {
        let record = sample();
        let decoded = decode_record(&encode_record(&record)).unwrap();

        assert_eq!(decoded.pressure(), record.pressure());
        assert_eq!(decoded.reference_pressure(), record.reference_pressure());
        assert_eq!(decoded.altitude().to_bits(), record.altitude().to_bits());
        assert_eq!(decoded.altitude_climbed().to_bits(), record.altitude_climbed().to_bits());
        assert_eq!(decoded.temperature().to_bits(), record.temperature().to_bits());
        assert_eq!(decoded.archived(), record.archived());
        assert_eq!(decoded.up_time(), record.up_time());
        assert_eq!(decoded.timestamp_secs(), record.timestamp_secs());
    }

    #[test]
    fn test_decode_short_buffer_fails() {
        let bytes = encode_record(&sample());
        let err = decode_record(&bytes[..RECORD_SIZE - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_decode_rejects_corrupt_flag() {
        let mut bytes = encode_record(&sample());
        bytes[20] = 0x7F;
        assert!(decode_record(&bytes).is_err());
    }

    #[test]
    fn test_unknown_timestamp_encodes_as_zero() {
        let record = TelemetryRecord::new(1, 2, 3.0, 4.0, 5.0, 6);
        let bytes = encode_record(&record);
        assert_eq!(&bytes[25..33], &[0u8; 8]);
        assert_eq!(decode_record(&bytes).unwrap().timestamp(), None);
    }
}
