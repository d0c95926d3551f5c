//! # Record Module
//!
//! One sensor observation and the identifiers used to retain it on storage.
//!
//! This module handles:
//! - The `TelemetryRecord` captured once per sync cycle
//! - Sequence identifiers and their on-medium file names
//! - Fixed-size binary encoding of records (see [`codec`])

pub mod codec;

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// Number of decimal digits in a record file name
pub const RECORD_ID_DIGITS: usize = 8;

/// Suffix appended to every record file name
pub const RECORD_FILE_SUFFIX: &str = ".bin";

/// Epoch-seconds value stored when no time source was available
pub const TIMESTAMP_UNKNOWN: i64 = 0;

/// Sequence identifier of a retained record.
///
/// The identifier is also the record's storage name: `{id:08}.bin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u32);

impl RecordId {
    /// Returns the file name this record is stored under.
    ///
    /// # Examples
    ///
    /// ```
    /// use altimeter_sync::record::RecordId;
    ///
    /// assert_eq!(RecordId(42).file_name(), "00000042.bin");
    /// ```
    pub fn file_name(&self) -> String {
        format!("{:0width$}{}", self.0, RECORD_FILE_SUFFIX, width = RECORD_ID_DIGITS)
    }

    /// Parses a file name produced by [`RecordId::file_name`].
    ///
    /// Returns `None` for anything that is not exactly eight decimal digits
    /// followed by the record suffix.
    ///
    /// # Examples
    ///
    /// ```
    /// use altimeter_sync::record::RecordId;
    ///
    /// assert_eq!(RecordId::parse_file_name("00000042.bin"), Some(RecordId(42)));
    /// assert_eq!(RecordId::parse_file_name("state.json"), None);
    /// ```
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(RECORD_FILE_SUFFIX)?;
        if stem.len() != RECORD_ID_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        stem.parse().ok().map(RecordId)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = RECORD_ID_DIGITS)
    }
}

/// One altitude observation plus its compensation context.
///
/// Fields are private: a record is fixed at capture time. Only the archival
/// flag and the timestamp may be set afterwards, through the consuming
/// [`with_timestamp`](Self::with_timestamp) and
/// [`into_archived`](Self::into_archived) methods.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    /// Pressure [Pa] as measured
    pressure: u32,
    /// Sea-level reference pressure [Pa] used for altitude compensation
    reference_pressure: u32,
    /// Altitude [m] derived from pressure and reference pressure
    altitude: f32,
    /// Cumulative climb [m], never decreases
    altitude_climbed: f32,
    /// Temperature [°C]
    temperature: f32,
    /// Written to the record store instead of being uploaded live
    archived: bool,
    /// Seconds since process start
    up_time: u32,
    /// Epoch seconds, or `TIMESTAMP_UNKNOWN`
    timestamp: i64,
}

impl TelemetryRecord {
    /// Captures a new, not yet archived record with an unknown timestamp.
    #[must_use]
    pub fn new(
        pressure: u32,
        reference_pressure: u32,
        altitude: f32,
        altitude_climbed: f32,
        temperature: f32,
        up_time: u32,
    ) -> Self {
        Self {
            pressure,
            reference_pressure,
            altitude,
            altitude_climbed,
            temperature,
            archived: false,
            up_time,
            timestamp: TIMESTAMP_UNKNOWN,
        }
    }

    /// Stamps the record with wall-clock time, truncated to whole seconds.
    ///
    /// `None` leaves the timestamp at the "unknown" sentinel.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp.map_or(TIMESTAMP_UNKNOWN, |t| t.timestamp());
        self
    }

    /// Marks the record as written to the store rather than uploaded live.
    #[must_use]
    pub fn into_archived(mut self) -> Self {
        self.archived = true;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        pressure: u32,
        reference_pressure: u32,
        altitude: f32,
        altitude_climbed: f32,
        temperature: f32,
        archived: bool,
        up_time: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            pressure,
            reference_pressure,
            altitude,
            altitude_climbed,
            temperature,
            archived,
            up_time,
            timestamp,
        }
    }

    pub fn pressure(&self) -> u32 {
        self.pressure
    }

    pub fn reference_pressure(&self) -> u32 {
        self.reference_pressure
    }

    pub fn altitude(&self) -> f32 {
        self.altitude
    }

    pub fn altitude_climbed(&self) -> f32 {
        self.altitude_climbed
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn archived(&self) -> bool {
        self.archived
    }

    pub fn up_time(&self) -> u32 {
        self.up_time
    }

    /// Raw epoch seconds as stored, including the unknown sentinel.
    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp
    }

    /// Wall-clock time of the reading, if a time source was available.
    ///
    /// Callers must treat `None` as "not authoritative" and fall back to
    /// [`up_time`](Self::up_time).
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        if self.timestamp == TIMESTAMP_UNKNOWN {
            return None;
        }
        Utc.timestamp_opt(self.timestamp, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TelemetryRecord {
        TelemetryRecord::new(95_000, 101_325, 540.2, 12.5, 21.3, 360)
    }

    #[test]
    fn test_file_name_is_zero_padded() {
        assert_eq!(RecordId(0).file_name(), "00000000.bin");
        assert_eq!(RecordId(99_999_999).file_name(), "99999999.bin");
    }

    #[test]
    fn test_parse_file_name_round_trips() {
        for id in [0, 7, 1234, 99_999_999] {
            let name = RecordId(id).file_name();
            assert_eq!(RecordId::parse_file_name(&name), Some(RecordId(id)));
        }
    }

    #[test]
    fn test_parse_file_name_rejects_foreign_names() {
        assert_eq!(RecordId::parse_file_name("state.json"), None);
        assert_eq!(RecordId::parse_file_name("1234.bin"), None);
        assert_eq!(RecordId::parse_file_name("0000000a.bin"), None);
        assert_eq!(RecordId::parse_file_name("00000001.txt"), None);
        assert_eq!(RecordId::parse_file_name("00000001"), None);
        assert_eq!(RecordId::parse_file_name("+0000001.bin"), None);
    }

    #[test]
    fn test_display_matches_file_stem() {
        assert_eq!(RecordId(42).to_string(), "00000042");
    }

    #[test]
    fn test_new_record_is_live_with_unknown_timestamp() {
        let record = sample();
        assert!(!record.archived());
        assert_eq!(record.timestamp(), None);
        assert_eq!(record.timestamp_secs(), TIMESTAMP_UNKNOWN);
    }

    #[test]
    fn test_into_archived_only_changes_flag() {
        let record = sample();
        let archived = record.into_archived();
        assert!(archived.archived());
        assert_eq!(archived.pressure(), record.pressure());
        assert_eq!(archived.altitude(), record.altitude());
        assert_eq!(archived.up_time(), record.up_time());
    }

    #[test]
    fn test_with_timestamp_truncates_to_seconds() {
        let now = Utc.with_ymd_and_hms(2017, 5, 20, 8, 30, 15).unwrap()
            + chrono::Duration::milliseconds(750);
        let record = sample().with_timestamp(Some(now));
        assert_eq!(record.timestamp_secs(), now.timestamp());
        assert_eq!(
            record.timestamp(),
            Some(Utc.with_ymd_and_hms(2017, 5, 20, 8, 30, 15).unwrap())
        );
    }

    #[test]
    fn test_with_timestamp_none_keeps_sentinel() {
        let record = sample().with_timestamp(None);
        assert_eq!(record.timestamp(), None);
    }
}
