//! # Upload Endpoints
//!
//! Builds complete HTTP requests for the two collectors.
//!
//! - **ThingSpeak**: one `GET /update` per record carrying pressure and altitude
//!   as channel fields. Used for the live reading only.
//! - **Keen.io**: one `POST` carrying a JSON array of events. Used for the live
//!   reading and for draining the archive.
//!
//! Requests are assembled into an owned buffer reserved up front from the
//! computed length, so message size is bounded only by memory.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::Result;
use crate::record::TelemetryRecord;

pub(crate) const USER_AGENT: &str = concat!("altimeter-sync/", env!("CARGO_PKG_VERSION"));

/// Timestamp format expected by Keen.io
const KEEN_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Channel update endpoint taking one record per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingSpeakEndpoint {
    host: String,
    write_api_key: String,
}

impl ThingSpeakEndpoint {
    pub const DEFAULT_HOST: &'static str = "api.thingspeak.com";

    pub fn new(host: impl Into<String>, write_api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            write_api_key: write_api_key.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build the update request for one record
    ///
    /// Pressure goes to `field1` and altitude, rounded to 0.1 m, to `field3`.
    pub fn request(&self, record: &TelemetryRecord) -> Vec<u8> {
        format!(
            "GET /update?key={}&field1={}&field3={:.1} HTTP/1.1\r\n\
             Host: {}\r\n\
             Connection: close\r\n\
             User-Agent: {}\r\n\
             \r\n",
            self.write_api_key,
            record.pressure(),
            record.altitude(),
            self.host,
            USER_AGENT
        )
        .into_bytes()
    }
}

/// Event collection endpoint taking many records per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeenIoEndpoint {
    host: String,
    request_url: String,
    write_api_key: String,
    event_collection: String,
}

/// One record as a Keen.io event
#[derive(Debug, Serialize)]
struct KeenEvent {
    #[serde(rename = "Pressure")]
    pressure: u32,
    #[serde(rename = "Altitude")]
    altitude: f64,
    #[serde(rename = "Altitude Climbed")]
    altitude_climbed: f64,
    #[serde(rename = "Temperature")]
    temperature: f64,
    #[serde(rename = "Reference Pressure")]
    reference_pressure: u32,
    #[serde(rename = "Logged")]
    logged: bool,
    #[serde(rename = "Up Time")]
    up_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    keen: Option<KeenProperties>,
}

#[derive(Debug, Serialize)]
struct KeenProperties {
    timestamp: String,
}

impl From<&TelemetryRecord> for KeenEvent {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            pressure: record.pressure(),
            altitude: tenths(record.altitude()),
            altitude_climbed: tenths(record.altitude_climbed()),
            temperature: tenths(record.temperature()),
            reference_pressure: record.reference_pressure(),
            logged: record.archived(),
            up_time: record.up_time(),
            // Unknown time: let the collector stamp the event on arrival
            keen: record.timestamp().map(|t| KeenProperties {
                timestamp: t.format(KEEN_TIMESTAMP_FORMAT).to_string(),
            }),
        }
    }
}

/// Round to one decimal place, matching the precision of the sensor
fn tenths(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

impl KeenIoEndpoint {
    pub const DEFAULT_HOST: &'static str = "api.keen.io";

    pub fn new(
        host: impl Into<String>,
        request_url: impl Into<String>,
        write_api_key: impl Into<String>,
        event_collection: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            request_url: request_url.into(),
            write_api_key: write_api_key.into(),
            event_collection: event_collection.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// JSON body for a batch of records: `{"<collection>": [event, ...]}`
    pub fn body(&self, records: &[TelemetryRecord]) -> Result<Vec<u8>> {
        let events: Vec<KeenEvent> = records.iter().map(KeenEvent::from).collect();
        let mut body = BTreeMap::new();
        body.insert(self.event_collection.as_str(), events);
        Ok(serde_json::to_vec(&body)?)
    }

    /// Build the batch POST request for `records`
    ///
    /// # Errors
    ///
    /// Returns `Json` if the events cannot be serialized.
    pub fn request(&self, records: &[TelemetryRecord]) -> Result<Vec<u8>> {
        let body = self.body(records)?;
        let head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Content-Type: application/json\r\n\
             User-Agent: {}\r\n\
             Authorization: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.request_url,
            self.host,
            USER_AGENT,
            self.write_api_key,
            body.len()
        );

        let mut request = Vec::with_capacity(head.len() + body.len());
        request.extend_from_slice(head.as_bytes());
        request.extend_from_slice(&body);
        Ok(request)
    }
}
