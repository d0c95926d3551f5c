//! # Reference Pressure Module
//!
//! Sea-level pressure used to compensate altitude readings.
//!
//! This module handles:
//! - The `ReferencePressure` capability consumed by the sync controller
//! - A fixed reference taken from the configuration
//! - A reference fetched from OpenWeatherMap and refreshed on its own period
//!
//! A failed refresh keeps the last good value. Until the first successful
//! fetch the configured fallback is used.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{AltimeterError, Result};
use crate::uplink::endpoint::USER_AGENT;
use crate::uplink::{RequestOutcome, UploadGateway};

/// Lowest sea-level pressure accepted from a weather service [Pa]
pub const MIN_REFERENCE_PRESSURE: u32 = 30_000;

/// Highest sea-level pressure accepted from a weather service [Pa]
pub const MAX_REFERENCE_PRESSURE: u32 = 110_000;

/// OpenWeatherMap API host
pub const DEFAULT_WEATHER_HOST: &str = "api.openweathermap.org";

/// Source of the sea-level reference pressure
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferencePressure: Send {
    /// Reference [Pa] to use for the reading about to be taken
    async fn current(&mut self) -> u32;
}

#[async_trait]
impl<T: ReferencePressure + ?Sized> ReferencePressure for Box<T> {
    async fn current(&mut self) -> u32 {
        (**self).current().await
    }
}

/// Reference that never changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedReference(pub u32);

#[async_trait]
impl ReferencePressure for FixedReference {
    async fn current(&mut self) -> u32 {
        self.0
    }
}

#[derive(Debug, Deserialize)]
struct WeatherReport {
    main: MainReadings,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    /// Sea-level pressure [hPa]
    pressure: f64,
}

/// Extract the sea-level pressure from an OpenWeatherMap current weather
/// response body.
///
/// # Returns
///
/// * `Result<u32>` - Pressure in Pa
///
/// # Errors
///
/// Returns `Json` if the body is not a weather report, or `Reference` if the
/// pressure is outside the plausible range.
///
/// # Examples
///
/// ```
/// use altimeter_sync::reference::parse_pressure;
///
/// let body = br#"{"main":{"temp":281.4,"pressure":1013,"humidity":81}}"#;
/// assert_eq!(parse_pressure(body).unwrap(), 101_300);
/// ```
pub fn parse_pressure(body: &[u8]) -> Result<u32> {
    let report: WeatherReport = serde_json::from_slice(body)?;
    let pascal = (report.main.pressure * 100.0).round();

    if pascal < f64::from(MIN_REFERENCE_PRESSURE) || pascal > f64::from(MAX_REFERENCE_PRESSURE) {
        return Err(AltimeterError::Reference(format!(
            "implausible sea-level pressure {} hPa",
            report.main.pressure
        )));
    }
    Ok(pascal as u32)
}

/// Reference fetched from the OpenWeatherMap current weather API
pub struct WeatherReference<G> {
    gateway: G,
    host: String,
    request: Vec<u8>,
    refresh_period: Duration,
    value: u32,
    last_attempt: Option<Instant>,
}

impl<G: UploadGateway> WeatherReference<G> {
    /// # Arguments
    ///
    /// * `gateway` - Transport used for the weather request
    /// * `host` - Weather API host
    /// * `location_id` - OpenWeatherMap city id
    /// * `api_key` - OpenWeatherMap application id
    /// * `refresh_period` - Minimum time between two fetch attempts
    /// * `fallback` - Reference [Pa] used until the first successful fetch
    pub fn new(
        gateway: G,
        host: impl Into<String>,
        location_id: &str,
        api_key: &str,
        refresh_period: Duration,
        fallback: u32,
    ) -> Self {
        let host = host.into();
        let request = format!(
            "GET /data/2.5/weather?id={}&appid={} HTTP/1.1\r\n\
             Host: {}\r\n\
             Connection: close\r\n\
             User-Agent: {}\r\n\
             \r\n",
            location_id, api_key, host, USER_AGENT
        )
        .into_bytes();

        Self {
            gateway,
            host,
            request,
            refresh_period,
            value: fallback,
            last_attempt: None,
        }
    }

    async fn fetch(&self) -> Result<u32> {
        match self.gateway.send(&self.host, &self.request).await {
            RequestOutcome::Completed(response) => {
                if !response.is_success() {
                    return Err(AltimeterError::Reference(format!(
                        "weather service answered with status {:?}",
                        response.status
                    )));
                }
                let body = response.body().ok_or_else(|| {
                    AltimeterError::Reference("weather response has no body".to_string())
                })?;
                parse_pressure(body)
            }
            failure => Err(AltimeterError::Reference(format!(
                "weather request failed: {:?}",
                failure
            ))),
        }
    }
}

#[async_trait]
impl<G: UploadGateway> ReferencePressure for WeatherReference<G> {
    async fn current(&mut self) -> u32 {
        let due = self
            .last_attempt
            .map_or(true, |at| at.elapsed() >= self.refresh_period);

        if due {
            self.last_attempt = Some(Instant::now());
            match self.fetch().await {
                Ok(pressure) => {
                    info!("Reference pressure from {} is {} Pa", self.host, pressure);
                    self.value = pressure;
                }
                Err(e) => warn!("Keeping reference pressure {} Pa: {}", self.value, e),
            }
        } else {
            debug!("Reference pressure {} Pa still fresh", self.value);
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uplink::{HttpResponse, MockUploadGateway};
    use mockall::Sequence;

    const FALLBACK: u32 = 101_325;

    fn weather(pressure_hpa: &str) -> RequestOutcome {
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n\
             {{\"name\":\"Warsaw\",\"main\":{{\"temp\":281.4,\"pressure\":{},\"humidity\":81}}}}",
            pressure_hpa
        );
        RequestOutcome::Completed(HttpResponse::parse(raw.into()))
    }

    fn gateway(outcomes: Vec<RequestOutcome>) -> MockUploadGateway {
        let mut gateway = MockUploadGateway::new();
        let mut seq = Sequence::new();
        for outcome in outcomes {
            gateway
                .expect_send()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| outcome.clone());
        }
        gateway
    }

    fn reference(gateway: MockUploadGateway, refresh_period: Duration) -> WeatherReference<MockUploadGateway> {
        WeatherReference::new(
            gateway,
            DEFAULT_WEATHER_HOST,
            "756135",
            "APP_ID",
            refresh_period,
            FALLBACK,
        )
    }

    #[tokio::test]
    async fn test_fixed_reference() {
        let mut fixed = FixedReference(100_900);
        assert_eq!(fixed.current().await, 100_900);
        assert_eq!(fixed.current().await, 100_900);
    }

    #[tokio::test]
    async fn test_boxed_reference_delegates() {
        let mut boxed: Box<dyn ReferencePressure> = Box::new(FixedReference(99_000));
        assert_eq!(boxed.current().await, 99_000);
    }

    #[tokio::test]
    async fn test_request_targets_weather_api() {
        let mut gateway = MockUploadGateway::new();
        gateway
            .expect_send()
            .times(1)
            .withf(|host, request| {
                let request = String::from_utf8_lossy(request);
                host == "api.openweathermap.org"
                    && request.starts_with("GET /data/2.5/weather?id=756135&appid=APP_ID HTTP/1.1\r\n")
                    && request.contains("Host: api.openweathermap.org\r\n")
            })
            .returning(|_, _| weather("1013"));

        let mut reference = reference(gateway, Duration::from_secs(600));
        assert_eq!(reference.current().await, 101_300);
    }

    #[tokio::test]
    async fn test_refresh_replaces_value() {
        let gateway = gateway(vec![weather("1013"), weather("998.6")]);
        let mut reference = reference(gateway, Duration::ZERO);

        assert_eq!(reference.current().await, 101_300);
        assert_eq!(reference.current().await, 99_860);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_value() {
        let gateway = gateway(vec![weather("1002"), RequestOutcome::ConnectFailed]);
        let mut reference = reference(gateway, Duration::ZERO);

        assert_eq!(reference.current().await, 100_200);
        assert_eq!(reference.current().await, 100_200);
    }

    #[tokio::test]
    async fn test_fallback_until_first_success() {
        let gateway = gateway(vec![RequestOutcome::ResolutionFailed, weather("1020")]);
        let mut reference = reference(gateway, Duration::ZERO);

        assert_eq!(reference.current().await, FALLBACK);
        assert_eq!(reference.current().await, 102_000);
    }

    #[tokio::test]
    async fn test_bad_json_keeps_fallback() {
        let garbage = RequestOutcome::Completed(HttpResponse::parse(
            "HTTP/1.1 200 OK\r\n\r\n<html>maintenance</html>".into(),
        ));
        let mut reference = reference(gateway(vec![garbage]), Duration::ZERO);

        assert_eq!(reference.current().await, FALLBACK);
    }

    #[tokio::test]
    async fn test_error_status_keeps_fallback() {
        let unauthorized = RequestOutcome::Completed(HttpResponse::parse(
            "HTTP/1.1 401 Unauthorized\r\n\r\n{\"cod\":401}".into(),
        ));
        let mut reference = reference(gateway(vec![unauthorized]), Duration::ZERO);

        assert_eq!(reference.current().await, FALLBACK);
    }

    #[tokio::test]
    async fn test_no_refresh_within_period() {
        let gateway = gateway(vec![weather("1013")]);
        let mut reference = reference(gateway, Duration::from_secs(3600));

        assert_eq!(reference.current().await, 101_300);
        assert_eq!(reference.current().await, 101_300);
    }

    #[test]
    fn test_parse_pressure_rejects_missing_field() {
        let err = parse_pressure(br#"{"main":{"temp":281.4}}"#).unwrap_err();
        assert!(matches!(err, AltimeterError::Json(_)));
    }

    #[test]
    fn test_parse_pressure_rejects_implausible_value() {
        let err = parse_pressure(br#"{"main":{"pressure":13}}"#).unwrap_err();
        assert!(matches!(err, AltimeterError::Reference(_)));
    }

    #[test]
    fn test_parse_pressure_fractional_hpa() {
        assert_eq!(parse_pressure(br#"{"main":{"pressure":1009.87}}"#).unwrap(), 100_987);
    }
}
