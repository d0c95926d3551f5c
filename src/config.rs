//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AltimeterError, Result};
use crate::uplink::endpoint::{KeenIoEndpoint, ThingSpeakEndpoint};
use crate::uplink::http::Backoff;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub sensor: SensorConfig,
    pub network: NetworkConfig,
    pub uplink: UplinkConfig,
    #[serde(default)]
    pub weather: Option<WeatherConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Record store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    #[serde(default = "default_max_sequence_id")]
    pub max_sequence_id: u32,
}

/// Sync cycle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default)]
    pub drain_policy: DrainPolicy,
}

/// When drained records are deleted from the store
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Delete as soon as the upload call returns, whatever its outcome
    #[default]
    AfterSend,
    /// Delete only if the gateway reports the exchange completed
    AfterCompleted,
}

/// Barometer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,

    #[serde(default = "default_reference_pressure_pa")]
    pub reference_pressure_pa: u32,

    #[serde(default = "default_climb_threshold_m")]
    pub climb_threshold_m: f32,
}

/// Network liveness probe configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_probe_host")]
    pub probe_host: String,

    #[serde(default = "default_http_port")]
    pub probe_port: u16,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UplinkConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,

    #[serde(default = "default_resolution_retry_ms")]
    pub resolution_retry_ms: u64,

    #[serde(default = "default_socket_retry_ms")]
    pub socket_retry_ms: u64,

    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,

    #[serde(default = "default_send_retry_ms")]
    pub send_retry_ms: u64,

    #[serde(default)]
    pub thingspeak: Option<ThingSpeakConfig>,

    pub keenio: KeenIoConfig,
}

/// Live reading endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct ThingSpeakConfig {
    #[serde(default = "default_thingspeak_host")]
    pub host: String,

    pub write_api_key: String,
}

/// Batch endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct KeenIoConfig {
    #[serde(default = "default_keenio_host")]
    pub host: String,

    pub request_url: String,

    pub write_api_key: String,

    #[serde(default = "default_event_collection")]
    pub event_collection: String,
}

/// Live reference pressure from OpenWeatherMap.
///
/// When absent, `sensor.reference_pressure_pa` is used for every reading.
/// When present, it is only the fallback until the first successful fetch.
#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_host")]
    pub host: String,

    #[serde(default = "default_location_id")]
    pub location_id: String,

    pub api_key: String,

    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
}

/// Persisted process state configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; console only if unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

// Default value functions
fn default_store_root() -> PathBuf { PathBuf::from("/sdcard") }
fn default_max_sequence_id() -> u32 { crate::store::DEFAULT_MAX_SEQUENCE_ID }

fn default_period_ms() -> u64 { 60_000 }

fn default_device_dir() -> PathBuf { PathBuf::from("/sys/bus/iio/devices/iio:device0") }
fn default_reference_pressure_pa() -> u32 { crate::sensor::STANDARD_SEA_LEVEL_PRESSURE }
fn default_climb_threshold_m() -> f32 { 1.0 }

fn default_probe_host() -> String { KeenIoEndpoint::DEFAULT_HOST.to_string() }
fn default_http_port() -> u16 { crate::uplink::http::HTTP_PORT }
fn default_probe_timeout_ms() -> u64 { 2000 }

fn default_resolution_retry_ms() -> u64 { 1000 }
fn default_socket_retry_ms() -> u64 { 1000 }
fn default_connect_retry_ms() -> u64 { 4000 }
fn default_send_retry_ms() -> u64 { 4000 }

fn default_thingspeak_host() -> String { ThingSpeakEndpoint::DEFAULT_HOST.to_string() }
fn default_keenio_host() -> String { KeenIoEndpoint::DEFAULT_HOST.to_string() }
fn default_event_collection() -> String { "everest-run-check".to_string() }

fn default_weather_host() -> String { crate::reference::DEFAULT_WEATHER_HOST.to_string() }
fn default_location_id() -> String { "756135".to_string() }
fn default_refresh_period_ms() -> u64 { 600_000 }

fn default_state_path() -> PathBuf { PathBuf::from("./altimeter-state.json") }

fn invalid(message: impl std::fmt::Display) -> AltimeterError {
    AltimeterError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use altimeter_sync::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.store.root.as_os_str().is_empty() {
            return Err(invalid("store root cannot be empty"));
        }

        if self.store.max_sequence_id == 0 || self.store.max_sequence_id > 100_000_000 {
            return Err(invalid("max_sequence_id must be between 1 and 100000000"));
        }

        if self.sync.period_ms == 0 || self.sync.period_ms > 86_400_000 {
            return Err(invalid("period_ms must be between 1 and 86400000"));
        }

        if self.sensor.reference_pressure_pa < 30_000 || self.sensor.reference_pressure_pa > 110_000 {
            return Err(invalid("reference_pressure_pa must be between 30000 and 110000"));
        }

        if !self.sensor.climb_threshold_m.is_finite() || self.sensor.climb_threshold_m < 0.0 {
            return Err(invalid("climb_threshold_m must be a non-negative number"));
        }

        if self.network.probe_host.is_empty() {
            return Err(invalid("probe_host cannot be empty"));
        }

        if self.network.probe_timeout_ms == 0 || self.network.probe_timeout_ms > 60_000 {
            return Err(invalid("probe_timeout_ms must be between 1 and 60000"));
        }

        for (name, value) in [
            ("resolution_retry_ms", self.uplink.resolution_retry_ms),
            ("socket_retry_ms", self.uplink.socket_retry_ms),
            ("connect_retry_ms", self.uplink.connect_retry_ms),
            ("send_retry_ms", self.uplink.send_retry_ms),
        ] {
            if value > 60_000 {
                return Err(invalid(format!("{} must be at most 60000", name)));
            }
        }

        if let Some(thingspeak) = &self.uplink.thingspeak {
            if thingspeak.host.is_empty() || thingspeak.write_api_key.is_empty() {
                return Err(invalid("thingspeak host and write_api_key cannot be empty"));
            }
        }

        let keenio = &self.uplink.keenio;
        if keenio.host.is_empty() || keenio.write_api_key.is_empty() {
            return Err(invalid("keenio host and write_api_key cannot be empty"));
        }

        if !keenio.request_url.starts_with('/') {
            return Err(invalid("keenio request_url must be an absolute path"));
        }

        if keenio.event_collection.is_empty() {
            return Err(invalid("keenio event_collection cannot be empty"));
        }

        if let Some(weather) = &self.weather {
            if weather.host.is_empty() || weather.location_id.is_empty() || weather.api_key.is_empty() {
                return Err(invalid("weather host, location_id and api_key cannot be empty"));
            }

            if weather.refresh_period_ms == 0 || weather.refresh_period_ms > 86_400_000 {
                return Err(invalid("weather refresh_period_ms must be between 1 and 86400000"));
            }
        }

        if self.state.path.as_os_str().is_empty() {
            return Err(invalid("state path cannot be empty"));
        }

        Ok(())
    }
}

impl SyncConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl WeatherConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }
}

impl UplinkConfig {
    /// Failure delays for the HTTP gateway
    pub fn backoff(&self) -> Backoff {
        Backoff {
            resolution: Duration::from_millis(self.resolution_retry_ms),
            socket: Duration::from_millis(self.socket_retry_ms),
            connect: Duration::from_millis(self.connect_retry_ms),
            send: Duration::from_millis(self.send_retry_ms),
        }
    }

    pub fn thingspeak_endpoint(&self) -> Option<ThingSpeakEndpoint> {
        self.thingspeak
            .as_ref()
            .map(|t| ThingSpeakEndpoint::new(&t.host, &t.write_api_key))
    }

    pub fn keenio_endpoint(&self) -> KeenIoEndpoint {
        KeenIoEndpoint::new(
            &self.keenio.host,
            &self.keenio.request_url,
            &self.keenio.write_api_key,
            &self.keenio.event_collection,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[store]

[sync]

[sensor]

[network]

[uplink.keenio]
request_url = "/3.0/projects/PROJECT/events"
write_api_key = "KEY"
"#;

    fn create_valid_config() -> Config {
        Config::parse(MINIMAL).unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = create_valid_config();

        assert_eq!(config.store.root, PathBuf::from("/sdcard"));
        assert_eq!(config.store.max_sequence_id, 100_000_000);
        assert_eq!(config.sync.period(), Duration::from_secs(60));
        assert_eq!(config.sync.drain_policy, DrainPolicy::AfterSend);
        assert_eq!(config.sensor.reference_pressure_pa, 101_325);
        assert_eq!(config.network.probe_host, "api.keen.io");
        assert_eq!(config.uplink.port, 80);
        assert_eq!(config.uplink.backoff(), Backoff::default());
        assert!(config.uplink.thingspeak.is_none());
        assert_eq!(config.uplink.keenio.event_collection, "everest-run-check");
        assert_eq!(config.state.path, PathBuf::from("./altimeter-state.json"));
        assert!(config.logging.directory.is_none());
        assert!(config.weather.is_none());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[store]
root = "/mnt/card"
max_sequence_id = 1000

[sync]
period_ms = 30000
drain_policy = "after_completed"

[sensor]
device_dir = "/sys/bus/iio/devices/iio:device1"
reference_pressure_pa = 100900
climb_threshold_m = 2.5

[network]
probe_host = "1.1.1.1"
probe_port = 53

[uplink]
connect_retry_ms = 500

[uplink.thingspeak]
write_api_key = "TS_KEY"

[uplink.keenio]
request_url = "/3.0/projects/P/events"
write_api_key = "KEEN_KEY"
event_collection = "test-run"

[weather]
api_key = "OWM_KEY"
refresh_period_ms = 300000

[state]
path = "/var/lib/altimeter/state.json"

[logging]
directory = "/var/log/altimeter"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.store.max_sequence_id, 1000);
        assert_eq!(config.sync.drain_policy, DrainPolicy::AfterCompleted);
        assert_eq!(config.sensor.climb_threshold_m, 2.5);
        assert_eq!(config.uplink.backoff().connect, Duration::from_millis(500));
        assert_eq!(
            config.uplink.thingspeak_endpoint().unwrap().host(),
            "api.thingspeak.com"
        );
        assert_eq!(config.uplink.keenio_endpoint().host(), "api.keen.io");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/altimeter"))
        );

        let weather = config.weather.unwrap();
        assert_eq!(weather.host, "api.openweathermap.org");
        assert_eq!(weather.location_id, "756135");
        assert_eq!(weather.refresh_period(), Duration::from_secs(300));
    }

    #[test]
    fn test_missing_keenio_section_fails() {
        let toml_content = "[store]\n[sync]\n[sensor]\n[network]\n[uplink]\n";
        assert!(matches!(
            Config::parse(toml_content),
            Err(AltimeterError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_drain_policy_fails() {
        let toml_content = MINIMAL.replace("[sync]", "[sync]\ndrain_policy = \"never\"");
        assert!(Config::parse(&toml_content).is_err());
    }

    #[test]
    fn test_max_sequence_id_zero() {
        let mut config = create_valid_config();
        config.store.max_sequence_id = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_sequence_id_too_wide() {
        let mut config = create_valid_config();
        config.store.max_sequence_id = 100_000_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_store_root() {
        let mut config = create_valid_config();
        config.store.root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_period_zero() {
        let mut config = create_valid_config();
        config.sync.period_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reference_pressure_out_of_range() {
        let mut config = create_valid_config();
        config.sensor.reference_pressure_pa = 1013;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_climb_threshold() {
        let mut config = create_valid_config();
        config.sensor.climb_threshold_m = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_timeout_zero() {
        let mut config = create_valid_config();
        config.network.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_too_high() {
        let mut config = create_valid_config();
        config.uplink.send_retry_ms = 60_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_delays_allowed() {
        let mut config = create_valid_config();
        config.uplink.resolution_retry_ms = 0;
        config.uplink.connect_retry_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_thingspeak_key() {
        let mut config = create_valid_config();
        config.uplink.thingspeak = Some(ThingSpeakConfig {
            host: default_thingspeak_host(),
            write_api_key: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_request_url() {
        let mut config = create_valid_config();
        config.uplink.keenio.request_url = "3.0/projects".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_event_collection() {
        let mut config = create_valid_config();
        config.uplink.keenio.event_collection = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weather_without_api_key_fails() {
        let toml_content = format!("{}\n[weather]\nlocation_id = \"3081368\"\n", MINIMAL);
        assert!(matches!(
            Config::parse(&toml_content),
            Err(AltimeterError::Config(_))
        ));
    }

    #[test]
    fn test_weather_refresh_period_zero() {
        let mut config = create_valid_config();
        config.weather = Some(WeatherConfig {
            host: default_weather_host(),
            location_id: default_location_id(),
            api_key: "KEY".to_string(),
            refresh_period_ms: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_store_root(), PathBuf::from("/sdcard"));
        assert_eq!(default_max_sequence_id(), 100_000_000);
        assert_eq!(default_period_ms(), 60_000);
        assert_eq!(default_reference_pressure_pa(), 101_325);
        assert_eq!(default_climb_threshold_m(), 1.0);
        assert_eq!(default_http_port(), 80);
        assert_eq!(default_probe_timeout_ms(), 2000);
        assert_eq!(default_resolution_retry_ms(), 1000);
        assert_eq!(default_socket_retry_ms(), 1000);
        assert_eq!(default_connect_retry_ms(), 4000);
        assert_eq!(default_send_retry_ms(), 4000);
        assert_eq!(default_thingspeak_host(), "api.thingspeak.com");
        assert_eq!(default_keenio_host(), "api.keen.io");
        assert_eq!(default_event_collection(), "everest-run-check");
        assert_eq!(default_weather_host(), "api.openweathermap.org");
        assert_eq!(default_refresh_period_ms(), 600_000);
    }
}
