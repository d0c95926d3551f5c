//! # Sensor Module
//!
//! Barometric altitude acquisition.
//!
//! This module handles:
//! - The `Altimeter` capability consumed by the sync controller
//! - Converting pressure to altitude against a sea-level reference
//! - Reading a BMP180/BMP280 barometer through the Linux IIO sysfs interface
//! - Tracking cumulative climb (see [`climb`])

pub mod climb;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AltimeterError, Result};

/// Standard sea-level pressure in Pa
pub const STANDARD_SEA_LEVEL_PRESSURE: u32 = 101_325;

/// Exponent of the international barometric formula (1 / 5.255)
const BAROMETRIC_EXPONENT: f32 = 0.190_295;

/// Scale of the international barometric formula in meters
const BAROMETRIC_SCALE_M: f32 = 44_330.0;

/// One reading from the barometer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Absolute pressure [Pa]
    pub pressure: u32,
    /// Temperature [°C]
    pub temperature: f32,
    /// Altitude [m] compensated to the reference pressure
    pub altitude: f32,
}

/// Source of altitude measurements
pub trait Altimeter: Send {
    /// Take one reading, computing altitude against `reference_pressure` [Pa].
    fn measure(&mut self, reference_pressure: u32) -> Result<Measurement>;
}

/// Altitude in meters for `pressure` given the sea-level `reference_pressure`.
///
/// Uses the international barometric formula from the BMP180 datasheet:
/// `44330 * (1 - (p / p0) ^ 0.190295)`.
///
/// # Examples
///
/// ```
/// use altimeter_sync::sensor::altitude_from_pressure;
///
/// assert!(altitude_from_pressure(101_325, 101_325).abs() < 0.001);
/// assert!(altitude_from_pressure(89_875, 101_325) > 990.0);
/// ```
pub fn altitude_from_pressure(pressure: u32, reference_pressure: u32) -> f32 {
    if reference_pressure == 0 {
        return 0.0;
    }
    let ratio = pressure as f32 / reference_pressure as f32;
    BAROMETRIC_SCALE_M * (1.0 - ratio.powf(BAROMETRIC_EXPONENT))
}

/// Barometer exposed by the kernel IIO subsystem.
///
/// The `bmp280` driver (which also binds BMP180) publishes pressure in kPa
/// and temperature in milli-degrees Celsius.
#[derive(Debug, Clone)]
pub struct IioAltimeter {
    device_dir: PathBuf,
}

impl IioAltimeter {
    /// File holding the processed pressure in kPa
    const PRESSURE_FILE: &'static str = "in_pressure_input";
    /// File holding the processed temperature in m°C
    const TEMPERATURE_FILE: &'static str = "in_temp_input";

    /// Create an altimeter for an IIO device directory,
    /// e.g. `/sys/bus/iio/devices/iio:device0`.
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    /// Device directory this altimeter reads from
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    fn read_value(&self, file: &str) -> Result<f64> {
        let path = self.device_dir.join(file);
        let raw = fs::read_to_string(&path).map_err(|e| {
            AltimeterError::Sensor(format!("Failed to read {}: {}", path.display(), e))
        })?;
        raw.trim().parse::<f64>().map_err(|e| {
            AltimeterError::Sensor(format!(
                "Invalid value '{}' in {}: {}",
                raw.trim(),
                path.display(),
                e
            ))
        })
    }
}

impl Altimeter for IioAltimeter {
    fn measure(&mut self, reference_pressure: u32) -> Result<Measurement> {
        let pressure_kpa = self.read_value(Self::PRESSURE_FILE)?;
        let temperature_mc = self.read_value(Self::TEMPERATURE_FILE)?;

        if !(0.0..=u32::MAX as f64 / 1000.0).contains(&pressure_kpa) {
            return Err(AltimeterError::Sensor(format!(
                "Pressure out of range: {} kPa",
                pressure_kpa
            )));
        }

        let pressure = (pressure_kpa * 1000.0).round() as u32;
        let temperature = (temperature_mc / 1000.0) as f32;
        let altitude = altitude_from_pressure(pressure, reference_pressure);

        debug!(
            "Pressure {} Pa, temperature {:.1} °C, altitude {:.1} m",
            pressure, temperature, altitude
        );
        Ok(Measurement {
            pressure,
            temperature,
            altitude,
        })
    }
}
