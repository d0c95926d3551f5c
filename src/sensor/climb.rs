//! # Climb Tracker
//!
//! Cumulative altitude gained over the life of the device.
//!
//! Consecutive readings jitter by a meter or so even at rest. A reading only
//! moves the baseline once it differs from it by more than the discrimination
//! threshold; when it moves up the difference is added to the climb. Descents
//! move the baseline down but never subtract.
//!
//! ```
//! use altimeter_sync::sensor::climb::ClimbTracker;
//!
//! let mut climb = ClimbTracker::default();
//! climb.update(100.0, 2.0);
//! climb.update(101.0, 2.0); // jitter, ignored
//! climb.update(110.0, 2.0);
//! climb.update(90.0, 2.0);  // descent, not subtracted
//! assert_eq!(climb.climbed(), 10.0);
//! ```

use serde::{Deserialize, Serialize};

/// Accumulates ascent across readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClimbTracker {
    /// Altitude [m] the next reading is compared against
    baseline: Option<f32>,
    /// Total ascent [m]
    climbed: f32,
}

impl ClimbTracker {
    /// Feed one altitude reading and return the updated cumulative climb.
    ///
    /// # Arguments
    ///
    /// * `altitude` - Current altitude in meters
    /// * `threshold` - Minimum change in meters that counts as movement
    pub fn update(&mut self, altitude: f32, threshold: f32) -> f32 {
        match self.baseline {
            None => self.baseline = Some(altitude),
            Some(baseline) => {
                let delta = altitude - baseline;
                if delta.abs() > threshold {
                    if delta > 0.0 {
                        self.climbed += delta;
                    }
                    self.baseline = Some(altitude);
                }
            }
        }
        self.climbed
    }

    /// Total ascent so far in meters
    pub fn climbed(&self) -> f32 {
        self.climbed
    }

    /// Altitude the next reading is compared against
    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reading_sets_baseline_only() {
        let mut climb = ClimbTracker::default();
        assert_eq!(climb.update(250.0, 1.0), 0.0);
        assert_eq!(climb.baseline(), Some(250.0));
    }

    #[test]
    fn test_jitter_below_threshold_is_ignored() {
        let mut climb = ClimbTracker::default();
        climb.update(100.0, 1.5);
        climb.update(101.0, 1.5);
        climb.update(99.0, 1.5);
        climb.update(101.4, 1.5);
        assert_eq!(climb.climbed(), 0.0);
        assert_eq!(climb.baseline(), Some(100.0));
    }

    #[test]
    fn test_slow_drift_accumulates_once_threshold_exceeded() {
        let mut climb = ClimbTracker::default();
        climb.update(100.0, 1.5);
        climb.update(101.0, 1.5);
        climb.update(102.0, 1.5);
        assert_eq!(climb.climbed(), 2.0);
        assert_eq!(climb.baseline(), Some(102.0));
    }

    #[test]
    fn test_descent_never_subtracts() {
        let mut climb = ClimbTracker::default();
        climb.update(100.0, 1.0);
        climb.update(150.0, 1.0);
        climb.update(120.0, 1.0);
        climb.update(130.0, 1.0);
        assert_eq!(climb.climbed(), 60.0);
    }

    #[test]
    fn test_climb_is_monotonic() {
        let mut climb = ClimbTracker::default();
        let mut last = 0.0;
        for altitude in [10.0, 30.0, 5.0, -20.0, 40.0, 39.0, 80.0] {
            let now = climb.update(altitude, 2.0);
            assert!(now >= last);
            last = now;
        }
    }
}
