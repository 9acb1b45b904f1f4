use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable constants of the mission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionParams {
    /// Altitude of the LAUNCH hover target above the local origin.
    pub hover_altitude_m: f64,
    /// A waypoint counts as reached once the vehicle is strictly closer than this.
    pub capture_radius_m: f64,
    /// Maximum distance of the local position from the origin at calibration time.
    pub calibration_tolerance_m: f64,
    /// LAND divides the target altitude by this every tick.
    pub land_divisor: f64,
    /// LAND never commands an altitude below this.
    pub land_floor_m: f64,
    pub disarm_interval_ms: u64,
}

impl Default for MissionParams {
    fn default() -> Self {
        Self {
            hover_altitude_m: 1.5,
            capture_radius_m: 0.35,
            calibration_tolerance_m: 0.01,
            land_divisor: 1.5,
            land_floor_m: 0.2,
            disarm_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("{name} must be a positive finite number, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("land_divisor must be greater than 1, got {0}")]
    DivisorTooSmall(f64),
    #[error("disarm_interval_ms must be non-zero")]
    ZeroDisarmInterval,
}

impl MissionParams {
    pub fn disarm_interval(&self) -> Duration {
        Duration::from_millis(self.disarm_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ParamsError> {
        for (name, value) in [
            ("hover_altitude_m", self.hover_altitude_m),
            ("capture_radius_m", self.capture_radius_m),
            ("calibration_tolerance_m", self.calibration_tolerance_m),
            ("land_floor_m", self.land_floor_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ParamsError::NotPositive { name, value });
            }
        }
        if !(self.land_divisor.is_finite() && self.land_divisor > 1.0) {
            return Err(ParamsError::DivisorTooSmall(self.land_divisor));
        }
        if self.disarm_interval_ms == 0 {
            return Err(ParamsError::ZeroDisarmInterval);
        }
        Ok(())
    }
}
