//! Mode state machine and frame math for a single-vehicle mission.
//!
//! Nothing here performs I/O: the tick loop owns a [`MissionState`], feeds it
//! telemetry and operator input, and asks [`ModeController::evaluate`] for the
//! next setpoint.

pub mod calibration;
pub mod controller;
pub mod geometry;
pub mod params;
pub mod state;
pub mod waypoints;

pub use calibration::{CalibrationOutcome, CalibrationRejected, CalibrationSample, FrameCalibrator, FrameTransform};
pub use controller::{HoldReason, ModeController, TickOutput};
pub use geometry::{Point3, Pose, Setpoint};
pub use params::{MissionParams, ParamsError};
pub use state::{MissionState, Mode, OperatorCommand, VehicleSnapshot};
pub use waypoints::{IngestError, IngestOutcome, WaypointIngestor, WaypointList};
