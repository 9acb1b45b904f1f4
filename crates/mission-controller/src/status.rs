use mission_core::{HoldReason, MissionState, Mode};
use serde::Serialize;

/// Operator-facing view of the controller, refreshed every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub calibrated: bool,
    pub mission_pending: bool,
    pub waypoint_index: Option<usize>,
    pub waypoint_count: Option<usize>,
    pub armed: bool,
    pub connected: bool,
    /// Why nothing was published on the last tick.
    pub holding: Option<String>,
}

impl StatusSnapshot {
    pub fn from_state(state: &MissionState, hold: Option<HoldReason>) -> Self {
        let vehicle = state.vehicle();
        Self {
            mode: state.mode(),
            calibrated: state.is_calibrated(),
            mission_pending: state.mission_pending(),
            waypoint_index: state.waypoint_index(),
            waypoint_count: state.waypoints().map(|w| w.len()),
            armed: vehicle.armed,
            connected: vehicle.connected,
            holding: hold.map(|reason| reason.to_string()),
        }
    }
}
