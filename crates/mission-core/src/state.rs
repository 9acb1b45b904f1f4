use crate::calibration::{CalibrationOutcome, CalibrationSample, FrameCalibrator, FrameTransform};
use crate::geometry::{Point3, Pose};
use crate::params::MissionParams;
use crate::waypoints::{IngestOutcome, WaypointIngestor, WaypointList};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    Launch,
    Test,
    Land,
    Abort,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Launch => "LAUNCH",
            Mode::Test => "TEST",
            Mode::Land => "LAND",
            Mode::Abort => "ABORT",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Operator trigger. Any command is accepted in any mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorCommand {
    Launch,
    Test,
    Land,
    Abort,
}

impl OperatorCommand {
    pub fn target_mode(self) -> Mode {
        match self {
            OperatorCommand::Launch => Mode::Launch,
            OperatorCommand::Test => Mode::Test,
            OperatorCommand::Land => Mode::Land,
            OperatorCommand::Abort => Mode::Abort,
        }
    }

    fn announcement(self) -> &'static str {
        match self {
            OperatorCommand::Launch => "launch requested, vehicle should take off",
            OperatorCommand::Test => "test requested, vehicle should fly the mission",
            OperatorCommand::Land => "land requested, vehicle should land",
            OperatorCommand::Abort => "abort requested, vehicle should descend and disarm immediately",
        }
    }
}

/// Latest vehicle status flags relevant to the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub armed: bool,
    pub connected: bool,
}

/// Everything the mode controller reads, owned by the tick loop.
#[derive(Debug, Clone)]
pub struct MissionState {
    mode: Mode,
    pose: Option<Pose>,
    calibrator: FrameCalibrator,
    ingestor: WaypointIngestor,
    waypoint_index: Option<usize>,
    vehicle: VehicleSnapshot,
}

impl MissionState {
    pub fn new(params: &MissionParams) -> Self {
        Self {
            mode: Mode::Idle,
            pose: None,
            calibrator: FrameCalibrator::new(params.calibration_tolerance_m),
            ingestor: WaypointIngestor::new(),
            waypoint_index: None,
            vehicle: VehicleSnapshot::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pose(&self) -> Option<&Pose> {
        self.pose.as_ref()
    }

    pub fn transform(&self) -> Option<&FrameTransform> {
        self.calibrator.transform()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    pub fn waypoints(&self) -> Option<&WaypointList> {
        self.ingestor.waypoints()
    }

    /// A mission upload is held until calibration completes.
    pub fn mission_pending(&self) -> bool {
        self.ingestor.has_pending()
    }

    pub fn waypoint_index(&self) -> Option<usize> {
        self.waypoint_index
    }

    pub fn vehicle(&self) -> VehicleSnapshot {
        self.vehicle
    }

    /// Returns `true` when the mode changed.
    pub fn apply_command(&mut self, command: OperatorCommand) -> bool {
        let next = command.target_mode();
        if next == self.mode {
            return false;
        }
        info!(from = %self.mode, to = %next, "{}", command.announcement());
        self.mode = next;
        true
    }

    /// Replace the pose with the latest telemetry. `None` keeps the last known pose.
    pub fn update_pose(&mut self, pose: Option<Pose>) {
        if let Some(pose) = pose {
            self.pose = Some(pose);
        }
    }

    pub fn update_vehicle(&mut self, vehicle: VehicleSnapshot) {
        self.vehicle = vehicle;
    }

    pub fn submit_calibration(&mut self, sample: &CalibrationSample) -> CalibrationOutcome {
        let local = self.pose.map(|p| p.position);
        let outcome = self.calibrator.calibrate(sample, local.as_ref());

        if let CalibrationOutcome::Accepted(transform) = outcome {
            if let Some(ingested) = self.ingestor.resume(&transform) {
                self.on_ingested(ingested);
            }
        }
        outcome
    }

    pub fn submit_mission(&mut self, points: Vec<Point3>) -> IngestOutcome {
        let outcome = self.ingestor.submit(points, self.calibrator.transform());
        self.on_ingested(outcome);
        outcome
    }

    fn on_ingested(&mut self, outcome: IngestOutcome) {
        if let IngestOutcome::Ingested { count } = outcome {
            info!(count, "mission ingested, starting at waypoint 0");
            self.waypoint_index = Some(0);
        }
    }

    /// Move to the next waypoint, saturating at the last one.
    /// Returns the new index when it changed.
    pub(crate) fn advance_waypoint(&mut self) -> Option<usize> {
        let last = self.waypoints()?.last_index();
        let index = self.waypoint_index?;
        if index >= last {
            return None;
        }
        self.waypoint_index = Some(index + 1);
        self.waypoint_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationRejected;
    use nalgebra::UnitQuaternion;

    fn at_origin() -> Pose {
        Pose::new(Point3::zeros(), UnitQuaternion::identity())
    }

    fn identity_sample() -> CalibrationSample {
        CalibrationSample {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn starts_idle_and_uncalibrated() {
        let state = MissionState::new(&MissionParams::default());
        assert_eq!(state.mode(), Mode::Idle);
        assert!(state.pose().is_none());
        assert!(!state.is_calibrated());
        assert!(state.waypoint_index().is_none());
    }

    #[test]
    fn commands_are_last_write_wins() {
        let mut state = MissionState::new(&MissionParams::default());
        assert!(state.apply_command(OperatorCommand::Abort));
        assert!(state.apply_command(OperatorCommand::Launch));
        assert!(!state.apply_command(OperatorCommand::Launch));
        assert!(state.apply_command(OperatorCommand::Land));
        assert_eq!(state.mode(), Mode::Land);
    }

    #[test]
    fn calibration_needs_a_pose() {
        let mut state = MissionState::new(&MissionParams::default());
        assert_eq!(
            state.submit_calibration(&identity_sample()),
            CalibrationOutcome::Rejected(CalibrationRejected::PoseUnknown)
        );
        state.update_pose(Some(at_origin()));
        assert!(matches!(
            state.submit_calibration(&identity_sample()),
            CalibrationOutcome::Accepted(_)
        ));
    }

    #[test]
    fn deferred_mission_resumes_on_calibration() {
        let mut state = MissionState::new(&MissionParams::default());
        state.update_pose(Some(at_origin()));

        assert_eq!(
            state.submit_mission(vec![Point3::new(1.0, 0.0, 1.0)]),
            IngestOutcome::Deferred
        );
        assert!(state.waypoints().is_none());
        assert!(state.waypoint_index().is_none());
        assert!(state.mission_pending());

        state.submit_calibration(&identity_sample());
        assert_eq!(state.waypoints().map(|w| w.len()), Some(1));
        assert_eq!(state.waypoint_index(), Some(0));
        assert!(!state.mission_pending());
    }

    #[test]
    fn missing_pose_update_keeps_last_pose() {
        let mut state = MissionState::new(&MissionParams::default());
        state.update_pose(Some(at_origin()));
        state.update_pose(None);
        assert_eq!(state.pose(), Some(&at_origin()));
    }

    #[test]
    fn advance_saturates_at_last_waypoint() {
        let mut state = MissionState::new(&MissionParams::default());
        state.update_pose(Some(at_origin()));
        state.submit_calibration(&identity_sample());
        state.submit_mission(vec![Point3::zeros(), Point3::new(1.0, 0.0, 0.0)]);

        assert_eq!(state.advance_waypoint(), Some(1));
        assert_eq!(state.advance_waypoint(), None);
        assert_eq!(state.waypoint_index(), Some(1));
    }
}
