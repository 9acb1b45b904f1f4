use crate::geometry::{Point3, Setpoint};
use crate::params::MissionParams;
use crate::state::{MissionState, Mode};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why no setpoint was produced this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    Idle,
    PoseUnknown,
    Uncalibrated,
}

impl std::fmt::Display for HoldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HoldReason::Idle => "idle, waiting for an operator command",
            HoldReason::PoseUnknown => "local pose not received yet",
            HoldReason::Uncalibrated => "waiting for the external frame transform",
        })
    }
}

/// Result of one controller evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutput {
    pub setpoint: Option<Setpoint>,
    pub hold: Option<HoldReason>,
    /// Issue a disarm request this tick.
    pub disarm: bool,
}

impl TickOutput {
    fn publish(setpoint: Setpoint) -> Self {
        Self {
            setpoint: Some(setpoint),
            hold: None,
            disarm: false,
        }
    }

    fn hold(reason: HoldReason) -> Self {
        Self {
            setpoint: None,
            hold: Some(reason),
            disarm: false,
        }
    }
}

/// Per-tick setpoint generation for every [`Mode`].
///
/// Targets latched on mode entry are kept here, so the controller must see
/// every tick of a mission.
#[derive(Debug, Clone)]
pub struct ModeController {
    params: MissionParams,
    active: Mode,
    hover: Option<Setpoint>,
    land: Option<Setpoint>,
    abort: Option<Setpoint>,
    /// Survives mode changes so re-entering ABORT keeps the retry interval.
    last_disarm_attempt: Option<Instant>,
    last_hold: Option<HoldReason>,
    mission_complete: bool,
}

impl ModeController {
    pub fn new(params: MissionParams) -> Self {
        Self {
            params,
            active: Mode::Idle,
            hover: None,
            land: None,
            abort: None,
            last_disarm_attempt: None,
            last_hold: None,
            mission_complete: false,
        }
    }

    pub fn evaluate(&mut self, state: &mut MissionState, now: Instant) -> TickOutput {
        let mode = state.mode();
        if mode != self.active {
            self.enter(mode);
        }

        let output = match mode {
            Mode::Idle => TickOutput::hold(HoldReason::Idle),
            Mode::Launch => match self.hover_target(state) {
                Ok(setpoint) => TickOutput::publish(setpoint),
                Err(reason) => TickOutput::hold(reason),
            },
            Mode::Test => self.evaluate_test(state),
            Mode::Land => self.evaluate_land(state),
            Mode::Abort => self.evaluate_abort(state, now),
        };

        self.report_hold(output.hold);
        output
    }

    fn enter(&mut self, mode: Mode) {
        debug!(from = %self.active, to = %mode, "entering mode");
        let keeps_hover = matches!(
            (self.active, mode),
            (Mode::Launch, Mode::Test) | (Mode::Test, Mode::Launch)
        );
        if !keeps_hover {
            self.hover = None;
        }
        self.land = None;
        self.abort = None;
        self.last_hold = None;
        self.active = mode;
    }

    fn report_hold(&mut self, hold: Option<HoldReason>) {
        if hold == self.last_hold {
            return;
        }
        if let Some(reason) = hold {
            if reason == HoldReason::Idle {
                info!("mode is {}, {reason}", self.active);
            } else {
                warn!("mode {} holding: {reason}", self.active);
            }
        }
        self.last_hold = hold;
    }

    /// The LAUNCH target, computed once both the pose and transform are known.
    fn hover_target(&mut self, state: &MissionState) -> Result<Setpoint, HoldReason> {
        let pose = state.pose().ok_or(HoldReason::PoseUnknown)?;
        if !state.is_calibrated() {
            return Err(HoldReason::Uncalibrated);
        }
        let altitude = self.params.hover_altitude_m;
        Ok(*self.hover.get_or_insert_with(|| {
            info!(altitude, "hover target set");
            Setpoint::new(Point3::new(0.0, 0.0, altitude), pose.orientation)
        }))
    }

    fn evaluate_test(&mut self, state: &mut MissionState) -> TickOutput {
        let hover = match self.hover_target(state) {
            Ok(setpoint) => setpoint,
            Err(reason) => return TickOutput::hold(reason),
        };

        let (Some(list), Some(index), Some(pose)) =
            (state.waypoints(), state.waypoint_index(), state.pose())
        else {
            debug!("waiting for waypoints, holding hover");
            return TickOutput::publish(hover);
        };
        let Some(target) = list.get(index).copied() else {
            return TickOutput::publish(hover);
        };

        let distance = pose.distance_to(&target);
        let setpoint = Setpoint::new(target, hover.orientation);

        if distance < self.params.capture_radius_m {
            match state.advance_waypoint() {
                Some(next) => info!(reached = index, next, distance, "waypoint captured"),
                None if !self.mission_complete => {
                    info!(reached = index, "final waypoint captured, holding position");
                    self.mission_complete = true;
                }
                None => {}
            }
        }

        TickOutput::publish(setpoint)
    }

    fn evaluate_land(&mut self, state: &MissionState) -> TickOutput {
        let Some(pose) = state.pose() else {
            return TickOutput::hold(HoldReason::PoseUnknown);
        };
        let floor = self.params.land_floor_m;
        let target = self.land.get_or_insert_with(|| {
            info!(altitude = pose.position.z, "descending from current position");
            let mut position = pose.position;
            position.z = position.z.max(floor);
            Setpoint::new(position, pose.orientation)
        });

        let setpoint = *target;
        target.position.z = descend(target.position.z, self.params.land_divisor, floor);
        TickOutput::publish(setpoint)
    }

    fn evaluate_abort(&mut self, state: &MissionState, now: Instant) -> TickOutput {
        let setpoint = state.pose().map(|pose| {
            *self.abort.get_or_insert_with(|| {
                Setpoint::new(
                    Point3::new(pose.position.x, pose.position.y, 0.0),
                    pose.orientation,
                )
            })
        });

        let interval = self.params.disarm_interval();
        let due = self
            .last_disarm_attempt
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        let disarm = state.vehicle().armed && due;
        if disarm {
            self.last_disarm_attempt = Some(now);
        }

        let mut output = match setpoint {
            Some(setpoint) => TickOutput::publish(setpoint),
            None => TickOutput::hold(HoldReason::PoseUnknown),
        };
        output.disarm = disarm;
        output
    }
}

/// Geometric descent, never below `floor`.
fn descend(z: f64, divisor: f64, floor: f64) -> f64 {
    (z / divisor).max(floor)
}
