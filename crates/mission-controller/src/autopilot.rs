use mission_core::{Pose, Setpoint, VehicleSnapshot};
use std::future::Future;
use tokio::sync::watch;
use vehicle_link::{LinkState, LocalPose, PositionTarget, Vehicle, VehicleError, VehicleState};

/// Latest telemetry as seen by the tick loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    pub pose: Option<Pose>,
    pub vehicle: VehicleSnapshot,
}

/// The downstream vehicle transport driven by the tick loop.
pub trait Autopilot: Send + 'static {
    /// Latest values; must not wait on I/O.
    fn telemetry(&self) -> Telemetry;

    /// Queue a setpoint; must not wait on I/O.
    fn publish_setpoint(&self, setpoint: &Setpoint) -> Result<(), VehicleError>;

    /// Start a disarm request. The returned future is awaited off the tick loop.
    fn disarm(&self, force: bool) -> impl Future<Output = Result<(), VehicleError>> + Send + 'static;
}

/// [`Autopilot`] over a MAVLink [`Vehicle`].
pub struct LinkAutopilot {
    vehicle: Vehicle,
    state: watch::Receiver<VehicleState>,
    pose: watch::Receiver<Option<LocalPose>>,
    link: watch::Receiver<LinkState>,
}

impl LinkAutopilot {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            state: vehicle.state(),
            pose: vehicle.pose(),
            link: vehicle.link_state(),
            vehicle,
        }
    }
}

impl Autopilot for LinkAutopilot {
    fn telemetry(&self) -> Telemetry {
        let pose = self
            .pose
            .borrow()
            .map(|local| Pose::new(local.position, local.orientation));
        Telemetry {
            pose,
            vehicle: VehicleSnapshot {
                armed: self.state.borrow().armed,
                connected: *self.link.borrow() == LinkState::Connected,
            },
        }
    }

    fn publish_setpoint(&self, setpoint: &Setpoint) -> Result<(), VehicleError> {
        self.vehicle.publish_position_target(PositionTarget {
            position: setpoint.position,
            orientation: setpoint.orientation,
        })
    }

    fn disarm(&self, force: bool) -> impl Future<Output = Result<(), VehicleError>> + Send + 'static {
        let vehicle = self.vehicle.clone();
        async move { vehicle.disarm(force).await }
    }
}
