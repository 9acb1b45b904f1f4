use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub armed: bool,
    /// Zero until the first HEARTBEAT.
    pub system_id: u8,
    pub component_id: u8,
    pub custom_mode: u32,
    pub system_status: SystemStatus,
}

impl VehicleState {
    pub fn heartbeat_seen(&self) -> bool {
        self.system_id != 0
    }
}

/// Latest local pose in ENU/FLU, z up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

/// Outbound local-frame setpoint in ENU/FLU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionTarget {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Unknown,
    Boot,
    Calibrating,
    Standby,
    Active,
    Critical,
    Emergency,
    Poweroff,
}

impl SystemStatus {
    pub(crate) fn from_mav(status: mavlink::common::MavState) -> Self {
        use mavlink::common::MavState;
        match status {
            MavState::MAV_STATE_BOOT => SystemStatus::Boot,
            MavState::MAV_STATE_CALIBRATING => SystemStatus::Calibrating,
            MavState::MAV_STATE_STANDBY => SystemStatus::Standby,
            MavState::MAV_STATE_ACTIVE => SystemStatus::Active,
            MavState::MAV_STATE_CRITICAL => SystemStatus::Critical,
            MavState::MAV_STATE_EMERGENCY => SystemStatus::Emergency,
            MavState::MAV_STATE_POWEROFF => SystemStatus::Poweroff,
            _ => SystemStatus::Unknown,
        }
    }
}

/// Internal state for watch channels (writer side).
pub(crate) struct StateWriters {
    pub vehicle_state: tokio::sync::watch::Sender<VehicleState>,
    pub pose: tokio::sync::watch::Sender<Option<LocalPose>>,
    pub link_state: tokio::sync::watch::Sender<LinkState>,
}

/// Reader-side channels.
pub(crate) struct StateChannels {
    pub vehicle_state: tokio::sync::watch::Receiver<VehicleState>,
    pub pose: tokio::sync::watch::Receiver<Option<LocalPose>>,
    pub link_state: tokio::sync::watch::Receiver<LinkState>,
}

pub(crate) fn create_channels() -> (StateWriters, StateChannels) {
    let (vs_tx, vs_rx) = tokio::sync::watch::channel(VehicleState::default());
    let (pose_tx, pose_rx) = tokio::sync::watch::channel(None);
    let (ls_tx, ls_rx) = tokio::sync::watch::channel(LinkState::default());

    let writers = StateWriters {
        vehicle_state: vs_tx,
        pose: pose_tx,
        link_state: ls_tx,
    };

    let channels = StateChannels {
        vehicle_state: vs_rx,
        pose: pose_rx,
        link_state: ls_rx,
    };

    (writers, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_start_connecting_without_pose() {
        let (_writers, channels) = create_channels();
        assert_eq!(*channels.link_state.borrow(), LinkState::Connecting);
        assert_eq!(LinkState::default(), LinkState::Connecting);
        assert!(channels.pose.borrow().is_none());
        assert!(!channels.vehicle_state.borrow().heartbeat_seen());
        assert_eq!(SystemStatus::default(), SystemStatus::Unknown);
    }
}
