use crate::command::Command;
use crate::config::VehicleConfig;
use crate::error::VehicleError;
use crate::frames;
use crate::state::{LinkState, LocalPose, PositionTarget, StateWriters, SystemStatus, VehicleState};
use mavlink::common::{self, MavCmd, MavModeFlag};
use mavlink::error::MessageReadError;
use mavlink::{AsyncMavConnection, MavHeader};
use nalgebra::{UnitQuaternion, Vector3};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const MAGIC_FORCE_DISARM_VALUE: f32 = 21196.0;
const RETRY_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Velocity, acceleration and yaw-rate are ignored: only position and yaw
/// are commanded.
fn position_and_yaw_mask() -> common::PositionTargetTypemask {
    use common::PositionTargetTypemask as M;
    M::POSITION_TARGET_TYPEMASK_VX_IGNORE
        | M::POSITION_TARGET_TYPEMASK_VY_IGNORE
        | M::POSITION_TARGET_TYPEMASK_VZ_IGNORE
        | M::POSITION_TARGET_TYPEMASK_AX_IGNORE
        | M::POSITION_TARGET_TYPEMASK_AY_IGNORE
        | M::POSITION_TARGET_TYPEMASK_AZ_IGNORE
        | M::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE
}

type Connection = dyn AsyncMavConnection<common::MavMessage> + Sync + Send;

/// The autopilot this link talks to, learned from its heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VehicleTarget {
    system_id: u8,
    component_id: u8,
}

/// A COMMAND_LONG waiting for its COMMAND_ACK.
struct PendingCommand {
    command: MavCmd,
    params: [f32; 7],
    target: VehicleTarget,
    attempts: u8,
    deadline: Instant,
    reply: oneshot::Sender<Result<(), VehicleError>>,
}

/// Pairs the separate position and attitude streams into one pose.
#[derive(Debug, Default)]
struct PoseAssembler {
    position: Option<Vector3<f64>>,
    orientation: Option<UnitQuaternion<f64>>,
}

impl PoseAssembler {
    fn pose(&self) -> Option<LocalPose> {
        Some(LocalPose {
            position: self.position?,
            orientation: self.orientation?,
        })
    }
}

pub(crate) async fn run_event_loop(
    connection: Box<Connection>,
    mut command_rx: mpsc::Receiver<Command>,
    state_writers: StateWriters,
    config: VehicleConfig,
    cancel: CancellationToken,
) {
    let mut vehicle_target: Option<VehicleTarget> = None;
    let mut pose = PoseAssembler::default();
    let mut pending: Vec<PendingCommand> = Vec::new();

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut retry_check = tokio::time::interval(RETRY_CHECK_INTERVAL);
    retry_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let _ = state_writers.link_state.send(LinkState::Connected);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("event loop cancelled");
                let _ = state_writers.link_state.send(LinkState::Disconnected);
                break;
            }
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    Command::Shutdown => {
                        debug!("event loop shutdown requested");
                        let _ = state_writers.link_state.send(LinkState::Disconnected);
                        break;
                    }
                    cmd => {
                        handle_command(cmd, &*connection, &vehicle_target, &config, &mut pending).await;
                    }
                }
            }
            result = connection.recv() => {
                match result {
                    Ok((header, msg)) => {
                        update_vehicle_target(&mut vehicle_target, &header, &msg);
                        resolve_ack(&msg, &mut pending);
                        update_state(&header, &msg, &state_writers, &vehicle_target, &mut pose);
                    }
                    Err(MessageReadError::Io(err)) => {
                        warn!("MAVLink recv error: {err}");
                        let _ = state_writers.link_state.send(LinkState::Error(err.to_string()));
                        break;
                    }
                    Err(err) => {
                        trace!("dropping unparseable frame: {err}");
                    }
                }
            }
            _ = heartbeat.tick() => {
                if let Err(err) = send_heartbeat(&*connection, &config).await {
                    warn!("failed to send heartbeat: {err}");
                }
            }
            _ = retry_check.tick() => {
                retry_expired(&*connection, &config, &mut pending).await;
            }
        }
    }

    for command in pending {
        let _ = command.reply.send(Err(VehicleError::Disconnected));
    }
}

fn is_autopilot_heartbeat(hb: &common::HEARTBEAT_DATA) -> bool {
    hb.autopilot != common::MavAutopilot::MAV_AUTOPILOT_INVALID
        && hb.mavtype != common::MavType::MAV_TYPE_GCS
        && hb.mavtype != common::MavType::MAV_TYPE_ONBOARD_CONTROLLER
}

fn update_vehicle_target(
    vehicle_target: &mut Option<VehicleTarget>,
    header: &MavHeader,
    message: &common::MavMessage,
) {
    if header.system_id == 0 {
        return;
    }

    if let common::MavMessage::HEARTBEAT(hb) = message {
        if !is_autopilot_heartbeat(hb) {
            return;
        }
        let target = VehicleTarget {
            system_id: header.system_id,
            component_id: header.component_id,
        };
        if vehicle_target.as_ref() != Some(&target) {
            info!(
                system_id = target.system_id,
                component_id = target.component_id,
                autopilot = ?hb.autopilot,
                vehicle_type = ?hb.mavtype,
                "autopilot heartbeat"
            );
            *vehicle_target = Some(target);
        }
    }
}

fn is_from_target(header: &MavHeader, vehicle_target: &Option<VehicleTarget>) -> bool {
    vehicle_target.is_some_and(|t| t.system_id == header.system_id)
}

fn update_state(
    header: &MavHeader,
    message: &common::MavMessage,
    writers: &StateWriters,
    vehicle_target: &Option<VehicleTarget>,
    pose: &mut PoseAssembler,
) {
    if !is_from_target(header, vehicle_target) {
        return;
    }

    match message {
        common::MavMessage::HEARTBEAT(hb) if is_autopilot_heartbeat(hb) => {
            let armed = hb
                .base_mode
                .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
            if armed != writers.vehicle_state.borrow().armed {
                info!(armed, "vehicle arming state changed");
            }

            let _ = writers.vehicle_state.send(VehicleState {
                armed,
                system_id: header.system_id,
                component_id: header.component_id,
                custom_mode: hb.custom_mode,
                system_status: SystemStatus::from_mav(hb.system_status),
            });
        }
        common::MavMessage::LOCAL_POSITION_NED(data) => {
            let ned = Vector3::new(data.x as f64, data.y as f64, data.z as f64);
            pose.position = Some(frames::swap_position(&ned));
            publish_pose(writers, pose);
        }
        common::MavMessage::ATTITUDE_QUATERNION(data) => {
            match frames::quaternion_from_wxyz([data.q1, data.q2, data.q3, data.q4]) {
                Some(ned) => {
                    pose.orientation = Some(frames::swap_orientation(&ned));
                    publish_pose(writers, pose);
                }
                None => trace!("ignoring degenerate attitude quaternion"),
            }
        }
        _ => {
            trace!("unhandled message type");
        }
    }
}

fn publish_pose(writers: &StateWriters, pose: &PoseAssembler) {
    if let Some(pose) = pose.pose() {
        let _ = writers.pose.send(Some(pose));
    }
}

// ---------------------------------------------------------------------------
// Command handling
// ---------------------------------------------------------------------------

async fn handle_command(
    cmd: Command,
    connection: &Connection,
    vehicle_target: &Option<VehicleTarget>,
    config: &VehicleConfig,
    pending: &mut Vec<PendingCommand>,
) {
    match cmd {
        Command::Disarm { force, reply } => {
            let Some(target) = *vehicle_target else {
                let _ = reply.send(Err(VehicleError::IdentityUnknown));
                return;
            };
            let param2 = if force { MAGIC_FORCE_DISARM_VALUE } else { 0.0 };
            start_command_long(
                MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
                [0.0, param2, 0.0, 0.0, 0.0, 0.0, 0.0],
                target,
                reply,
                connection,
                config,
                pending,
            )
            .await;
        }
        Command::PositionTarget(setpoint) => {
            let Some(target) = *vehicle_target else {
                trace!("dropping setpoint, no autopilot heartbeat yet");
                return;
            };
            if let Err(err) =
                send_message(connection, config, position_target_message(&setpoint, target)).await
            {
                warn!("failed to send position target: {err}");
            }
        }
        Command::Shutdown => {
            // Handled in the main loop
        }
    }
}

fn position_target_message(setpoint: &PositionTarget, target: VehicleTarget) -> common::MavMessage {
    let ned = frames::swap_position(&setpoint.position);
    let yaw = frames::ned_yaw(&setpoint.orientation);

    common::MavMessage::SET_POSITION_TARGET_LOCAL_NED(common::SET_POSITION_TARGET_LOCAL_NED_DATA {
        time_boot_ms: 0,
        target_system: target.system_id,
        target_component: target.component_id,
        coordinate_frame: common::MavFrame::MAV_FRAME_LOCAL_NED,
        type_mask: position_and_yaw_mask(),
        x: ned.x as f32,
        y: ned.y as f32,
        z: ned.z as f32,
        vx: 0.0,
        vy: 0.0,
        vz: 0.0,
        afx: 0.0,
        afy: 0.0,
        afz: 0.0,
        yaw: yaw as f32,
        yaw_rate: 0.0,
    })
}

async fn send_message(
    connection: &Connection,
    config: &VehicleConfig,
    message: common::MavMessage,
) -> Result<(), VehicleError> {
    connection
        .send(
            &MavHeader {
                system_id: config.system_id,
                component_id: config.component_id,
                sequence: 0,
            },
            &message,
        )
        .await
        .map(|_| ())
        .map_err(|err| VehicleError::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string())))
}

async fn send_heartbeat(connection: &Connection, config: &VehicleConfig) -> Result<(), VehicleError> {
    send_message(
        connection,
        config,
        common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: common::MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::empty(),
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        }),
    )
    .await
}

fn command_long_message(command: MavCmd, params: [f32; 7], target: VehicleTarget) -> common::MavMessage {
    common::MavMessage::COMMAND_LONG(common::COMMAND_LONG_DATA {
        target_system: target.system_id,
        target_component: target.component_id,
        command,
        confirmation: 0,
        param1: params[0],
        param2: params[1],
        param3: params[2],
        param4: params[3],
        param5: params[4],
        param6: params[5],
        param7: params[6],
    })
}

async fn start_command_long(
    command: MavCmd,
    params: [f32; 7],
    target: VehicleTarget,
    reply: oneshot::Sender<Result<(), VehicleError>>,
    connection: &Connection,
    config: &VehicleConfig,
    pending: &mut Vec<PendingCommand>,
) {
    // A newer request for the same command supersedes the old one.
    if let Some(index) = pending.iter().position(|p| p.command == command) {
        let previous = pending.swap_remove(index);
        let _ = previous.reply.send(Err(VehicleError::Cancelled));
    }

    if let Err(err) = send_message(connection, config, command_long_message(command, params, target)).await {
        let _ = reply.send(Err(err));
        return;
    }

    pending.push(PendingCommand {
        command,
        params,
        target,
        attempts: 1,
        deadline: Instant::now() + config.retry_policy.request_timeout(),
        reply,
    });
}

fn resolve_ack(message: &common::MavMessage, pending: &mut Vec<PendingCommand>) {
    let common::MavMessage::COMMAND_ACK(ack) = message else {
        return;
    };
    let Some(index) = pending.iter().position(|p| p.command == ack.command) else {
        return;
    };
    if ack.result == common::MavResult::MAV_RESULT_IN_PROGRESS {
        return;
    }

    let command = pending.swap_remove(index);
    let result = if ack.result == common::MavResult::MAV_RESULT_ACCEPTED {
        Ok(())
    } else {
        Err(VehicleError::CommandRejected {
            command: format!("{:?}", command.command),
            result: format!("{:?}", ack.result),
        })
    };
    let _ = command.reply.send(result);
}

async fn retry_expired(connection: &Connection, config: &VehicleConfig, pending: &mut Vec<PendingCommand>) {
    let now = Instant::now();
    let policy = config.retry_policy;

    for mut command in std::mem::take(pending) {
        if command.deadline > now {
            pending.push(command);
            continue;
        }
        if command.attempts > policy.max_retries {
            debug!(command = ?command.command, attempts = command.attempts, "command timed out");
            let _ = command.reply.send(Err(VehicleError::Timeout));
            continue;
        }

        let message = command_long_message(command.command, command.params, command.target);
        match send_message(connection, config, message).await {
            Ok(()) => {
                command.attempts += 1;
                command.deadline = now + policy.request_timeout();
                pending.push(command);
            }
            Err(err) => {
                let _ = command.reply.send(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_channels;

    const AUTOPILOT: MavHeader = MavHeader {
        system_id: 1,
        component_id: 1,
        sequence: 0,
    };

    fn heartbeat(armed: bool) -> common::MavMessage {
        let base_mode = if armed {
            MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        } else {
            MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        };
        common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            custom_mode: 4,
            mavtype: common::MavType::MAV_TYPE_QUADROTOR,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            system_status: common::MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    fn feed(
        msg: &common::MavMessage,
        header: &MavHeader,
        writers: &StateWriters,
        target: &mut Option<VehicleTarget>,
        pose: &mut PoseAssembler,
    ) {
        update_vehicle_target(target, header, msg);
        update_state(header, msg, writers, target, pose);
    }

    #[test]
    fn heartbeat_sets_armed_state() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let mut pose = PoseAssembler::default();

        feed(&heartbeat(true), &AUTOPILOT, &writers, &mut target, &mut pose);
        let state = channels.vehicle_state.borrow().clone();
        assert!(state.armed);
        assert!(state.heartbeat_seen());
        assert_eq!(state.custom_mode, 4);
        assert_eq!(state.system_status, SystemStatus::Active);

        feed(&heartbeat(false), &AUTOPILOT, &writers, &mut target, &mut pose);
        assert!(!channels.vehicle_state.borrow().armed);
    }

    #[test]
    fn gcs_heartbeat_is_not_a_target() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let mut pose = PoseAssembler::default();

        let gcs = common::MavMessage::HEARTBEAT(common::HEARTBEAT_DATA {
            mavtype: common::MavType::MAV_TYPE_GCS,
            autopilot: common::MavAutopilot::MAV_AUTOPILOT_INVALID,
            ..Default::default()
        });
        let header = MavHeader {
            system_id: 255,
            component_id: 190,
            sequence: 0,
        };
        feed(&gcs, &header, &writers, &mut target, &mut pose);
        assert_eq!(target, None);
        assert!(!channels.vehicle_state.borrow().heartbeat_seen());
    }

    #[test]
    fn pose_needs_position_and_attitude() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let mut pose = PoseAssembler::default();
        feed(&heartbeat(false), &AUTOPILOT, &writers, &mut target, &mut pose);

        let position = common::MavMessage::LOCAL_POSITION_NED(common::LOCAL_POSITION_NED_DATA {
            x: 1.0,
            y: 2.0,
            z: -3.0,
            ..Default::default()
        });
        feed(&position, &AUTOPILOT, &writers, &mut target, &mut pose);
        assert!(channels.pose.borrow().is_none());

        let attitude = common::MavMessage::ATTITUDE_QUATERNION(common::ATTITUDE_QUATERNION_DATA {
            q1: 1.0,
            ..Default::default()
        });
        feed(&attitude, &AUTOPILOT, &writers, &mut target, &mut pose);

        let local = (*channels.pose.borrow()).expect("pose should be assembled");
        assert!((local.position - Vector3::new(2.0, 1.0, 3.0)).norm() < 1e-6);
        let (_, _, yaw) = local.orientation.euler_angles();
        assert!((yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn telemetry_before_heartbeat_is_ignored() {
        let (writers, channels) = create_channels();
        let mut target = None;
        let mut pose = PoseAssembler::default();

        let position = common::MavMessage::LOCAL_POSITION_NED(common::LOCAL_POSITION_NED_DATA {
            x: 1.0,
            ..Default::default()
        });
        feed(&position, &AUTOPILOT, &writers, &mut target, &mut pose);
        assert!(pose.position.is_none());
        assert!(channels.pose.borrow().is_none());
    }

    fn pending_disarm() -> (PendingCommand, oneshot::Receiver<Result<(), VehicleError>>) {
        let (reply, rx) = oneshot::channel();
        let command = PendingCommand {
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            params: [0.0; 7],
            target: VehicleTarget {
                system_id: 1,
                component_id: 1,
            },
            attempts: 1,
            deadline: Instant::now() + Duration::from_secs(1),
            reply,
        };
        (command, rx)
    }

    fn ack(result: common::MavResult) -> common::MavMessage {
        common::MavMessage::COMMAND_ACK(common::COMMAND_ACK_DATA {
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            result,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn accepted_ack_resolves_pending_command() {
        let (command, mut rx) = pending_disarm();
        let mut pending = vec![command];

        resolve_ack(&ack(common::MavResult::MAV_RESULT_IN_PROGRESS), &mut pending);
        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().is_err());

        resolve_ack(&ack(common::MavResult::MAV_RESULT_ACCEPTED), &mut pending);
        assert!(pending.is_empty());
        assert!(matches!(rx.await, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn denied_ack_reports_rejection() {
        let (command, rx) = pending_disarm();
        let mut pending = vec![command];

        resolve_ack(&ack(common::MavResult::MAV_RESULT_DENIED), &mut pending);
        assert!(pending.is_empty());
        assert!(matches!(
            rx.await,
            Ok(Err(VehicleError::CommandRejected { .. }))
        ));
    }

    #[test]
    fn setpoint_is_converted_to_ned() {
        let target = VehicleTarget {
            system_id: 1,
            component_id: 1,
        };
        let setpoint = PositionTarget {
            position: Vector3::new(1.0, 2.0, 1.5),
            orientation: UnitQuaternion::identity(),
        };
        let common::MavMessage::SET_POSITION_TARGET_LOCAL_NED(data) =
            position_target_message(&setpoint, target)
        else {
            panic!("wrong message type");
        };
        assert_eq!((data.x, data.y, data.z), (2.0, 1.0, -1.5));
        assert!((data.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(data.coordinate_frame, common::MavFrame::MAV_FRAME_LOCAL_NED);

        use common::PositionTargetTypemask as M;
        assert!(!data.type_mask.contains(M::POSITION_TARGET_TYPEMASK_YAW_IGNORE));
        assert!(!data.type_mask.intersects(
            M::POSITION_TARGET_TYPEMASK_X_IGNORE
                | M::POSITION_TARGET_TYPEMASK_Y_IGNORE
                | M::POSITION_TARGET_TYPEMASK_Z_IGNORE
        ));
        assert!(data.type_mask.contains(M::POSITION_TARGET_TYPEMASK_YAW_RATE_IGNORE));
        assert_eq!(data.type_mask.bits(), 0x09F8);
    }
}
