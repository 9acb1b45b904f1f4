//! Requires an ArduPilot or PX4 SITL instance streaming to
//! `VEHICLE_LINK_SITL_ADDR` (default `udpin:0.0.0.0:14550`).
//! Run with `cargo test -p vehicle-link -- --ignored`.

use nalgebra::{UnitQuaternion, Vector3};
use std::time::Duration;
use vehicle_link::{LinkState, PositionTarget, Vehicle, VehicleError};

const POSE_TIMEOUT: Duration = Duration::from_secs(30);

fn sitl_addr() -> String {
    std::env::var("VEHICLE_LINK_SITL_ADDR").unwrap_or_else(|_| String::from("udpin:0.0.0.0:14550"))
}

#[tokio::test]
#[ignore = "requires SITL"]
async fn streams_pose_and_accepts_setpoints() {
    let vehicle = Vehicle::connect(&sitl_addr()).await.unwrap();
    assert_eq!(*vehicle.link_state().borrow(), LinkState::Connected);

    let mut pose_rx = vehicle.pose();
    let pose = tokio::time::timeout(POSE_TIMEOUT, async {
        loop {
            if let Some(pose) = *pose_rx.borrow_and_update() {
                return pose;
            }
            pose_rx.changed().await.expect("pose channel closed");
        }
    })
    .await
    .expect("timed out waiting for local pose");
    assert!(pose.position.iter().all(|c| c.is_finite()));

    for _ in 0..20 {
        vehicle
            .publish_position_target(PositionTarget {
                position: Vector3::new(pose.position.x, pose.position.y, pose.position.z),
                orientation: UnitQuaternion::identity(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    vehicle.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "requires SITL"]
async fn disarm_on_ground_is_acknowledged() {
    let vehicle = Vehicle::connect(&sitl_addr()).await.unwrap();

    match vehicle.disarm(false).await {
        Ok(()) => {}
        // Some autopilots reject disarming an already disarmed vehicle.
        Err(VehicleError::CommandRejected { .. }) => {}
        Err(err) => panic!("unexpected disarm failure: {err}"),
    }
    assert!(!vehicle.state().borrow().armed);

    vehicle.disconnect().await.unwrap();
}
