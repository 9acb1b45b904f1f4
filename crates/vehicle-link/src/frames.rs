//! Conversions between the autopilot's NED/FRD convention and the ENU/FLU
//! convention used by callers. Both rotations are their own inverse, so the
//! same functions convert in either direction.

use nalgebra::{UnitQuaternion, Vector3};
use std::f64::consts::{FRAC_PI_2, PI};

fn ned_enu() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, FRAC_PI_2)
}

fn frd_flu() -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(PI, 0.0, 0.0)
}

/// Swap north/east and negate down.
pub fn swap_position(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.y, v.x, -v.z)
}

pub fn swap_orientation(q: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    ned_enu() * q * frd_flu()
}

/// NED heading in radians for an ENU/FLU orientation.
pub fn ned_yaw(enu: &UnitQuaternion<f64>) -> f64 {
    swap_orientation(enu).euler_angles().2
}

/// MAVLink attitude quaternions are `[w, x, y, z]`.
pub(crate) fn quaternion_from_wxyz(q: [f32; 4]) -> Option<UnitQuaternion<f64>> {
    let [w, x, y, z] = q.map(f64::from);
    UnitQuaternion::try_new(nalgebra::Quaternion::new(w, x, y, z), 1e-6)
}
