use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point in meters.
pub type Point3 = Vector3<f64>;

/// Vehicle pose in the local navigation frame (ENU, z up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(position: Point3, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn distance_to(&self, point: &Point3) -> f64 {
        (self.position - point).norm()
    }
}

/// Target pose commanded to the low-level controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Setpoint {
    pub position: Point3,
    pub orientation: UnitQuaternion<f64>,
}

impl Setpoint {
    pub fn new(position: Point3, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Normalise a quaternion given in `[x, y, z, w]` order.
pub fn unit_quaternion_xyzw(q: [f64; 4]) -> Option<UnitQuaternion<f64>> {
    let [x, y, z, w] = q;
    if !q.iter().all(|c| c.is_finite()) {
        return None;
    }
    UnitQuaternion::try_new(Quaternion::new(w, x, y, z), MIN_QUATERNION_NORM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xyzw_order_is_preserved() {
        let q = unit_quaternion_xyzw([0.0, 0.0, 0.0, 2.0]).unwrap();
        assert_eq!(q, UnitQuaternion::identity());

        let half = std::f64::consts::FRAC_1_SQRT_2;
        let yaw90 = unit_quaternion_xyzw([0.0, 0.0, half, half]).unwrap();
        let (_, _, yaw) = yaw90.euler_angles();
        assert!((yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn degenerate_quaternion_is_rejected() {
        assert!(unit_quaternion_xyzw([0.0, 0.0, 0.0, 0.0]).is_none());
        assert!(unit_quaternion_xyzw([f64::NAN, 0.0, 0.0, 1.0]).is_none());
        assert!(unit_quaternion_xyzw([0.0, 0.0, f64::INFINITY, 1.0]).is_none());
    }

    #[test]
    fn distance_is_euclidean() {
        let pose = Pose::new(Point3::new(1.0, 2.0, 2.0), UnitQuaternion::identity());
        assert!((pose.distance_to(&Point3::zeros()) - 3.0).abs() < 1e-12);
    }
}
