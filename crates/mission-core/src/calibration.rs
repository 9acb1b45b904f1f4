use crate::geometry::{unit_quaternion_xyzw, Point3};
use nalgebra::{Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One pose measurement of the vehicle taken in the external frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub position: [f64; 3],
    /// Unit quaternion in `[x, y, z, w]` order.
    pub orientation: [f64; 4],
}

/// Rigid transform from the external frame to the local navigation frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
}

impl FrameTransform {
    /// The local origin sits at `position` in the external frame, with the
    /// local axes rotated by `orientation`. The transform is the inverse of
    /// that pose.
    pub fn from_external_pose(position: Point3, orientation: UnitQuaternion<f64>) -> Self {
        let measured = orientation.to_rotation_matrix();
        let rotation = measured.transpose();
        let translation = -(rotation * position);
        Self {
            rotation,
            translation,
        }
    }

    pub fn rotation(&self) -> &Rotation3<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn external_to_local(&self, point: &Point3) -> Point3 {
        self.rotation * point + self.translation
    }

    pub fn local_to_external(&self, point: &Point3) -> Point3 {
        self.rotation.transpose() * (point - self.translation)
    }

    /// 4x4 homogeneous form with the bottom row fixed to `[0, 0, 0, 1]`.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CalibrationRejected {
    #[error("local pose not received yet")]
    PoseUnknown,
    #[error("local position {distance_m:.3} m from origin exceeds {tolerance_m} m")]
    TooFarFromOrigin { distance_m: f64, tolerance_m: f64 },
    #[error("sample orientation is not a valid quaternion")]
    InvalidOrientation,
    #[error("sample position is not finite")]
    InvalidPosition,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationOutcome {
    Accepted(FrameTransform),
    /// A transform already exists; the sample was ignored.
    AlreadyCalibrated,
    /// Calibration stays pending and may be retried with a later sample.
    Rejected(CalibrationRejected),
}

/// Computes the external-to-local transform from the first acceptable sample.
#[derive(Debug, Clone)]
pub struct FrameCalibrator {
    tolerance_m: f64,
    transform: Option<FrameTransform>,
}

impl FrameCalibrator {
    pub fn new(tolerance_m: f64) -> Self {
        Self {
            tolerance_m,
            transform: None,
        }
    }

    pub fn transform(&self) -> Option<&FrameTransform> {
        self.transform.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.transform.is_some()
    }

    pub fn calibrate(
        &mut self,
        sample: &CalibrationSample,
        local_position: Option<&Point3>,
    ) -> CalibrationOutcome {
        if self.transform.is_some() {
            return CalibrationOutcome::AlreadyCalibrated;
        }

        match self.check(sample, local_position) {
            Ok(transform) => {
                info!(matrix = %transform.to_homogeneous(), "external frame transform obtained");
                self.transform = Some(transform);
                CalibrationOutcome::Accepted(transform)
            }
            Err(reason) => {
                warn!("calibration sample rejected: {reason}");
                CalibrationOutcome::Rejected(reason)
            }
        }
    }

    fn check(
        &self,
        sample: &CalibrationSample,
        local_position: Option<&Point3>,
    ) -> Result<FrameTransform, CalibrationRejected> {
        let local = local_position.ok_or(CalibrationRejected::PoseUnknown)?;
        let distance_m = local.norm();
        if !(distance_m <= self.tolerance_m) {
            return Err(CalibrationRejected::TooFarFromOrigin {
                distance_m,
                tolerance_m: self.tolerance_m,
            });
        }

        let position = Point3::from(sample.position);
        if !position.iter().all(|c| c.is_finite()) {
            return Err(CalibrationRejected::InvalidPosition);
        }
        let orientation = unit_quaternion_xyzw(sample.orientation)
            .ok_or(CalibrationRejected::InvalidOrientation)?;

        Ok(FrameTransform::from_external_pose(position, orientation))
    }
}
