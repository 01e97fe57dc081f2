//! Poses and frame composition
//!
//! A [`Pose`] is a rigid transform (position plus orientation) expressed in a
//! parent frame. Orientation is stored as a unit quaternion; the textual form
//! is `x y z roll pitch yaw` with fixed-axis roll/pitch/yaw in radians.

use std::fmt;
use std::str::FromStr;

use nalgebra::{UnitQuaternion, Vector3};

use crate::param::format_number;

/// Rigid transform relative to a parent frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Build from a translation and fixed-axis roll/pitch/yaw angles
    pub fn from_xyz_rpy(xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        Self {
            position: Vector3::new(xyz[0], xyz[1], xyz[2]),
            rotation: UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
        }
    }

    pub fn from_array(arr: [f64; 6]) -> Self {
        Self::from_xyz_rpy([arr[0], arr[1], arr[2]], [arr[3], arr[4], arr[5]])
    }

    pub fn to_array(&self) -> [f64; 6] {
        let [roll, pitch, yaw] = self.rpy();
        [
            self.position.x,
            self.position.y,
            self.position.z,
            roll,
            pitch,
            yaw,
        ]
    }

    pub fn xyz(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }

    pub fn rpy(&self) -> [f64; 3] {
        let (roll, pitch, yaw) = self.rotation.euler_angles();
        [roll, pitch, yaw]
    }

    pub fn is_identity(&self, eps: f64) -> bool {
        self.approx_eq(&Pose::identity(), eps)
    }

    /// Compare positions component-wise and orientations by the angle between them
    pub fn approx_eq(&self, other: &Pose, eps: f64) -> bool {
        (self.position - other.position).amax() <= eps
            && self.rotation.angle_to(&other.rotation) <= eps
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.to_array().iter().map(|v| format_number(*v)).collect();
        f.write_str(&parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoseParseError(pub String);

impl fmt::Display for PoseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected six numbers in pose, got [{}]", self.0)
    }
}

impl std::error::Error for PoseParseError {}

impl FromStr for Pose {
    type Err = PoseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_pose_string(s).ok_or_else(|| PoseParseError(s.to_string()))
    }
}

/// Parse a pose string "x y z roll pitch yaw" into a Pose
pub fn parse_pose_string(s: &str) -> Option<Pose> {
    let parts = parse_numbers(s)?;
    if parts.len() == 6 {
        Some(Pose::from_array([
            parts[0], parts[1], parts[2], parts[3], parts[4], parts[5],
        ]))
    } else {
        None
    }
}

/// Parse "x y z" into a vector
pub fn parse_vector3(s: &str) -> Option<Vector3<f64>> {
    let parts = parse_numbers(s)?;
    if parts.len() == 3 {
        Some(Vector3::new(parts[0], parts[1], parts[2]))
    } else {
        None
    }
}

pub fn format_vector3(v: &Vector3<f64>) -> String {
    format!(
        "{} {} {}",
        format_number(v.x),
        format_number(v.y),
        format_number(v.z)
    )
}

fn parse_numbers(s: &str) -> Option<Vec<f64>> {
    s.split_whitespace()
        .map(|p| p.parse::<f64>().ok())
        .collect()
}

/// Re-express `child` (given in a child frame) in the parent frame, where
/// `parent_to_child` is the child frame's pose in the parent.
///
/// The child position is rotated by the frame rotation, then translated.
pub fn compose(child: &Pose, parent_to_child: &Pose) -> Pose {
    Pose {
        position: parent_to_child.rotation * child.position + parent_to_child.position,
        rotation: parent_to_child.rotation * child.rotation,
    }
}

/// Undo [`compose`]: bring a parent-frame pose back into the child frame.
pub fn inverse_compose(pose: &Pose, parent_to_child: &Pose) -> Pose {
    let inv = parent_to_child.rotation.inverse();
    Pose {
        position: inv * (pose.position - parent_to_child.position),
        rotation: inv * pose.rotation,
    }
}
