//! Combining mass properties of rigidly attached links

use nalgebra::{Matrix3, UnitQuaternion, Vector3};
use sdfconv_core::Pose;

use crate::model::Inertial;

/// Mass properties of `child`, attached at `joint_origin`, merged into
/// `parent`. The result is expressed at the combined centre of mass with the
/// link's axes.
pub fn combine(parent: Option<&Inertial>, child: &Inertial, joint_origin: &Pose) -> Inertial {
    let child = transform(child, joint_origin);
    match parent {
        None => child,
        Some(parent) => merge(&transform(parent, &Pose::identity()), &child),
    }
}

/// Express `inertial` in the frame holding its link at `frame`, with the
/// tensor rotated onto that frame's axes
fn transform(inertial: &Inertial, frame: &Pose) -> Inertial {
    let rotation = (frame.rotation * inertial.origin.rotation).to_rotation_matrix();
    let r = rotation.matrix();
    let com = frame.rotation * inertial.origin.position + frame.position;

    let mut out = *inertial;
    out.origin = Pose::new(com, UnitQuaternion::identity());
    out.set_tensor(&(r * inertial.tensor() * r.transpose()));
    out
}

/// Both inputs must already share axes
fn merge(a: &Inertial, b: &Inertial) -> Inertial {
    let mass = a.mass + b.mass;
    if mass <= 0.0 {
        return *a;
    }
    let com = (a.origin.position * a.mass + b.origin.position * b.mass) / mass;

    let mut out = *a;
    out.mass = mass;
    out.origin = Pose::new(com, UnitQuaternion::identity());
    out.set_tensor(&(shifted(a, &com) + shifted(b, &com)));
    out
}

/// Tensor of `inertial` about `point` (parallel axis theorem)
fn shifted(inertial: &Inertial, point: &Vector3<f64>) -> Matrix3<f64> {
    let d = inertial.origin.position - point;
    inertial.tensor() + (Matrix3::identity() * d.dot(&d) - d * d.transpose()) * inertial.mass
}
