//! SDF document builder
//!
//! Walks a (possibly reduced) kinematic tree from the root and emits one
//! `<link>` per surviving link followed by the `<joint>` that attaches it.
//! Link poses are expressed in the model frame by composing joint origins
//! down the tree. Extension records are merged in as each link, shape and
//! joint is emitted.

use std::collections::HashSet;

use nalgebra::Vector3;
use sdfconv_core::{compose, Diagnostics, ElementId, ParamValue, Pose, Schema, Sdf};
use tracing::debug;

use crate::convert::ConvertOptions;
use crate::extension::{Extension, ExtensionStore};
use crate::model::{lumped_parts, Geometry, JointKind, KinematicTree, Link, LinkId, Shape, DEFAULT_GROUP};

/// Rotation magnitude below which an inertial frame counts as unrotated
const ROTATION_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    Collision,
    Visual,
}

impl ShapeKind {
    fn element(self) -> &'static str {
        match self {
            ShapeKind::Collision => "collision",
            ShapeKind::Visual => "visual",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ShapeKind::Collision => "collision",
            ShapeKind::Visual => "vis",
        }
    }
}

/// Name prefix of the `index`-th shape of `group`, and the link the shape
/// was originally written for
fn shape_prefix(link: &str, group: &str, index: usize) -> (String, String) {
    let (base, original) = if group == DEFAULT_GROUP {
        (link.to_string(), link.to_string())
    } else if let Some((origin, named)) = lumped_parts(group) {
        let base = match named {
            Some(named) => format!("{}_{}", origin, named),
            None => origin.to_string(),
        };
        (base, origin.to_string())
    } else {
        (format!("{}_{}", link, group), link.to_string())
    };
    let prefix = if index == 0 {
        base
    } else {
        format!("{}_{}", base, index)
    };
    (prefix, original)
}

/// Emitted element name for a shape, e.g. `base_collision` or `base_vis_camera`
fn shape_name(link: &str, prefix: &str, kind: ShapeKind) -> String {
    if prefix == link {
        format!("{}_{}", link, kind.suffix())
    } else {
        format!("{}_{}_{}", link, kind.suffix(), prefix)
    }
}

/// `package://` resources become `model://` URIs
fn mesh_uri(filename: &str) -> String {
    match filename.strip_prefix("package://") {
        Some(rest) => format!("model://{}", rest),
        None => filename.to_string(),
    }
}

pub struct SdfBuilder<'a> {
    options: &'a ConvertOptions,
    extensions: &'a ExtensionStore,
    diagnostics: &'a mut Diagnostics,
    sdf: Sdf,
    model: ElementId,
    emitted: HashSet<String>,
}

impl<'a> SdfBuilder<'a> {
    pub fn new(
        schema: &Schema,
        options: &'a ConvertOptions,
        extensions: &'a ExtensionStore,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        let mut sdf = Sdf::with_version(schema, &options.sdf_version);
        let root = sdf.root();
        let model = sdf.tree_mut().add_element(root, "model");
        Self {
            options,
            extensions,
            diagnostics,
            sdf,
            model,
            emitted: HashSet::new(),
        }
    }

    pub fn build(mut self, tree: &KinematicTree) -> Sdf {
        let model = self.model;
        self.set_attribute(model, "name", tree.name());

        let root = tree.root();
        if tree.link(root).name == self.options.root_link_name {
            for &child in &tree.link(root).children {
                self.create_sdf(tree, child, Pose::identity());
            }
        } else {
            self.create_sdf(tree, root, Pose::identity());
        }

        self.insert_model_extensions();
        self.report_unmatched();
        self.sdf
    }

    fn create_sdf(&mut self, tree: &KinematicTree, id: LinkId, transform: Pose) {
        let link = tree.link(id);
        let is_sentinel = link.name == self.options.root_link_name;

        if !is_sentinel && link.mass() <= 0.0 {
            self.report_dropped(tree, link);
            return;
        }

        let mut transform = transform;
        let parent_is_sentinel = link
            .parent
            .is_some_and(|p| tree.link(p).name == self.options.root_link_name);
        let lumped = self.options.reduce_fixed_joints && link.is_fixed_to_parent();
        if !is_sentinel && (parent_is_sentinel || !lumped) {
            self.create_link(tree, id, &mut transform);
        }

        for &child in &link.children {
            self.create_sdf(tree, child, transform);
        }
    }

    fn report_dropped(&mut self, tree: &KinematicTree, link: &Link) {
        if !link.children.is_empty() {
            let names: Vec<&str> = link.children.iter().map(|c| tree.link(*c).name.as_str()).collect();
            self.diagnostics.warn(format!(
                "Link [{}] has {} child link(s) [{}] that will be ignored along with their joints",
                link.name,
                names.len(),
                names.join(", ")
            ));
        }
        if let Some(joint) = &link.parent_joint {
            self.diagnostics.warn(format!(
                "Parent joint [{}] of link [{}] will be ignored",
                joint.name, link.name
            ));
        }
        self.diagnostics.warn(format!(
            "Link [{}] has no inertia and is not modeled in SDF",
            link.name
        ));
    }

    fn create_link(&mut self, tree: &KinematicTree, id: LinkId, transform: &mut Pose) {
        let link = tree.link(id);
        if let Some(joint) = &link.parent_joint {
            *transform = compose(&joint.origin, transform);
        }

        let model = self.model;
        let elem = self.add_child(model, "link");
        self.set_attribute(elem, "name", &link.name);
        self.add_value(elem, "pose", *transform);

        self.create_inertial(elem, link);
        self.create_shapes(elem, link, ShapeKind::Collision);
        self.create_shapes(elem, link, ShapeKind::Visual);
        self.insert_link_extensions(elem, &link.name);
        self.emitted.insert(link.name.clone());

        self.create_joint(tree, id, transform);
    }

    fn create_inertial(&mut self, link_elem: ElementId, link: &Link) {
        let Some(inertial) = link.inertial else {
            return;
        };
        if inertial.origin.rotation.angle() > ROTATION_EPSILON {
            self.diagnostics.warn(format!(
                "Inertial frame of link [{}] is rotated; SDF {} assumes principal axes aligned with the link",
                link.name, self.options.sdf_version
            ));
        }
        let elem = self.add_child(link_elem, "inertial");
        self.add_value(elem, "pose", inertial.origin);
        self.add_value(elem, "mass", inertial.mass);
        let tensor = self.add_child(elem, "inertia");
        for (key, value) in [
            ("ixx", inertial.ixx),
            ("ixy", inertial.ixy),
            ("ixz", inertial.ixz),
            ("iyy", inertial.iyy),
            ("iyz", inertial.iyz),
            ("izz", inertial.izz),
        ] {
            self.add_value(tensor, key, value);
        }
    }

    fn create_shapes(&mut self, link_elem: ElementId, link: &Link, kind: ShapeKind) {
        let groups = match kind {
            ShapeKind::Collision => &link.collision_groups,
            ShapeKind::Visual => &link.visual_groups,
        };
        // the default group is emitted first so the primary shape keeps the bare name
        let ordered = groups
            .get_key_value(DEFAULT_GROUP)
            .into_iter()
            .chain(groups.iter().filter(|(g, _)| g.as_str() != DEFAULT_GROUP));
        for (group, shapes) in ordered {
            for (index, shape) in shapes.iter().enumerate() {
                let (prefix, original) = shape_prefix(&link.name, group, index);
                let name = shape_name(&link.name, &prefix, kind);
                self.create_shape(link_elem, link, shape, kind, &name, &original);
            }
        }
    }

    fn create_shape(
        &mut self,
        link_elem: ElementId,
        link: &Link,
        shape: &Shape,
        kind: ShapeKind,
        name: &str,
        original: &str,
    ) {
        let Some(geometry) = &shape.geometry else {
            self.diagnostics.warn(format!(
                "{} [{}] of link [{}] has no usable geometry and was skipped",
                kind.element(),
                name,
                link.name
            ));
            return;
        };

        let elem = self.add_child(link_elem, kind.element());
        self.set_attribute(elem, "name", name);
        self.add_value(elem, "pose", shape.origin);
        if !self.create_geometry(elem, geometry, name) {
            self.sdf.tree_mut().remove_from_parent(elem);
            return;
        }

        let extensions = self.extensions;
        for ext in extensions.for_original(&link.name, original) {
            match kind {
                ShapeKind::Collision => self.insert_collision_extension(elem, ext),
                ShapeKind::Visual => {
                    if let Some(material) = &ext.material {
                        self.set_key_value(elem, "material", material.clone());
                    }
                }
            }
        }
    }

    /// False when the geometry has no SDF form
    fn create_geometry(&mut self, parent: ElementId, geometry: &Geometry, context: &str) -> bool {
        if let Geometry::Capsule { .. } = geometry {
            self.diagnostics.warn(format!(
                "Geometry [{}] of [{}] is not supported by SDF {}, shape skipped",
                geometry.kind(),
                context,
                self.options.sdf_version
            ));
            return false;
        }

        let geom = self.add_child(parent, "geometry");
        let shape = self.add_child(geom, geometry.kind());
        match geometry {
            Geometry::Box { size } => {
                self.add_value(shape, "size", *size);
            }
            Geometry::Cylinder { radius, length } => {
                self.add_value(shape, "radius", *radius);
                self.add_value(shape, "length", *length);
            }
            Geometry::Sphere { radius } => {
                self.add_value(shape, "radius", *radius);
            }
            Geometry::Mesh { filename, scale } => {
                if filename.is_empty() {
                    self.diagnostics
                        .error(format!("Mesh of [{}] has an empty filename", context));
                } else {
                    self.add_value(shape, "uri", mesh_uri(filename));
                }
                self.add_value(shape, "scale", *scale);
            }
            Geometry::Capsule { .. } => {}
        }
        true
    }

    fn insert_collision_extension(&mut self, elem: ElementId, ext: &Extension) {
        if let Some(v) = ext.laser_retro {
            self.set_key_value(elem, "laser_retro", v);
        }
        if !ext.has_surface() {
            return;
        }
        let surface = self.child(elem, "surface");
        if ext.has_friction() {
            let friction = self.child(surface, "friction");
            let ode = self.child(friction, "ode");
            if let Some(v) = ext.mu1 {
                self.set_key_value(ode, "mu", v);
            }
            if let Some(v) = ext.mu2 {
                self.set_key_value(ode, "mu2", v);
            }
            if let Some(v) = ext.fdir1 {
                self.set_key_value(ode, "fdir1", v);
            }
        }
        if ext.has_contact() {
            let contact = self.child(surface, "contact");
            let ode = self.child(contact, "ode");
            for (key, value) in [
                ("kp", ext.kp),
                ("kd", ext.kd),
                ("max_vel", ext.max_vel),
                ("min_depth", ext.min_depth),
            ] {
                if let Some(v) = value {
                    self.set_key_value(ode, key, v);
                }
            }
        }
    }

    fn insert_link_extensions(&mut self, elem: ElementId, link_name: &str) {
        let extensions = self.extensions;
        for ext in extensions.get(link_name) {
            if let Some(gravity) = ext.gravity {
                self.set_key_value(elem, "gravity", gravity);
            }
            if let Some(v) = ext.damping_factor {
                let decay = self.child(elem, "velocity_decay");
                self.set_key_value(decay, "linear", v);
                self.set_key_value(decay, "angular", v);
            }
            if let Some(v) = ext.self_collide {
                self.set_key_value(elem, "self_collide", v);
            }
            self.insert_blobs(elem, ext);
        }
    }

    fn create_joint(&mut self, tree: &KinematicTree, id: LinkId, transform: &Pose) {
        let link = tree.link(id);
        let Some(joint) = &link.parent_joint else {
            return;
        };
        let parent_is_sentinel = link
            .parent
            .is_some_and(|p| tree.link(p).name == self.options.root_link_name);
        if joint.is_fixed() && self.options.reduce_fixed_joints && !parent_is_sentinel {
            return;
        }

        let kind = match joint.kind {
            JointKind::Revolute | JointKind::Continuous | JointKind::Fixed => "revolute",
            JointKind::Prismatic => "prismatic",
            JointKind::Floating | JointKind::Planar => {
                self.diagnostics.warn(format!(
                    "Joint [{}] of type [{}] has no SDF {} equivalent and was dropped",
                    joint.name, joint.kind, self.options.sdf_version
                ));
                return;
            }
        };

        let model = self.model;
        let elem = self.add_child(model, "joint");
        self.set_attribute(elem, "name", &joint.name);
        self.set_attribute(elem, "type", kind);
        self.add_value(elem, "parent", joint.parent_link.clone());
        self.add_value(elem, "child", joint.child_link.clone());

        let axis = self.add_child(elem, "axis");
        let xyz: Vector3<f64> = transform.rotation * joint.axis;
        self.add_value(axis, "xyz", xyz);

        if joint.is_fixed() {
            // held in place by a zero-width range
            let limit = self.add_child(axis, "limit");
            self.add_value(limit, "lower", 0.0);
            self.add_value(limit, "upper", 0.0);
            let dynamics = self.add_child(axis, "dynamics");
            self.add_value(dynamics, "damping", 0.0);
        } else {
            if let Some(dynamics) = joint.dynamics {
                let elem = self.add_child(axis, "dynamics");
                self.add_value(elem, "damping", dynamics.damping);
                self.add_value(elem, "friction", dynamics.friction);
            }
            let limits = joint
                .limits
                .filter(|_| self.options.enforce_limits && joint.kind != JointKind::Continuous);
            if let Some(limits) = limits {
                let (lower, upper) = if limits.lower > limits.upper {
                    self.diagnostics.warn(format!(
                        "Joint [{}] has lower limit {} above upper limit {}, swapping them",
                        joint.name, limits.lower, limits.upper
                    ));
                    (limits.upper, limits.lower)
                } else {
                    (limits.lower, limits.upper)
                };
                let elem = self.add_child(axis, "limit");
                self.add_value(elem, "lower", lower);
                self.add_value(elem, "upper", upper);
                self.add_value(elem, "effort", limits.effort);
                self.add_value(elem, "velocity", limits.velocity);
            }
        }

        self.insert_joint_extensions(elem, &joint.name);
        self.emitted.insert(joint.name.clone());
    }

    fn insert_joint_extensions(&mut self, elem: ElementId, joint_name: &str) {
        let extensions = self.extensions;
        for ext in extensions.get(joint_name) {
            if ext.has_joint_physics() {
                let physics = self.child(elem, "physics");
                let ode = self.child(physics, "ode");
                if let Some(v) = ext.provide_feedback {
                    self.set_key_value(ode, "provide_feedback", v);
                }
                if let Some(v) = ext.cfm_damping {
                    self.set_key_value(ode, "cfm_damping", v);
                }
                if let Some(v) = ext.fudge_factor {
                    self.set_key_value(ode, "fudge_factor", v);
                }
                if ext.stop_cfm.is_some() || ext.stop_erp.is_some() {
                    let limit = self.child(ode, "limit");
                    if let Some(v) = ext.stop_cfm {
                        self.set_key_value(limit, "cfm", v);
                    }
                    if let Some(v) = ext.stop_erp {
                        self.set_key_value(limit, "erp", v);
                    }
                }
            }
            if ext.initial_joint_position.is_some() {
                self.diagnostics.info(format!(
                    "initialJointPosition of joint [{}] has no SDF {} equivalent and is ignored",
                    joint_name, self.options.sdf_version
                ));
            }
            self.insert_blobs(elem, ext);
        }
    }

    fn insert_model_extensions(&mut self) {
        let model = self.model;
        let extensions = self.extensions;
        for ext in extensions.document_scope() {
            if let Some(v) = ext.is_static {
                self.set_key_value(model, "static", v);
            }
            self.insert_blobs(model, ext);
        }
    }

    fn insert_blobs(&mut self, parent: ElementId, ext: &Extension) {
        let tree = self.sdf.tree_mut();
        for blob in &ext.blobs {
            let fragment = blob.fragment();
            let copy = tree.import(fragment.tree(), fragment.root());
            tree.insert_element(parent, copy);
            debug!(kind = blob.kind(), parent = %tree.name(parent), "Inserted extension blob");
        }
    }

    fn report_unmatched(&mut self) {
        for reference in self.extensions.references() {
            if !reference.is_empty() && !self.emitted.contains(reference) {
                self.diagnostics.info(format!(
                    "Extension reference [{}] does not match any emitted link or joint",
                    reference
                ));
            }
        }
    }

    // ---- element helpers ---------------------------------------------------

    fn add_child(&mut self, parent: ElementId, name: &str) -> ElementId {
        self.sdf.tree_mut().add_element(parent, name)
    }

    fn child(&mut self, parent: ElementId, name: &str) -> ElementId {
        self.sdf.tree_mut().get_element(parent, name)
    }

    fn set_attribute(&mut self, elem: ElementId, key: &str, value: &str) {
        if let Err(e) = self.sdf.tree_mut().set_attribute(elem, key, value) {
            self.diagnostics
                .error(format!("Unable to set attribute [{}]: {}", key, e));
        }
    }

    /// Append `<key>value</key>` under `parent`
    fn add_value<T: ParamValue>(&mut self, parent: ElementId, key: &str, value: T) -> ElementId {
        let tree = self.sdf.tree_mut();
        let elem = tree.add_element(parent, key);
        if !tree.set(elem, value) {
            self.diagnostics.error(format!(
                "Unable to set value of <{}> in <{}>",
                key,
                tree.name(parent)
            ));
        }
        elem
    }

    /// Like [`add_value`](Self::add_value), replacing an existing `<key>`
    /// and warning when the value differs
    fn set_key_value<T: ParamValue>(&mut self, parent: ElementId, key: &str, value: T) -> ElementId {
        let new = value.into_value();
        let tree = self.sdf.tree_mut();
        if let Some(existing) = tree.element(parent, key) {
            let old = tree.value(existing).map(|v| v.as_string()).unwrap_or_default();
            if old != new.to_string() {
                self.diagnostics.warn(format!(
                    "Multiple inconsistent <{}> values in <{}> after fixed joint reduction, \
                     overwriting [{}] with [{}]",
                    key,
                    tree.name(parent),
                    old,
                    new
                ));
            }
            tree.remove_from_parent(existing);
        }
        let elem = tree.add_element(parent, key);
        let stored = match tree.value_mut(elem) {
            Some(param) => param.set_from_str(&new.to_string()).is_ok(),
            None => false,
        };
        if !stored {
            self.diagnostics.error(format!(
                "Unable to set value of <{}> in <{}>",
                key,
                tree.name(parent)
            ));
        }
        elem
    }
}
