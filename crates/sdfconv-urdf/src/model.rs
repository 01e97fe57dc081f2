//! Kinematic tree of links and joints
//!
//! Links are stored in an arena and addressed by [`LinkId`]. Each link keeps
//! its parent joint, its parent link and its children, so the reduction engine
//! can re-parent subtrees without touching ownership.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use nalgebra::{Matrix3, Vector3};
use sdfconv_core::Pose;

/// Prefix marking a shape group that was merged up from a lumped descendant
pub const LUMP_PREFIX: &str = "lump::";

/// Name of the implicit primary shape group
pub const DEFAULT_GROUP: &str = "default";

const LUMP_GROUP_SEPARATOR: &str = "::";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JointKind {
    Revolute,
    Continuous,
    Prismatic,
    Fixed,
    Floating,
    Planar,
}

impl JointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JointKind::Revolute => "revolute",
            JointKind::Continuous => "continuous",
            JointKind::Prismatic => "prismatic",
            JointKind::Fixed => "fixed",
            JointKind::Floating => "floating",
            JointKind::Planar => "planar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revolute" => Some(JointKind::Revolute),
            "continuous" => Some(JointKind::Continuous),
            "prismatic" => Some(JointKind::Prismatic),
            "fixed" => Some(JointKind::Fixed),
            "floating" => Some(JointKind::Floating),
            "planar" => Some(JointKind::Planar),
            _ => None,
        }
    }
}

impl fmt::Display for JointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
    pub effort: f64,
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDynamics {
    pub damping: f64,
    pub friction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub kind: JointKind,
    pub parent_link: String,
    pub child_link: String,
    /// Child frame expressed in the parent link frame
    pub origin: Pose,
    pub axis: Vector3<f64>,
    pub limits: Option<JointLimits>,
    pub dynamics: Option<JointDynamics>,
}

impl Joint {
    pub fn is_fixed(&self) -> bool {
        self.kind == JointKind::Fixed
    }
}

/// Mass properties of a link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inertial {
    /// Centre of mass frame in the link frame
    pub origin: Pose,
    pub mass: f64,
    pub ixx: f64,
    pub ixy: f64,
    pub ixz: f64,
    pub iyy: f64,
    pub iyz: f64,
    pub izz: f64,
}

impl Inertial {
    pub fn tensor(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.ixx, self.ixy, self.ixz, //
            self.ixy, self.iyy, self.iyz, //
            self.ixz, self.iyz, self.izz,
        )
    }

    pub fn set_tensor(&mut self, m: &Matrix3<f64>) {
        self.ixx = m[(0, 0)];
        self.ixy = m[(0, 1)];
        self.ixz = m[(0, 2)];
        self.iyy = m[(1, 1)];
        self.iyz = m[(1, 2)];
        self.izz = m[(2, 2)];
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Box { size: Vector3<f64> },
    Cylinder { radius: f64, length: f64 },
    Sphere { radius: f64 },
    Mesh { filename: String, scale: Vector3<f64> },
    /// Parsed from newer URDF, not expressible in SDF 1.3
    Capsule { radius: f64, length: f64 },
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Box { .. } => "box",
            Geometry::Cylinder { .. } => "cylinder",
            Geometry::Sphere { .. } => "sphere",
            Geometry::Mesh { .. } => "mesh",
            Geometry::Capsule { .. } => "capsule",
        }
    }
}

/// Identity of a shape, stable across lumping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeId(pub(crate) usize);

/// A visual or collision shape
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: ShapeId,
    pub name: Option<String>,
    /// Shape frame in the owning link frame
    pub origin: Pose,
    pub geometry: Option<Geometry>,
}

pub type ShapeGroups = BTreeMap<String, Vec<Shape>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub name: String,
    pub inertial: Option<Inertial>,
    pub visual_groups: ShapeGroups,
    pub collision_groups: ShapeGroups,
    pub parent: Option<LinkId>,
    pub parent_joint: Option<Joint>,
    pub children: Vec<LinkId>,
}

impl Link {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inertial: None,
            visual_groups: ShapeGroups::new(),
            collision_groups: ShapeGroups::new(),
            parent: None,
            parent_joint: None,
            children: Vec::new(),
        }
    }

    pub fn mass(&self) -> f64 {
        self.inertial.map_or(0.0, |i| i.mass)
    }

    pub fn is_fixed_to_parent(&self) -> bool {
        self.parent_joint.as_ref().is_some_and(Joint::is_fixed)
    }

    pub fn visual_count(&self) -> usize {
        self.visual_groups.values().map(Vec::len).sum()
    }

    pub fn collision_count(&self) -> usize {
        self.collision_groups.values().map(Vec::len).sum()
    }
}

/// Robot model: links in an arena, joints stored on their child links
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicTree {
    name: String,
    links: Vec<Link>,
    by_name: HashMap<String, LinkId>,
    root: LinkId,
}

impl KinematicTree {
    /// Assemble a tree; `links` must be non-empty and already wired up
    pub(crate) fn from_parts(name: String, links: Vec<Link>, root: LinkId) -> Self {
        let by_name = links
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), LinkId(i)))
            .collect();
        Self {
            name,
            links,
            by_name,
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> LinkId {
        self.root
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn link_mut(&mut self, id: LinkId) -> &mut Link {
        &mut self.links[id.0]
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.by_name.get(name).copied()
    }

    pub fn link_by_name(&self, name: &str) -> Option<&Link> {
        self.link_id(name).map(|id| self.link(id))
    }

    /// Every link ever parsed, including ones lumped away
    pub fn all_links(&self) -> impl Iterator<Item = (LinkId, &Link)> {
        self.links.iter().enumerate().map(|(i, l)| (LinkId(i), l))
    }

    /// Links reachable from the root, depth-first pre-order
    pub fn attached_links(&self) -> Vec<LinkId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.link(id).children.iter().rev().copied());
        }
        order
    }

    pub fn is_attached(&self, id: LinkId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == self.root {
                return true;
            }
            let parent = self.link(c).parent;
            if let Some(p) = parent {
                if !self.link(p).children.contains(&c) {
                    return false;
                }
            }
            current = parent;
        }
        false
    }

    /// Detach `child` from its current parent and append it to `new_parent`
    pub fn reparent(&mut self, child: LinkId, new_parent: LinkId) {
        if let Some(old) = self.link(child).parent {
            self.link_mut(old).children.retain(|c| *c != child);
        }
        let parent_name = self.link(new_parent).name.clone();
        let link = self.link_mut(child);
        link.parent = Some(new_parent);
        if let Some(joint) = link.parent_joint.as_mut() {
            joint.parent_link = parent_name;
        }
        self.link_mut(new_parent).children.push(child);
    }

    /// Remove `child` from its parent's child list; the link stays in the arena
    pub fn detach(&mut self, child: LinkId) {
        if let Some(parent) = self.link(child).parent {
            self.link_mut(parent).children.retain(|c| *c != child);
        }
    }

    pub fn total_visuals(&self) -> usize {
        self.links.iter().map(Link::visual_count).sum()
    }

    pub fn total_collisions(&self) -> usize {
        self.links.iter().map(Link::collision_count).sum()
    }
}

/// Split a lumped group key into the link it came from and, for a named
/// group of that link, the group name
pub fn lumped_parts(group: &str) -> Option<(&str, Option<&str>)> {
    let rest = group.strip_prefix(LUMP_PREFIX)?;
    Some(match rest.split_once(LUMP_GROUP_SEPARATOR) {
        Some((link, named)) => (link, Some(named)),
        None => (rest, None),
    })
}

/// Key a child's group is stored under once merged into its parent. Named
/// groups keep their name so lumped shapes stay distinguishable.
pub fn lumped_group_key(group: &str, child_link: &str) -> String {
    if group.starts_with(LUMP_PREFIX) {
        group.to_string()
    } else if group == DEFAULT_GROUP {
        format!("{}{}", LUMP_PREFIX, child_link)
    } else {
        format!("{}{}{}{}", LUMP_PREFIX, child_link, LUMP_GROUP_SEPARATOR, group)
    }
}
