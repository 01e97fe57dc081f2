//! URDF reader
//!
//! The XML is deserialized with quick-xml's serde support into plain structs,
//! then assembled into a [`KinematicTree`]. Malformed structure is an error.
//! Every numeric attribute is read as text so that a malformed number
//! (`mass value="1kg"`, `xyz="1 two 3"`) is reported as a warning and
//! replaced by a default instead of failing the whole document.

use std::collections::HashMap;
use std::path::Path;

use nalgebra::Vector3;
use quick_xml::de::from_str;
use sdfconv_core::pose::parse_vector3;
use sdfconv_core::{Diagnostics, Pose};
use serde::Deserialize;

use crate::error::UrdfError;
use crate::model::{
    Geometry, Inertial, Joint, JointDynamics, JointKind, JointLimits, KinematicTree, Link, LinkId,
    Shape, ShapeGroups, ShapeId, DEFAULT_GROUP,
};

#[derive(Debug, Deserialize)]
struct RobotXml {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(default)]
    link: Vec<LinkXml>,
    #[serde(default)]
    joint: Vec<JointXml>,
}

#[derive(Debug, Deserialize)]
struct LinkXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default)]
    inertial: Option<InertialXml>,
    #[serde(default)]
    visual: Vec<ShapeXml>,
    #[serde(default)]
    collision: Vec<ShapeXml>,
}

#[derive(Debug, Default, Deserialize)]
struct OriginXml {
    #[serde(rename = "@xyz", default)]
    xyz: Option<String>,
    #[serde(rename = "@rpy", default)]
    rpy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InertialXml {
    #[serde(default)]
    origin: Option<OriginXml>,
    #[serde(default)]
    mass: Option<MassXml>,
    #[serde(default)]
    inertia: Option<InertiaXml>,
}

#[derive(Debug, Deserialize)]
struct MassXml {
    #[serde(rename = "@value", default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InertiaXml {
    #[serde(rename = "@ixx", default)]
    ixx: Option<String>,
    #[serde(rename = "@ixy", default)]
    ixy: Option<String>,
    #[serde(rename = "@ixz", default)]
    ixz: Option<String>,
    #[serde(rename = "@iyy", default)]
    iyy: Option<String>,
    #[serde(rename = "@iyz", default)]
    iyz: Option<String>,
    #[serde(rename = "@izz", default)]
    izz: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShapeXml {
    #[serde(rename = "@name", default)]
    name: Option<String>,
    #[serde(rename = "@group", default)]
    group: Option<String>,
    #[serde(default)]
    origin: Option<OriginXml>,
    #[serde(default)]
    geometry: Option<GeometryXml>,
}

#[derive(Debug, Deserialize)]
struct GeometryXml {
    #[serde(rename = "box", default)]
    box_geom: Option<BoxXml>,
    #[serde(default)]
    cylinder: Option<CylinderXml>,
    #[serde(default)]
    sphere: Option<SphereXml>,
    #[serde(default)]
    mesh: Option<MeshXml>,
    #[serde(default)]
    capsule: Option<CylinderXml>,
}

#[derive(Debug, Deserialize)]
struct BoxXml {
    #[serde(rename = "@size", default)]
    size: String,
}

#[derive(Debug, Deserialize)]
struct CylinderXml {
    #[serde(rename = "@radius", default)]
    radius: Option<String>,
    #[serde(rename = "@length", default)]
    length: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SphereXml {
    #[serde(rename = "@radius", default)]
    radius: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeshXml {
    #[serde(rename = "@filename", default)]
    filename: String,
    #[serde(rename = "@scale", default)]
    scale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JointXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type")]
    kind: String,
    #[serde(default)]
    origin: Option<OriginXml>,
    parent: LinkRefXml,
    child: LinkRefXml,
    #[serde(default)]
    axis: Option<AxisXml>,
    #[serde(default)]
    limit: Option<LimitXml>,
    #[serde(default)]
    dynamics: Option<DynamicsXml>,
}

#[derive(Debug, Deserialize)]
struct LinkRefXml {
    #[serde(rename = "@link")]
    link: String,
}

#[derive(Debug, Deserialize)]
struct AxisXml {
    #[serde(rename = "@xyz", default)]
    xyz: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LimitXml {
    #[serde(rename = "@lower", default)]
    lower: Option<String>,
    #[serde(rename = "@upper", default)]
    upper: Option<String>,
    #[serde(rename = "@effort", default)]
    effort: Option<String>,
    #[serde(rename = "@velocity", default)]
    velocity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DynamicsXml {
    #[serde(rename = "@damping", default)]
    damping: Option<String>,
    #[serde(rename = "@friction", default)]
    friction: Option<String>,
}

/// Parse URDF text into a kinematic tree
pub fn parse_urdf(xml: &str, diagnostics: &mut Diagnostics) -> Result<KinematicTree, UrdfError> {
    let robot: RobotXml = from_str(xml).map_err(|e| UrdfError::ParseError(e.to_string()))?;
    TreeAssembler::new(diagnostics).assemble(robot)
}

pub fn parse_urdf_file(path: &Path, diagnostics: &mut Diagnostics) -> Result<KinematicTree, UrdfError> {
    let content = std::fs::read_to_string(path)?;
    parse_urdf(&content, diagnostics)
}

struct TreeAssembler<'a> {
    diagnostics: &'a mut Diagnostics,
    next_shape: usize,
}

impl<'a> TreeAssembler<'a> {
    fn new(diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            diagnostics,
            next_shape: 0,
        }
    }

    fn assemble(mut self, robot: RobotXml) -> Result<KinematicTree, UrdfError> {
        if robot.link.is_empty() {
            return Err(UrdfError::NoLinks(robot.name));
        }

        let mut links: Vec<Link> = Vec::with_capacity(robot.link.len());
        let mut index: HashMap<String, LinkId> = HashMap::new();
        for link_xml in robot.link {
            if index.contains_key(&link_xml.name) {
                return Err(UrdfError::DuplicateLink(link_xml.name));
            }
            index.insert(link_xml.name.clone(), LinkId(links.len()));
            links.push(self.link(link_xml));
        }

        for joint_xml in robot.joint {
            let joint = self.joint(joint_xml)?;
            let lookup = |name: &str| {
                index.get(name).copied().ok_or_else(|| UrdfError::UnknownLink {
                    joint: joint.name.clone(),
                    link: name.to_string(),
                })
            };
            let parent = lookup(&joint.parent_link)?;
            let child = lookup(&joint.child_link)?;

            let child_link = &mut links[child.0];
            if child_link.parent_joint.is_some() {
                return Err(UrdfError::MultipleParents(child_link.name.clone()));
            }
            child_link.parent = Some(parent);
            child_link.parent_joint = Some(joint);
            links[parent.0].children.push(child);
        }

        let roots: Vec<LinkId> = (0..links.len())
            .map(LinkId)
            .filter(|id| links[id.0].parent.is_none())
            .collect();
        let root = match roots.as_slice() {
            [] => return Err(UrdfError::NoRootLink),
            [root] => *root,
            many => {
                return Err(UrdfError::MultipleRoots(
                    many.iter().map(|id| links[id.0].name.clone()).collect(),
                ))
            }
        };

        let tree = KinematicTree::from_parts(robot.name, links, root);
        let attached = tree.attached_links();
        if attached.len() != tree.all_links().count() {
            let missing = tree
                .all_links()
                .filter(|(id, _)| !attached.contains(id))
                .map(|(_, l)| l.name.clone())
                .collect();
            return Err(UrdfError::Disconnected(missing));
        }
        Ok(tree)
    }

    fn link(&mut self, xml: LinkXml) -> Link {
        let mut link = Link::new(&xml.name);
        link.inertial = xml.inertial.map(|i| self.inertial(&xml.name, i));
        link.visual_groups = self.groups(&xml.name, "visual", xml.visual);
        link.collision_groups = self.groups(&xml.name, "collision", xml.collision);
        link
    }

    fn inertial(&mut self, link: &str, xml: InertialXml) -> Inertial {
        let origin = self.origin(&format!("inertial of link [{}]", link), xml.origin.as_ref());
        let context = format!("inertial of link [{}]", link);
        let mass = match xml.mass.and_then(|m| m.value) {
            Some(text) => self.number(&context, "mass", Some(text.as_str()), 0.0),
            None => {
                self.diagnostics
                    .warn(format!("Inertial of link [{}] has no mass, using 0", link));
                0.0
            }
        };
        let inertia = xml.inertia.unwrap_or_default();
        Inertial {
            origin,
            mass,
            ixx: self.number(&context, "ixx", inertia.ixx.as_deref(), 0.0),
            ixy: self.number(&context, "ixy", inertia.ixy.as_deref(), 0.0),
            ixz: self.number(&context, "ixz", inertia.ixz.as_deref(), 0.0),
            iyy: self.number(&context, "iyy", inertia.iyy.as_deref(), 0.0),
            iyz: self.number(&context, "iyz", inertia.iyz.as_deref(), 0.0),
            izz: self.number(&context, "izz", inertia.izz.as_deref(), 0.0),
        }
    }

    fn groups(&mut self, link: &str, kind: &str, shapes: Vec<ShapeXml>) -> ShapeGroups {
        let mut groups = ShapeGroups::new();
        for xml in shapes {
            let context = format!("{} of link [{}]", kind, link);
            let group = xml.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_string());
            let shape = Shape {
                id: ShapeId(self.next_shape),
                name: xml.name.clone(),
                origin: self.origin(&context, xml.origin.as_ref()),
                geometry: xml.geometry.and_then(|g| self.geometry(&context, g)),
            };
            self.next_shape += 1;
            groups.entry(group).or_default().push(shape);
        }
        groups
    }

    fn geometry(&mut self, context: &str, xml: GeometryXml) -> Option<Geometry> {
        if let Some(b) = xml.box_geom {
            return match parse_vector3(&b.size) {
                Some(size) => Some(Geometry::Box { size }),
                None => {
                    self.diagnostics.warn(format!(
                        "Unable to parse box size [{}] in {}",
                        b.size, context
                    ));
                    None
                }
            };
        }
        if let Some(c) = xml.cylinder {
            return Some(Geometry::Cylinder {
                radius: self.dimension(context, "cylinder radius", c.radius.as_deref()),
                length: self.dimension(context, "cylinder length", c.length.as_deref()),
            });
        }
        if let Some(s) = xml.sphere {
            return Some(Geometry::Sphere {
                radius: self.dimension(context, "sphere radius", s.radius.as_deref()),
            });
        }
        if let Some(m) = xml.mesh {
            let scale = match m.scale.as_deref() {
                None => Vector3::new(1.0, 1.0, 1.0),
                Some(text) => parse_vector3(text).unwrap_or_else(|| {
                    self.diagnostics.warn(format!(
                        "Unable to parse mesh scale [{}] in {}, using 1 1 1",
                        text, context
                    ));
                    Vector3::new(1.0, 1.0, 1.0)
                }),
            };
            return Some(Geometry::Mesh {
                filename: m.filename,
                scale,
            });
        }
        if let Some(c) = xml.capsule {
            return Some(Geometry::Capsule {
                radius: self.dimension(context, "capsule radius", c.radius.as_deref()),
                length: self.dimension(context, "capsule length", c.length.as_deref()),
            });
        }
        None
    }

    fn joint(&mut self, xml: JointXml) -> Result<Joint, UrdfError> {
        let kind = JointKind::parse(&xml.kind).ok_or_else(|| UrdfError::UnknownJointType {
            joint: xml.name.clone(),
            kind: xml.kind.clone(),
        })?;
        let context = format!("joint [{}]", xml.name);
        let origin = self.origin(&context, xml.origin.as_ref());
        let axis = match xml.axis.and_then(|a| a.xyz) {
            None => Vector3::x(),
            Some(text) => parse_vector3(&text).unwrap_or_else(|| {
                self.diagnostics.warn(format!(
                    "Unable to parse axis [{}] in {}, using 1 0 0",
                    text, context
                ));
                Vector3::x()
            }),
        };
        let limits = xml.limit.map(|l| JointLimits {
            lower: self.number(&context, "limit lower", l.lower.as_deref(), 0.0),
            upper: self.number(&context, "limit upper", l.upper.as_deref(), 0.0),
            effort: self.number(&context, "limit effort", l.effort.as_deref(), 0.0),
            velocity: self.number(&context, "limit velocity", l.velocity.as_deref(), 0.0),
        });
        let dynamics = xml.dynamics.map(|d| JointDynamics {
            damping: self.number(&context, "damping", d.damping.as_deref(), 0.0),
            friction: self.number(&context, "friction", d.friction.as_deref(), 0.0),
        });
        Ok(Joint {
            name: xml.name,
            kind,
            parent_link: xml.parent.link,
            child_link: xml.child.link,
            origin,
            axis,
            limits,
            dynamics,
        })
    }

    fn origin(&mut self, context: &str, xml: Option<&OriginXml>) -> Pose {
        let Some(xml) = xml else {
            return Pose::identity();
        };
        let mut read = |field: &str, text: Option<&String>| match text {
            None => [0.0; 3],
            Some(text) => match parse_vector3(text) {
                Some(v) => [v.x, v.y, v.z],
                None => {
                    self.diagnostics.warn(format!(
                        "Unable to parse origin {} [{}] in {}, using 0 0 0",
                        field, text, context
                    ));
                    [0.0; 3]
                }
            },
        };
        let xyz = read("xyz", xml.xyz.as_ref());
        let rpy = read("rpy", xml.rpy.as_ref());
        Pose::from_xyz_rpy(xyz, rpy)
    }

    /// An optional numeric attribute; absent gives `default` silently,
    /// malformed gives `default` with a warning
    fn number(&mut self, context: &str, field: &str, text: Option<&str>, default: f64) -> f64 {
        let Some(text) = text else {
            return default;
        };
        match text.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                self.diagnostics.warn(format!(
                    "Unable to parse {} [{}] in {}, using {}",
                    field, text, context, default
                ));
                default
            }
        }
    }

    /// A shape dimension the URDF requires
    fn dimension(&mut self, context: &str, field: &str, text: Option<&str>) -> f64 {
        if text.is_none() {
            self.diagnostics
                .warn(format!("Missing {} in {}, using 0", field, context));
        }
        self.number(context, field, text, 0.0)
    }
}
