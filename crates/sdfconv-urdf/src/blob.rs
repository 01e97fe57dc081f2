//! Opaque extension fragments ("blobs")
//!
//! Anything inside an extension block that is not a known field is kept as
//! an element sub-tree. Blobs are tagged by kind so that frame rewriting is a
//! dispatch over the tag; the fragment content itself is preserved verbatim
//! apart from the fields that name links or carry poses.

use nalgebra::Vector3;
use sdfconv_core::pose::{format_vector3, parse_vector3};
use sdfconv_core::{
    inverse_compose, Diagnostics, ElementId, ElementTree, ParamType, Pose, Sensor,
    SensorType,
};
use tracing::debug;

/// A detached element sub-tree with its own arena
#[derive(Debug, Clone)]
pub struct Fragment {
    tree: ElementTree,
    root: ElementId,
}

impl Fragment {
    /// Deep copy `id` out of `source`
    pub fn from_element(source: &ElementTree, id: ElementId) -> Self {
        let mut tree = ElementTree::new();
        let root = tree.import(source, id);
        Self { tree, root }
    }

    pub fn name(&self) -> &str {
        self.tree.name(self.root)
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Trimmed text of the first direct child called `name`
    pub fn child_text(&self, name: &str) -> Option<String> {
        let child = self.tree.element(self.root, name)?;
        element_text(&self.tree, child)
    }

    /// Set the text of the first direct child called `name`, appending the
    /// child when it does not exist
    pub fn set_child_text(&mut self, name: &str, text: &str) {
        let child = self.tree.get_element(self.root, name);
        set_element_text(&mut self.tree, child, text);
    }

    /// Drop every direct child called `name`, then append one with `text`
    pub fn replace_child(&mut self, name: &str, text: &str) {
        let existing: Vec<ElementId> = self.tree.elements_named(self.root, name).collect();
        for id in existing {
            self.tree.remove_from_parent(id);
        }
        let child = self.tree.add_element(self.root, name);
        set_element_text(&mut self.tree, child, text);
    }

    /// Rewrite the text of every element named `name` anywhere below `from`
    /// for which `map` returns a replacement
    fn rewrite_text<F>(&mut self, from: ElementId, name: &str, map: &F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut count = 0;
        let children: Vec<ElementId> = self.tree.elements(from).to_vec();
        for child in children {
            if self.tree.name(child) == name {
                if let Some(new) = element_text(&self.tree, child).and_then(|t| map(&t)) {
                    set_element_text(&mut self.tree, child, &new);
                    count += 1;
                }
            }
            count += self.rewrite_text(child, name, map);
        }
        count
    }

    fn rewrite_direct_children<F>(&mut self, name: &str, map: &F) -> usize
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut count = 0;
        let children: Vec<ElementId> = self.tree.elements_named(self.root, name).collect();
        for child in children {
            if let Some(new) = element_text(&self.tree, child).and_then(|t| map(&t)) {
                set_element_text(&mut self.tree, child, &new);
                count += 1;
            }
        }
        count
    }
}

fn element_text(tree: &ElementTree, id: ElementId) -> Option<String> {
    tree.value(id).map(|v| v.as_string().trim().to_string())
}

fn set_element_text(tree: &mut ElementTree, id: ElementId, text: &str) {
    if tree.value(id).is_none() {
        if let Err(e) = tree.add_value(id, ParamType::String, "", false, "") {
            debug!(error = %e, "Unable to add fragment text slot");
            return;
        }
    }
    if let Err(e) = tree.set_value_str(id, text) {
        debug!(error = %e, "Unable to rewrite fragment text");
    }
}

/// What a lumping step changes: `old_link` disappears into `new_link`, whose
/// frame holds the old one at `joint_origin`
#[derive(Debug, Clone, Copy)]
pub struct FrameRewrite<'a> {
    pub old_link: &'a str,
    pub new_link: &'a str,
    pub joint_origin: &'a Pose,
}

#[derive(Debug, Clone)]
pub enum Blob {
    Sensor {
        /// `None` when the block is not a loadable sensor
        sensor_type: Option<SensorType>,
        fragment: Fragment,
    },
    Plugin(Fragment),
    Projector(Fragment),
    Gripper(Fragment),
    Joint(Fragment),
    Other(Fragment),
}

impl Blob {
    /// Tag a fragment by its element name
    pub fn classify(fragment: Fragment, reference: &str, diagnostics: &mut Diagnostics) -> Blob {
        match fragment.name() {
            "sensor" => {
                let sensor_type = match Sensor::load(fragment.tree(), fragment.root()) {
                    Ok(sensor) => Some(sensor.sensor_type),
                    Err(errors) => {
                        let reasons: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                        diagnostics.warn(format!(
                            "Sensor extension for [{}] could not be read ({}), kept verbatim",
                            reference,
                            reasons.join("; ")
                        ));
                        None
                    }
                };
                Blob::Sensor {
                    sensor_type,
                    fragment,
                }
            }
            "plugin" => Blob::Plugin(fragment),
            "projector" => Blob::Projector(fragment),
            "gripper" => Blob::Gripper(fragment),
            "joint" => Blob::Joint(fragment),
            _ => Blob::Other(fragment),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Blob::Sensor { .. } => "sensor",
            Blob::Plugin(_) => "plugin",
            Blob::Projector(_) => "projector",
            Blob::Gripper(_) => "gripper",
            Blob::Joint(_) => "joint",
            Blob::Other(_) => "other",
        }
    }

    pub fn fragment(&self) -> &Fragment {
        match self {
            Blob::Sensor { fragment, .. } => fragment,
            Blob::Plugin(f) | Blob::Projector(f) | Blob::Gripper(f) | Blob::Joint(f) | Blob::Other(f) => f,
        }
    }

    fn fragment_mut(&mut self) -> &mut Fragment {
        match self {
            Blob::Sensor { fragment, .. } => fragment,
            Blob::Plugin(f) | Blob::Projector(f) | Blob::Gripper(f) | Blob::Joint(f) | Blob::Other(f) => f,
        }
    }

    /// Place sensors and projectors at `reduction_transform`, the pose of
    /// their original link inside the ancestor it was lumped into. Any pose
    /// the block carried is replaced.
    pub fn apply_reduction_transform(&mut self, reduction_transform: &Pose) {
        match self {
            Blob::Sensor { fragment, .. } | Blob::Projector(fragment) => {
                fragment.replace_child("pose", &reduction_transform.to_string());
            }
            Blob::Plugin(_) | Blob::Gripper(_) | Blob::Joint(_) | Blob::Other(_) => {}
        }
    }

    /// Point every link reference at `rewrite.old_link` to `rewrite.new_link`.
    /// Returns the number of fields changed.
    pub fn rewrite_frames(&mut self, rewrite: &FrameRewrite<'_>, reduction_transform: &Pose) -> usize {
        let old = rewrite.old_link;
        let new = rewrite.new_link;
        let same_link = |text: &str| (text == old).then(|| new.to_string());

        let mut changed = match self {
            Blob::Sensor {
                sensor_type,
                fragment,
                ..
            } => {
                if matches!(sensor_type, Some(SensorType::Contact) | None) {
                    rewrite_contact_collisions(fragment, old, new)
                } else {
                    0
                }
            }
            Blob::Plugin(fragment) => rewrite_plugin(fragment, rewrite, reduction_transform),
            Blob::Gripper(fragment) => {
                fragment.rewrite_direct_children("gripper_link", &same_link)
                    + fragment.rewrite_direct_children("palm_link", &same_link)
            }
            Blob::Joint(fragment) => {
                fragment.rewrite_direct_children("parent", &same_link)
                    + fragment.rewrite_direct_children("child", &same_link)
            }
            Blob::Projector(_) | Blob::Other(_) => 0,
        };

        // "<link>/<projector>" references can sit in any kind of block
        let projector_ref = |text: &str| {
            let (link, projector) = text.split_once('/')?;
            (link == old).then(|| format!("{}/{}", new, projector))
        };
        let fragment = self.fragment_mut();
        let root = fragment.root();
        changed += fragment.rewrite_text(root, "projector", &projector_ref);
        changed
    }
}

/// `<old>_collision[_<suffix>]` becomes `<new>_collision_<old>` or
/// `<new>_collision_<suffix>`, matching the names the builder gives to
/// collisions lumped out of `old`
fn rewrite_contact_collisions(fragment: &mut Fragment, old: &str, new: &str) -> usize {
    let Some(contact) = fragment.tree().element(fragment.root(), "contact") else {
        return 0;
    };
    let bare = format!("{}_collision", old);
    let with_suffix = format!("{}_collision_", old);
    let map = |text: &str| {
        if text == bare {
            Some(format!("{}_collision_{}", new, old))
        } else {
            text.strip_prefix(&with_suffix)
                .map(|suffix| format!("{}_collision_{}", new, suffix))
        }
    };
    fragment.rewrite_text(contact, "collision", &map)
}

fn rewrite_plugin(fragment: &mut Fragment, rewrite: &FrameRewrite<'_>, reduction_transform: &Pose) -> usize {
    let same_link = |text: &str| (text == rewrite.old_link).then(|| rewrite.new_link.to_string());
    let changed = fragment.rewrite_direct_children("bodyName", &same_link)
        + fragment.rewrite_direct_children("frameName", &same_link);
    if changed == 0 {
        return 0;
    }

    let xyz = fragment.child_text("xyzOffset").and_then(|t| parse_vector3(&t));
    let rpy_deg = fragment.child_text("rpyOffset").and_then(|t| parse_vector3(&t));
    let offset = if xyz.is_none() && rpy_deg.is_none() {
        *reduction_transform
    } else {
        let xyz = xyz.unwrap_or_else(Vector3::zeros);
        let rpy = rpy_deg.unwrap_or_else(Vector3::zeros).map(f64::to_radians);
        Pose::from_xyz_rpy([xyz.x, xyz.y, xyz.z], [rpy.x, rpy.y, rpy.z])
    };

    let offset = inverse_compose(&offset, rewrite.joint_origin);
    let [roll, pitch, yaw] = offset.rpy();
    let rpy_deg = Vector3::new(roll, pitch, yaw).map(f64::to_degrees);
    fragment.replace_child("xyzOffset", &format_vector3(&offset.position));
    fragment.replace_child("rpyOffset", &format_vector3(&rpy_deg));
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdfconv_core::xml::parse_str;

    fn blob(xml: &str) -> Blob {
        let (tree, root) = parse_str(xml).unwrap();
        let mut diags = Diagnostics::new();
        Blob::classify(Fragment::from_element(&tree, root), "link", &mut diags)
    }

    fn rewrite<'a>(old: &'a str, new: &'a str, origin: &'a Pose) -> FrameRewrite<'a> {
        FrameRewrite {
            old_link: old,
            new_link: new,
            joint_origin: origin,
        }
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            blob(r#"<sensor name="s" type="ray"/>"#),
            Blob::Sensor {
                sensor_type: Some(SensorType::Lidar),
                ..
            }
        ));
        assert!(matches!(
            blob(r#"<sensor type="ray"/>"#),
            Blob::Sensor {
                sensor_type: None,
                ..
            }
        ));
        assert_eq!(blob(r#"<plugin name="p" filename="x.so"/>"#).kind(), "plugin");
        assert_eq!(blob(r#"<projector name="p"/>"#).kind(), "projector");
        assert_eq!(blob(r#"<gripper name="g"/>"#).kind(), "gripper");
        assert_eq!(blob(r#"<joint name="j" type="revolute"/>"#).kind(), "joint");
        assert_eq!(blob(r#"<turnGravityOff/>"#).kind(), "other");
    }

    #[test]
    fn test_sensor_pose_replaced_by_reduction() {
        let mut b = blob(r#"<sensor name="cam" type="camera"><pose>0 5 0 0 0 0</pose></sensor>"#);
        b.apply_reduction_transform(&Pose::from_xyz_rpy([1.0, 0.0, 0.0], [0.0; 3]));
        b.apply_reduction_transform(&Pose::from_xyz_rpy([1.0, 0.0, 1.0], [0.0; 3]));
        let pose: Pose = b.fragment().child_text("pose").unwrap().parse().unwrap();
        assert_eq!(pose.xyz(), [1.0, 0.0, 1.0]);
        assert_eq!(b.fragment().tree().elements_named(b.fragment().root(), "pose").count(), 1);

        let mut p = blob(r#"<projector name="flash"><pose>0 0 3 0 0 0</pose></projector>"#);
        p.apply_reduction_transform(&Pose::from_xyz_rpy([0.0, 2.0, 0.0], [0.0; 3]));
        let pose: Pose = p.fragment().child_text("pose").unwrap().parse().unwrap();
        assert_eq!(pose.xyz(), [0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_contact_sensor_collision_names() {
        let mut b = blob(
            r#"<sensor name="bump" type="contact">
                <contact>
                  <collision>bumper_collision</collision>
                  <collision>bumper_collision_bumper_1</collision>
                  <collision>other_collision</collision>
                </contact>
              </sensor>"#,
        );
        let origin = Pose::identity();
        let changed = b.rewrite_frames(&rewrite("bumper", "base", &origin), &Pose::identity());
        assert_eq!(changed, 2);

        let f = b.fragment();
        let contact = f.tree().element(f.root(), "contact").unwrap();
        let names: Vec<String> = f
            .tree()
            .elements_named(contact, "collision")
            .map(|c| f.tree().get::<String>(c, ""))
            .collect();
        assert_eq!(
            names,
            vec![
                "base_collision_bumper".to_string(),
                "base_collision_bumper_1".to_string(),
                "other_collision".to_string()
            ]
        );
    }

    #[test]
    fn test_plugin_body_and_offsets() {
        let mut b = blob(
            r#"<plugin name="imu" filename="libimu.so">
                <bodyName>imu_link</bodyName>
                <xyzOffset>1 0 0</xyzOffset>
                <rpyOffset>0 0 90</rpyOffset>
              </plugin>"#,
        );
        let origin = Pose::from_xyz_rpy([1.0, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let changed = b.rewrite_frames(&rewrite("imu_link", "base", &origin), &Pose::identity());
        assert_eq!(changed, 1);

        let f = b.fragment();
        assert_eq!(f.child_text("bodyName").as_deref(), Some("base"));
        let xyz = parse_vector3(&f.child_text("xyzOffset").unwrap()).unwrap();
        assert!(xyz.norm() < 1e-9);
        let rpy = parse_vector3(&f.child_text("rpyOffset").unwrap()).unwrap();
        assert!((rpy.z - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_plugin_for_other_link_untouched() {
        let mut b = blob(
            r#"<plugin name="p" filename="p.so"><frameName>wheel</frameName><xyzOffset>1 2 3</xyzOffset></plugin>"#,
        );
        let origin = Pose::from_xyz_rpy([5.0, 0.0, 0.0], [0.0; 3]);
        assert_eq!(b.rewrite_frames(&rewrite("imu_link", "base", &origin), &Pose::identity()), 0);
        assert_eq!(b.fragment().child_text("xyzOffset").as_deref(), Some("1 2 3"));
    }

    #[test]
    fn test_gripper_joint_and_projector_refs() {
        let origin = Pose::identity();
        let r = rewrite("finger", "palm", &origin);

        let mut g = blob(
            r#"<gripper name="g"><gripper_link>finger</gripper_link><gripper_link>thumb</gripper_link><palm_link>finger</palm_link></gripper>"#,
        );
        assert_eq!(g.rewrite_frames(&r, &origin), 2);

        let mut j = blob(r#"<joint name="j" type="revolute"><parent>finger</parent><child>tip</child></joint>"#);
        assert_eq!(j.rewrite_frames(&r, &origin), 1);
        assert_eq!(j.fragment().child_text("parent").as_deref(), Some("palm"));

        let mut p = blob(
            r#"<plugin name="light" filename="l.so"><projector>finger/flash</projector></plugin>"#,
        );
        assert_eq!(p.rewrite_frames(&r, &origin), 1);
        assert_eq!(p.fragment().child_text("projector").as_deref(), Some("palm/flash"));
    }
}
