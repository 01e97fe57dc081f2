//! URDF to SDF conversion entry point

use std::path::Path;

use sdfconv_core::{Diagnostics, ElementId, Schema, Sdf};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::builder::SdfBuilder;
use crate::error::ConvertError;
use crate::extension::ExtensionStore;
use crate::model::KinematicTree;
use crate::reduce::{reduce_fixed_joints, ReductionContext};
use crate::urdf::parse_urdf;

/// Conversion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    /// Merge links attached through fixed joints into their parents
    #[serde(default = "default_true")]
    pub reduce_fixed_joints: bool,
    /// Emit joint limits
    #[serde(default = "default_true")]
    pub enforce_limits: bool,
    /// Name of the sentinel link representing the fixed world
    #[serde(default = "default_root_link")]
    pub root_link_name: String,
    /// Version attribute written on `<sdf>`
    #[serde(default = "default_sdf_version")]
    pub sdf_version: String,
    /// Top-level URDF blocks read as simulator extensions
    #[serde(default = "default_extension_tags")]
    pub extension_tags: Vec<String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            reduce_fixed_joints: true,
            enforce_limits: true,
            root_link_name: default_root_link(),
            sdf_version: default_sdf_version(),
            extension_tags: default_extension_tags(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_root_link() -> String {
    "world".to_string()
}

fn default_sdf_version() -> String {
    "1.3".to_string()
}

fn default_extension_tags() -> Vec<String> {
    vec!["gazebo".to_string(), "sdf".to_string()]
}

/// Result of one conversion. The document is always present; it is empty
/// when the input could not be read.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub sdf: Sdf,
    pub diagnostics: Diagnostics,
}

impl Conversion {
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    fn count(&self, name: &str) -> usize {
        self.sdf
            .model()
            .map_or(0, |m| self.sdf.tree().elements_named(m, name).count())
    }

    pub fn link_count(&self) -> usize {
        self.count("link")
    }

    pub fn joint_count(&self) -> usize {
        self.count("joint")
    }

    /// `<link>` element with the given name
    pub fn link(&self, name: &str) -> Option<ElementId> {
        let model = self.sdf.model()?;
        let tree = self.sdf.tree();
        tree.elements_named(model, "link")
            .find(|l| tree.try_get::<String>(*l, "name").as_deref() == Some(name))
    }

    pub fn write(&self, path: &Path, indent: usize) -> Result<(), ConvertError> {
        let xml = self.sdf.to_xml_with_indent(indent)?;
        std::fs::write(path, xml)?;
        info!(path = %path.display(), "Wrote SDF");
        Ok(())
    }
}

/// Converts URDF documents; holds no per-conversion state and can be shared
/// across threads
#[derive(Debug, Clone)]
pub struct UrdfConverter {
    options: ConvertOptions,
    schema: Schema,
}

impl UrdfConverter {
    /// Converter using the built-in SDF schema
    pub fn new(options: ConvertOptions) -> Result<Self, ConvertError> {
        Ok(Self::with_schema(options, Schema::builtin()?))
    }

    pub fn with_schema(options: ConvertOptions, schema: Schema) -> Self {
        Self { options, schema }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn empty(&self) -> Sdf {
        Sdf::with_version(&self.schema, &self.options.sdf_version)
    }

    pub fn convert_str(&self, urdf: &str) -> Conversion {
        let mut diagnostics = Diagnostics::new();
        match parse_urdf(urdf, &mut diagnostics) {
            Ok(tree) => {
                let mut conversion = self.convert_tree(tree, urdf);
                let mut all = diagnostics;
                all.extend(conversion.diagnostics);
                conversion.diagnostics = all;
                conversion
            }
            Err(e) => {
                diagnostics.error(format!("Unable to read URDF: {}", e));
                Conversion {
                    sdf: self.empty(),
                    diagnostics,
                }
            }
        }
    }

    /// Convert an already parsed tree; `source` is the URDF text the
    /// extension blocks are read from
    pub fn convert_tree(&self, mut tree: KinematicTree, source: &str) -> Conversion {
        let mut diagnostics = Diagnostics::new();
        let mut extensions =
            match ExtensionStore::parse(source, &self.options.extension_tags, &mut diagnostics) {
                Ok(store) => store,
                Err(e) => {
                    diagnostics.error(format!("Unable to read extension blocks: {}", e));
                    ExtensionStore::new()
                }
            };

        if self.options.reduce_fixed_joints {
            let mut ctx = ReductionContext {
                tree: &mut tree,
                extensions: &mut extensions,
                diagnostics: &mut diagnostics,
                root_link_name: &self.options.root_link_name,
            };
            reduce_fixed_joints(&mut ctx);
        }

        let sdf = SdfBuilder::new(&self.schema, &self.options, &extensions, &mut diagnostics).build(&tree);
        Conversion { sdf, diagnostics }
    }

    pub fn convert_file(&self, path: &Path) -> Result<Conversion, ConvertError> {
        let content = std::fs::read_to_string(path)?;
        info!(path = %path.display(), bytes = content.len(), "Converting URDF");
        let conversion = self.convert_str(&content);
        if !conversion.is_ok() {
            warn!(path = %path.display(), "Conversion reported errors");
        }
        Ok(conversion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdfconv_core::{Pose, Severity};

    fn convert(urdf: &str) -> Conversion {
        UrdfConverter::new(ConvertOptions::default()).unwrap().convert_str(urdf)
    }

    fn names(conv: &Conversion, parent: ElementId, kind: &str) -> Vec<String> {
        let tree = conv.sdf.tree();
        tree.elements_named(parent, kind)
            .map(|e| tree.get::<String>(e, "name"))
            .collect()
    }

    fn pose_of(conv: &Conversion, elem: ElementId) -> Pose {
        let tree = conv.sdf.tree();
        tree.try_get::<Pose>(tree.element(elem, "pose").unwrap(), "").unwrap()
    }

    fn joint(conv: &Conversion, name: &str) -> ElementId {
        let tree = conv.sdf.tree();
        let model = conv.sdf.model().unwrap();
        tree.elements_named(model, "joint")
            .find(|j| tree.get::<String>(*j, "name") == name)
            .unwrap()
    }

    const MASS: &str = r#"<inertial><mass value="1"/><inertia ixx="1" iyy="1" izz="1" ixy="0" ixz="0" iyz="0"/></inertial>"#;

    fn link(name: &str, body: &str) -> String {
        format!(r#"<link name="{}">{}{}</link>"#, name, MASS, body)
    }

    #[test]
    fn test_massless_leaf_is_dropped_and_shapes_kept() {
        // fixed child without mass: nothing to lump, link disappears
        let urdf = format!(
            r#"<robot name="r">{}<link name="tip"/>
              <joint name="j" type="fixed"><parent link="base"/><child link="tip"/></joint>
            </robot>"#,
            link("base", r#"<visual><geometry><box size="1 1 1"/></geometry></visual>"#)
        );
        let conv = convert(&urdf);
        assert_eq!(conv.link_count(), 1);
        assert_eq!(conv.joint_count(), 0);
        let base = conv.link("base").unwrap();
        assert_eq!(names(&conv, base, "visual"), vec!["base_vis"]);
        let inertial = conv.sdf.tree().element(base, "inertial").unwrap();
        assert_eq!(conv.sdf.tree().get::<f64>(inertial, "mass"), 1.0);
    }

    #[test]
    fn test_massless_leaf_on_movable_joint() {
        let urdf = format!(
            r#"<robot name="r">{}<link name="tip"/>
              <joint name="j" type="revolute"><parent link="base"/><child link="tip"/></joint>
            </robot>"#,
            link("base", "")
        );
        let conv = convert(&urdf);
        assert_eq!(conv.link_count(), 1);
        assert!(conv.diagnostics.contains("[tip] has no inertia"));
        assert!(!conv.diagnostics.contains("child link"));
    }

    #[test]
    fn test_lumped_collision_naming() {
        // base collision keeps the bare name, the camera collision is suffixed
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="mount" type="fixed"><parent link="base"/><child link="camera"/>
                <origin xyz="0 0 0.5"/></joint>
            </robot>"#,
            link("base", r#"<collision><geometry><box size="1 1 1"/></geometry></collision>"#),
            link("camera", r#"<collision><geometry><box size="0.1 0.1 0.1"/></geometry></collision>"#)
        );
        let conv = convert(&urdf);
        assert_eq!(conv.link_count(), 1);
        let base = conv.link("base").unwrap();
        assert_eq!(names(&conv, base, "collision"), vec!["base_collision", "base_collision_camera"]);

        let tree = conv.sdf.tree();
        let cam = tree.elements_named(base, "collision").nth(1).unwrap();
        assert_eq!(pose_of(&conv, cam).xyz(), [0.0, 0.0, 0.5]);
    }

    #[test]
    fn test_contact_sensor_follows_named_collision_group() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="mount" type="fixed"><parent link="a"/><child link="b"/></joint>
              <gazebo reference="b">
                <sensor name="bump" type="contact">
                  <contact>
                    <collision>b_collision</collision>
                    <collision>b_collision_b_bumper</collision>
                  </contact>
                </sensor>
              </gazebo>
            </robot>"#,
            link("a", ""),
            link(
                "b",
                r#"<collision><geometry><box size="1 1 1"/></geometry></collision>
                   <collision group="bumper"><geometry><sphere radius="0.1"/></geometry></collision>"#
            )
        );
        let conv = convert(&urdf);
        let a = conv.link("a").unwrap();
        let collisions = names(&conv, a, "collision");
        assert_eq!(collisions, vec!["a_collision_b", "a_collision_b_bumper"]);

        let tree = conv.sdf.tree();
        let sensor = tree.element(a, "sensor").unwrap();
        let contact = tree.element(sensor, "contact").unwrap();
        let referenced: Vec<String> = tree
            .elements_named(contact, "collision")
            .map(|c| tree.get::<String>(c, "").trim().to_string())
            .collect();
        assert_eq!(referenced, collisions);
    }

    #[test]
    fn test_sensor_pose_through_two_lumps() {
        let urdf = format!(
            r#"<robot name="r">{}{}{}
              <joint name="ab" type="fixed"><parent link="a"/><child link="b"/><origin xyz="1 0 0"/></joint>
              <joint name="bc" type="fixed"><parent link="b"/><child link="c"/><origin xyz="0 0 1" rpy="0 0 1.5707963267948966"/></joint>
              <gazebo reference="c">
                <sensor name="cam" type="camera"><pose>0 5 0 0 0 0</pose></sensor>
                <projector name="flash"><pose>0 0 3 0 0 0</pose></projector>
              </gazebo>
            </robot>"#,
            link("a", ""),
            link("b", ""),
            link("c", "")
        );
        let conv = convert(&urdf);
        let a = conv.link("a").unwrap();
        let tree = conv.sdf.tree();
        let pose_of = |name: &str| -> Pose {
            let blob = tree.element(a, name).unwrap();
            tree.get::<String>(tree.element(blob, "pose").unwrap(), "").parse().unwrap()
        };

        let expected = sdfconv_core::compose(
            &Pose::from_xyz_rpy([0.0, 0.0, 1.0], [0.0, 0.0, std::f64::consts::FRAC_PI_2]),
            &Pose::from_xyz_rpy([1.0, 0.0, 0.0], [0.0; 3]),
        );
        let sensor = pose_of("sensor");
        assert!(sensor.approx_eq(&expected, 1e-5));
        let xyz = sensor.xyz();
        assert!((xyz[0] - 1.0).abs() < 1e-9 && xyz[1].abs() < 1e-9 && (xyz[2] - 1.0).abs() < 1e-9);
        assert!(pose_of("projector").approx_eq(&expected, 1e-5));
    }

    #[test]
    fn test_joint_mapping() {
        let urdf = format!(
            r#"<robot name="r">{}{}{}{}{}
              <joint name="hinge" type="revolute"><parent link="base"/><child link="arm"/>
                <axis xyz="0 1 0"/><limit lower="1" upper="-1" effort="5" velocity="2"/>
                <dynamics damping="0.3"/></joint>
              <joint name="wheel" type="continuous"><parent link="base"/><child link="wheel"/>
                <limit lower="-1" upper="1" effort="1" velocity="1"/></joint>
              <joint name="slide" type="prismatic"><parent link="base"/><child link="rail"/>
                <limit lower="0" upper="0.5" effort="1" velocity="1"/></joint>
              <joint name="free" type="floating"><parent link="base"/><child link="ball"/></joint>
            </robot>"#,
            link("base", ""),
            link("arm", ""),
            link("wheel", ""),
            link("rail", ""),
            link("ball", "")
        );
        let conv = convert(&urdf);
        let tree = conv.sdf.tree();
        assert_eq!(conv.link_count(), 5);
        assert_eq!(conv.joint_count(), 3);
        assert!(conv.diagnostics.contains("[free] of type [floating]"));

        let hinge = joint(&conv, "hinge");
        assert_eq!(tree.get::<String>(hinge, "type"), "revolute");
        assert_eq!(tree.get::<String>(hinge, "parent"), "base");
        let axis = tree.element(hinge, "axis").unwrap();
        let limit = tree.element(axis, "limit").unwrap();
        assert_eq!(tree.get::<f64>(limit, "lower"), -1.0);
        assert_eq!(tree.get::<f64>(limit, "upper"), 1.0);
        assert!(conv.diagnostics.contains("swapping"));
        let dynamics = tree.element(axis, "dynamics").unwrap();
        assert_eq!(tree.get::<f64>(dynamics, "damping"), 0.3);

        let wheel = joint(&conv, "wheel");
        assert_eq!(tree.get::<String>(wheel, "type"), "revolute");
        assert!(!tree.has_element(tree.element(wheel, "axis").unwrap(), "limit"));

        assert_eq!(tree.get::<String>(joint(&conv, "slide"), "type"), "prismatic");
    }

    #[test]
    fn test_fixed_joint_kept_without_reduction() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="mount" type="fixed"><parent link="base"/><child link="plate"/></joint>
            </robot>"#,
            link("base", ""),
            link("plate", "")
        );
        let options = ConvertOptions {
            reduce_fixed_joints: false,
            ..Default::default()
        };
        let conv = UrdfConverter::new(options).unwrap().convert_str(&urdf);
        assert_eq!(conv.link_count(), 2);

        let tree = conv.sdf.tree();
        let mount = joint(&conv, "mount");
        assert_eq!(tree.get::<String>(mount, "type"), "revolute");
        let axis = tree.element(mount, "axis").unwrap();
        let limit = tree.element(axis, "limit").unwrap();
        assert_eq!(tree.get::<f64>(limit, "lower"), 0.0);
        assert_eq!(tree.get::<f64>(limit, "upper"), 0.0);
    }

    #[test]
    fn test_limits_disabled() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="j" type="revolute"><parent link="base"/><child link="arm"/>
                <limit lower="-1" upper="1" effort="1" velocity="1"/></joint>
            </robot>"#,
            link("base", ""),
            link("arm", "")
        );
        let options = ConvertOptions {
            enforce_limits: false,
            ..Default::default()
        };
        let conv = UrdfConverter::new(options).unwrap().convert_str(&urdf);
        let tree = conv.sdf.tree();
        let axis = tree.element(joint(&conv, "j"), "axis").unwrap();
        assert!(!tree.has_element(axis, "limit"));
    }

    #[test]
    fn test_world_root_and_link_poses() {
        let urdf = format!(
            r#"<robot name="r"><link name="world"/>{}{}
              <joint name="anchor" type="fixed"><parent link="world"/><child link="base"/>
                <origin xyz="0 0 1"/></joint>
              <joint name="j" type="revolute"><parent link="base"/><child link="arm"/>
                <origin xyz="1 0 0" rpy="0 0 1.5707963267948966"/><axis xyz="1 0 0"/></joint>
            </robot>"#,
            link("base", ""),
            link("arm", "")
        );
        let conv = convert(&urdf);
        assert!(conv.link("world").is_none());
        assert_eq!(conv.link_count(), 2);
        assert_eq!(conv.joint_count(), 2);

        let arm = conv.link("arm").unwrap();
        let pose = pose_of(&conv, arm);
        assert!(pose.approx_eq(&Pose::from_xyz_rpy([1.0, 0.0, 1.0], [0.0, 0.0, std::f64::consts::FRAC_PI_2]), 1e-5));

        // axis is expressed in the model frame
        let tree = conv.sdf.tree();
        let axis = tree.element(joint(&conv, "j"), "axis").unwrap();
        let xyz = tree.get::<nalgebra::Vector3<f64>>(axis, "xyz");
        assert!((xyz.y - 1.0).abs() < 1e-6 && xyz.x.abs() < 1e-6);
        assert_eq!(tree.get::<String>(joint(&conv, "anchor"), "parent"), "world");
    }

    #[test]
    fn test_geometry_emission() {
        let urdf = format!(
            r#"<robot name="r">{}</robot>"#,
            link(
                "base",
                r#"<visual><geometry><mesh filename="package://bot/meshes/base.dae" scale="2 2 2"/></geometry></visual>
                   <visual><geometry><capsule radius="0.1" length="0.5"/></geometry></visual>
                   <visual><geometry><cylinder radius="0.2" length="0.4"/></geometry></visual>
                   <collision><geometry><mesh filename=""/></geometry></collision>"#
            )
        );
        let conv = convert(&urdf);
        let tree = conv.sdf.tree();
        let base = conv.link("base").unwrap();
        assert_eq!(names(&conv, base, "visual"), vec!["base_vis", "base_vis_base_2"]);

        let mesh_visual = tree.element(base, "visual").unwrap();
        let geometry = tree.element(mesh_visual, "geometry").unwrap();
        let mesh = tree.element(geometry, "mesh").unwrap();
        assert_eq!(tree.get::<String>(mesh, "uri"), "model://bot/meshes/base.dae");

        assert!(conv.diagnostics.contains("[capsule]"));
        assert_eq!(conv.diagnostics.count(Severity::Error), 1);
        assert!(conv.diagnostics.contains("empty filename"));
    }

    #[test]
    fn test_extensions_emitted() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="j" type="revolute"><parent link="base"/><child link="arm"/></joint>
              <gazebo><static>true</static></gazebo>
              <gazebo reference="base">
                <turnGravityOff>true</turnGravityOff>
                <mu1>0.5</mu1><kp>1000</kp>
                <material>Gazebo/Red</material>
              </gazebo>
              <gazebo reference="j"><stopErp>0.4</stopErp><provideFeedback>true</provideFeedback></gazebo>
              <gazebo reference="nowhere"><selfCollide>true</selfCollide></gazebo>
            </robot>"#,
            link(
                "base",
                r#"<visual><geometry><box size="1 1 1"/></geometry></visual>
                   <collision><geometry><box size="1 1 1"/></geometry></collision>"#
            ),
            link("arm", "")
        );
        let conv = convert(&urdf);
        let tree = conv.sdf.tree();
        let model = conv.sdf.model().unwrap();
        assert!(tree.get::<bool>(model, "static"));

        let base = conv.link("base").unwrap();
        assert!(!tree.get::<bool>(base, "gravity"));
        let collision = tree.element(base, "collision").unwrap();
        let surface = tree.element(collision, "surface").unwrap();
        let friction = tree.element(tree.element(surface, "friction").unwrap(), "ode").unwrap();
        assert_eq!(tree.get::<f64>(friction, "mu"), 0.5);
        let contact = tree.element(tree.element(surface, "contact").unwrap(), "ode").unwrap();
        assert_eq!(tree.get::<f64>(contact, "kp"), 1000.0);
        let visual = tree.element(base, "visual").unwrap();
        assert_eq!(tree.get::<String>(visual, "material"), "Gazebo/Red");

        let physics = tree.element(joint(&conv, "j"), "physics").unwrap();
        let ode = tree.element(physics, "ode").unwrap();
        assert!(tree.get::<bool>(ode, "provide_feedback"));
        let limit = tree.element(ode, "limit").unwrap();
        assert_eq!(tree.get::<f64>(limit, "erp"), 0.4);
        assert!(!tree.has_element(limit, "cfm"));

        assert!(conv
            .diagnostics
            .matching(Severity::Info, "[nowhere]")
            .next()
            .is_some());
    }

    #[test]
    fn test_inconsistent_lumped_values_warn() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="j" type="fixed"><parent link="base"/><child link="plate"/></joint>
              <gazebo reference="base"><turnGravityOff>false</turnGravityOff></gazebo>
              <gazebo reference="plate"><turnGravityOff>true</turnGravityOff></gazebo>
            </robot>"#,
            link("base", ""),
            link("plate", "")
        );
        let conv = convert(&urdf);
        let tree = conv.sdf.tree();
        let base = conv.link("base").unwrap();
        assert_eq!(tree.elements_named(base, "gravity").count(), 1);
        assert!(!tree.get::<bool>(base, "gravity"));
        assert!(conv.diagnostics.contains("inconsistent <gravity>"));
    }

    #[test]
    fn test_output_validates_against_schema() {
        let urdf = format!(
            r#"<robot name="r">{}{}
              <joint name="j" type="revolute"><parent link="base"/><child link="arm"/>
                <limit lower="-1" upper="1" effort="1" velocity="1"/></joint>
            </robot>"#,
            link("base", r#"<collision><geometry><sphere radius="0.5"/></geometry></collision>"#),
            link("arm", r#"<visual><geometry><box size="1 2 3"/></geometry></visual>"#)
        );
        let converter = UrdfConverter::new(ConvertOptions::default()).unwrap();
        let conv = converter.convert_str(&urdf);
        assert!(conv.sdf.validate().is_empty());

        let xml = conv.sdf.to_xml().unwrap();
        assert!(xml.starts_with("<?xml version='1.0'?>"));
        let (reread, errors) = Sdf::from_xml(converter.schema(), &xml).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(reread.version(), "1.3");
        let model = reread.model().unwrap();
        assert_eq!(reread.tree().elements_named(model, "link").count(), 2);
    }

    #[test]
    fn test_malformed_number_is_a_warning() {
        let urdf = format!(
            r#"<robot name="r">{}</robot>"#,
            link(
                "base",
                r#"<collision><geometry><cylinder radius="wide" length="1"/></geometry></collision>"#
            )
        );
        let conv = convert(&urdf);
        assert!(conv.is_ok());
        assert_eq!(conv.link_count(), 1);
        let base = conv.link("base").unwrap();
        assert_eq!(names(&conv, base, "collision").len(), 1);
        assert!(conv.diagnostics.contains("cylinder radius [wide]"));
    }

    #[test]
    fn test_parse_failure_yields_empty_document() {
        let conv = convert(r#"<robot name="r"></robot>"#);
        assert!(!conv.is_ok());
        assert!(conv.sdf.model().is_none());
        assert!(conv.diagnostics.contains("no links"));
    }

    #[test]
    fn test_concurrent_conversions_are_isolated() {
        let converter = UrdfConverter::new(ConvertOptions::default()).unwrap();
        let inputs: Vec<String> = (0..4)
            .map(|i| {
                format!(
                    r#"<robot name="bot{}">{}<link name="tip"/>
                      <joint name="j" type="fixed"><parent link="base"/><child link="tip"/></joint>
                    </robot>"#,
                    i,
                    link("base", "")
                )
            })
            .collect();

        let converter = &converter;
        let results: Vec<Conversion> = std::thread::scope(|s| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|urdf| s.spawn(move || converter.convert_str(urdf)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, conv) in results.iter().enumerate() {
            let tree = conv.sdf.tree();
            let model = conv.sdf.model().unwrap();
            assert_eq!(tree.get::<String>(model, "name"), format!("bot{}", i));
            assert_eq!(conv.link_count(), 1);
            assert!(conv.diagnostics.is_empty());
        }
    }

    #[test]
    fn test_options_from_toml() {
        let options: ConvertOptions = toml::from_str("reduce_fixed_joints = false").unwrap();
        assert!(!options.reduce_fixed_joints);
        assert!(options.enforce_limits);
        assert_eq!(options.root_link_name, "world");
        assert_eq!(options.extension_tags, vec!["gazebo", "sdf"]);
    }

    #[test]
    fn test_convert_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("robot.urdf");
        std::fs::write(&input, format!(r#"<robot name="r">{}</robot>"#, link("base", ""))).unwrap();

        let converter = UrdfConverter::new(ConvertOptions::default()).unwrap();
        let conv = converter.convert_file(&input).unwrap();
        assert!(conv.is_ok());

        let output = dir.path().join("robot.sdf");
        conv.write(&output, 0).unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains(r#"<link name="base">"#));

        assert!(converter.convert_file(&dir.path().join("missing.urdf")).is_err());
    }
}
