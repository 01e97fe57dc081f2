//! Simulator extension blocks
//!
//! URDF files carry simulator-specific settings in top-level blocks such as
//! `<gazebo reference="link">`. Known fields are lifted into typed
//! [`Extension`] records; everything else is kept as a [`Blob`]. Records are
//! keyed by the referenced link or joint name, the empty key holding
//! document-scope blocks.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use sdfconv_core::pose::parse_vector3;
use sdfconv_core::xml::parse_str;
use sdfconv_core::{compose, Diagnostics, DocumentError, ElementId, ElementTree, Pose};
use tracing::debug;

use crate::blob::{Blob, Fragment, FrameRewrite};

/// One extension block
#[derive(Debug, Clone, Default)]
pub struct Extension {
    /// Link the block was written for; survives migration to an ancestor
    pub old_link_name: String,

    pub material: Option<String>,
    pub is_static: Option<bool>,
    pub gravity: Option<bool>,
    pub self_collide: Option<bool>,
    pub damping_factor: Option<f64>,

    pub mu1: Option<f64>,
    pub mu2: Option<f64>,
    pub fdir1: Option<Vector3<f64>>,
    pub kp: Option<f64>,
    pub kd: Option<f64>,
    pub max_vel: Option<f64>,
    pub min_depth: Option<f64>,
    pub laser_retro: Option<f64>,

    pub provide_feedback: Option<bool>,
    pub cfm_damping: Option<bool>,
    pub stop_cfm: Option<f64>,
    pub stop_erp: Option<f64>,
    pub fudge_factor: Option<f64>,
    pub initial_joint_position: Option<f64>,

    /// Frame of the original link in the link currently holding the record
    pub reduction_transform: Pose,
    pub blobs: Vec<Blob>,
}

fn parse_flag(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

/// Gravity stays on unless explicitly disabled
fn parse_gravity(text: &str) -> bool {
    !matches!(text.to_ascii_lowercase().as_str(), "false" | "no" | "0")
}

impl Extension {
    pub fn new(reference: &str) -> Self {
        Self {
            old_link_name: reference.to_string(),
            ..Default::default()
        }
    }

    /// Lift a known field from `id`; false when the element is not one
    fn apply_field(
        &mut self,
        tree: &ElementTree,
        id: ElementId,
        reference: &str,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let name = tree.name(id);
        let text = tree
            .attribute(id, "value")
            .map(|a| a.as_string())
            .or_else(|| tree.value(id).map(|v| v.as_string()))
            .unwrap_or_default();
        let text = text.trim();

        let mut number = |slot: &mut Option<f64>| match text.parse::<f64>() {
            Ok(v) => *slot = Some(v),
            Err(_) => diagnostics.warn(format!(
                "Extension for [{}]: <{}> value [{}] is not a number, ignored",
                reference, name, text
            )),
        };

        match name {
            "material" => self.material = Some(text.to_string()),
            "static" => self.is_static = Some(parse_flag(text)),
            "turnGravityOff" => self.gravity = Some(!parse_flag(text)),
            "gravity" => self.gravity = Some(parse_gravity(text)),
            "selfCollide" => self.self_collide = Some(parse_flag(text)),
            "provideFeedback" => self.provide_feedback = Some(parse_flag(text)),
            "cfmDamping" | "implicitSpringDamper" => self.cfm_damping = Some(parse_flag(text)),
            "dampingFactor" => number(&mut self.damping_factor),
            "maxVel" => number(&mut self.max_vel),
            "minDepth" => number(&mut self.min_depth),
            "mu1" => number(&mut self.mu1),
            "mu2" => number(&mut self.mu2),
            "kp" => number(&mut self.kp),
            "kd" => number(&mut self.kd),
            "laserRetro" => number(&mut self.laser_retro),
            "stopCfm" => number(&mut self.stop_cfm),
            "stopErp" => number(&mut self.stop_erp),
            "fudgeFactor" => number(&mut self.fudge_factor),
            "initialJointPosition" => number(&mut self.initial_joint_position),
            "fdir1" => match parse_vector3(text) {
                Some(v) => self.fdir1 = Some(v),
                None => diagnostics.warn(format!(
                    "Extension for [{}]: <fdir1> value [{}] is not a vector, ignored",
                    reference, text
                )),
            },
            _ => return false,
        }
        true
    }

    /// The record's link moved one level up through a joint at `joint_origin`
    pub fn accumulate(&mut self, joint_origin: &Pose) {
        self.reduction_transform = compose(&self.reduction_transform, joint_origin);
        for blob in &mut self.blobs {
            blob.apply_reduction_transform(&self.reduction_transform);
        }
    }

    pub fn rewrite_frames(&mut self, rewrite: &FrameRewrite<'_>) -> usize {
        let transform = self.reduction_transform;
        self.blobs
            .iter_mut()
            .map(|b| b.rewrite_frames(rewrite, &transform))
            .sum()
    }

    /// True when the record carries a collision-surface field
    pub fn has_surface(&self) -> bool {
        self.has_friction() || self.has_contact()
    }

    pub fn has_friction(&self) -> bool {
        self.mu1.is_some() || self.mu2.is_some() || self.fdir1.is_some()
    }

    pub fn has_contact(&self) -> bool {
        self.kp.is_some() || self.kd.is_some() || self.max_vel.is_some() || self.min_depth.is_some()
    }

    pub fn has_joint_physics(&self) -> bool {
        self.provide_feedback.is_some()
            || self.cfm_damping.is_some()
            || self.fudge_factor.is_some()
            || self.stop_cfm.is_some()
            || self.stop_erp.is_some()
    }
}

/// Extension records keyed by reference name
#[derive(Debug, Clone, Default)]
pub struct ExtensionStore {
    entries: BTreeMap<String, Vec<Extension>>,
}

impl ExtensionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the top-level blocks named in `tags` from a URDF document
    pub fn parse(xml: &str, tags: &[String], diagnostics: &mut Diagnostics) -> Result<Self, DocumentError> {
        let (tree, root) = parse_str(xml)?;
        Ok(Self::from_tree(&tree, root, tags, diagnostics))
    }

    pub fn from_tree(
        tree: &ElementTree,
        root: ElementId,
        tags: &[String],
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut store = Self::new();
        for &block in tree.elements(root) {
            if !tags.iter().any(|t| t == tree.name(block)) {
                continue;
            }
            let reference = tree
                .attribute(block, "reference")
                .map(|a| a.as_string())
                .unwrap_or_default();

            let mut ext = Extension::new(&reference);
            for &child in tree.elements(block) {
                if !ext.apply_field(tree, child, &reference, diagnostics) {
                    let fragment = Fragment::from_element(tree, child);
                    ext.blobs.push(Blob::classify(fragment, &reference, diagnostics));
                }
            }
            debug!(reference = %reference, blobs = ext.blobs.len(), "Read extension block");
            store.insert(&reference, ext);
        }
        store
    }

    pub fn insert(&mut self, reference: &str, ext: Extension) {
        self.entries.entry(reference.to_string()).or_default().push(ext);
    }

    pub fn get(&self, reference: &str) -> &[Extension] {
        self.entries.get(reference).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains_key(reference)
    }

    /// Blocks without a `reference` attribute
    pub fn document_scope(&self) -> &[Extension] {
        self.get("")
    }

    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Records held under `reference` that were written for `original`
    pub fn for_original<'a>(
        &'a self,
        reference: &str,
        original: &'a str,
    ) -> impl Iterator<Item = &'a Extension> + 'a {
        self.get(reference)
            .iter()
            .filter(move |e| e.old_link_name == original)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extensions_mut(&mut self) -> impl Iterator<Item = &mut Extension> {
        self.entries.values_mut().flatten()
    }

    /// Move every record held under `from` to `to`; returns how many moved
    pub fn migrate(&mut self, from: &str, to: &str) -> usize {
        let Some(records) = self.entries.remove(from) else {
            return 0;
        };
        let moved = records.len();
        self.entries.entry(to.to_string()).or_default().extend(records);
        moved
    }

    /// Fold the records of `child` into `parent`, which holds it at
    /// `joint_origin`, and repoint every blob that named `child`
    pub fn lump_link(&mut self, child: &str, parent: &str, joint_origin: &Pose) {
        if let Some(records) = self.entries.get_mut(child) {
            for ext in records.iter_mut() {
                ext.accumulate(joint_origin);
            }
        }
        let moved = self.migrate(child, parent);

        let rewrite = FrameRewrite {
            old_link: child,
            new_link: parent,
            joint_origin,
        };
        let rewritten: usize = self.extensions_mut().map(|e| e.rewrite_frames(&rewrite)).sum();
        debug!(child, parent, moved, rewritten, "Lumped extensions");
    }
}
