//! Fixed-joint reduction
//!
//! Every link attached to its parent through a fixed joint is merged into the
//! parent: its extensions, mass properties and shapes move up, and its own
//! children are re-attached to the nearest ancestor that survives. The walk is
//! depth first, so a chain of fixed joints collapses bottom up and each
//! shape's pose accumulates every joint origin along the way.

use sdfconv_core::{compose, Diagnostics, Pose};
use tracing::debug;

use crate::extension::ExtensionStore;
use crate::inertia;
use crate::model::{lumped_group_key, KinematicTree, LinkId, ShapeGroups};

/// Everything one reduction pass mutates
pub struct ReductionContext<'a> {
    pub tree: &'a mut KinematicTree,
    pub extensions: &'a mut ExtensionStore,
    pub diagnostics: &'a mut Diagnostics,
    /// Links attached to this one are never lumped into it
    pub root_link_name: &'a str,
}

impl ReductionContext<'_> {
    fn is_fixed(&self, id: LinkId) -> bool {
        self.tree.link(id).is_fixed_to_parent()
    }

    /// Attached to a non-sentinel parent through a fixed joint
    fn should_lump(&self, id: LinkId) -> bool {
        let link = self.tree.link(id);
        match link.parent {
            Some(parent) => link.is_fixed_to_parent() && self.tree.link(parent).name != self.root_link_name,
            None => false,
        }
    }
}

/// Collapse every fixed joint below the root
pub fn reduce_fixed_joints(ctx: &mut ReductionContext<'_>) {
    let root = ctx.tree.root();
    reduce_link(ctx, root);
}

fn reduce_link(ctx: &mut ReductionContext<'_>, id: LinkId) {
    let fixed: Vec<LinkId> = ctx
        .tree
        .link(id)
        .children
        .iter()
        .copied()
        .filter(|c| ctx.is_fixed(*c))
        .collect();
    for child in fixed {
        reduce_link(ctx, child);
    }

    if ctx.should_lump(id) {
        lump_into_parent(ctx, id);
    }

    // children may have changed while lumping
    let movable: Vec<LinkId> = ctx
        .tree
        .link(id)
        .children
        .iter()
        .copied()
        .filter(|c| !ctx.is_fixed(*c))
        .collect();
    for child in movable {
        reduce_link(ctx, child);
    }
}

fn lump_into_parent(ctx: &mut ReductionContext<'_>, id: LinkId) {
    let (parent_id, joint) = {
        let link = ctx.tree.link(id);
        match (link.parent, link.parent_joint.clone()) {
            (Some(parent), Some(joint)) => (parent, joint),
            _ => return,
        }
    };
    let origin = joint.origin;
    let child_name = ctx.tree.link(id).name.clone();
    let parent_name = ctx.tree.link(parent_id).name.clone();
    debug!(
        link = %child_name,
        parent = %parent_name,
        joint = %joint.name,
        "Lumping link through fixed joint"
    );

    ctx.extensions.lump_link(&child_name, &parent_name, &origin);

    // a massless link contributes nothing
    if let Some(child_inertial) = ctx.tree.link(id).inertial.filter(|i| i.mass > 0.0) {
        let parent = ctx.tree.link_mut(parent_id);
        parent.inertial = Some(inertia::combine(parent.inertial.as_ref(), &child_inertial, &origin));
    }

    let visuals = std::mem::take(&mut ctx.tree.link_mut(id).visual_groups);
    let collisions = std::mem::take(&mut ctx.tree.link_mut(id).collision_groups);
    {
        let parent = ctx.tree.link_mut(parent_id);
        merge_groups(visuals, &mut parent.visual_groups, &child_name, &origin, "visual", ctx.diagnostics);
        merge_groups(
            collisions,
            &mut parent.collision_groups,
            &child_name,
            &origin,
            "collision",
            ctx.diagnostics,
        );
    }

    let grandchildren = ctx.tree.link(id).children.clone();
    for grandchild in grandchildren {
        reattach(ctx, id, grandchild);
    }

    ctx.tree.detach(id);
}

fn merge_groups(
    from: ShapeGroups,
    into: &mut ShapeGroups,
    child_name: &str,
    origin: &Pose,
    kind: &str,
    diagnostics: &mut Diagnostics,
) {
    for (group, shapes) in from {
        let target = into.entry(lumped_group_key(&group, child_name)).or_default();
        for mut shape in shapes {
            shape.origin = compose(&shape.origin, origin);
            if target.iter().any(|s| s.id == shape.id) {
                diagnostics.warn(format!(
                    "A {} shape lumped from link [{}] is already present in its new group",
                    kind, child_name
                ));
            }
            target.push(shape);
        }
    }
}

/// Attach `grandchild` of the lumped link `via` to the first ancestor that is
/// not itself lumped, accumulating joint origins along the way
fn reattach(ctx: &mut ReductionContext<'_>, via: LinkId, grandchild: LinkId) {
    let Some(mut origin) = ctx.tree.link(grandchild).parent_joint.as_ref().map(|j| j.origin) else {
        return;
    };
    let mut new_parent = via;
    while ctx.should_lump(new_parent) {
        let link = ctx.tree.link(new_parent);
        let (Some(parent), Some(joint)) = (link.parent, link.parent_joint.as_ref()) else {
            break;
        };
        origin = compose(&origin, &joint.origin);
        new_parent = parent;
    }

    let new_parent_name = ctx.tree.link(new_parent).name.clone();
    if let Some(joint) = ctx.tree.link_mut(grandchild).parent_joint.as_mut() {
        joint.origin = origin;
        debug!(
            joint = %joint.name,
            parent = %new_parent_name,
            "Re-attaching joint to surviving ancestor"
        );
    }
    ctx.tree.reparent(grandchild, new_parent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::urdf::parse_urdf;

    fn reduce(urdf: &str) -> (KinematicTree, ExtensionStore, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut tree = parse_urdf(urdf, &mut diagnostics).unwrap();
        let tags = vec!["gazebo".to_string()];
        let mut extensions = ExtensionStore::parse(urdf, &tags, &mut diagnostics).unwrap();
        let mut ctx = ReductionContext {
            tree: &mut tree,
            extensions: &mut extensions,
            diagnostics: &mut diagnostics,
            root_link_name: "world",
        };
        reduce_fixed_joints(&mut ctx);
        (tree, extensions, diagnostics)
    }

    const CHAIN: &str = r#"<robot name="chain">
      <link name="a">
        <inertial><mass value="1"/><inertia ixx="1" iyy="1" izz="1" ixy="0" ixz="0" iyz="0"/></inertial>
        <visual><geometry><box size="1 1 1"/></geometry></visual>
      </link>
      <link name="b">
        <inertial><mass value="1"/><inertia ixx="1" iyy="1" izz="1" ixy="0" ixz="0" iyz="0"/></inertial>
        <visual><geometry><sphere radius="0.1"/></geometry></visual>
        <collision><geometry><sphere radius="0.1"/></geometry></collision>
      </link>
      <link name="c">
        <inertial><mass value="1"/><inertia ixx="1" iyy="1" izz="1" ixy="0" ixz="0" iyz="0"/></inertial>
        <visual><geometry><cylinder radius="0.1" length="0.2"/></geometry></visual>
      </link>
      <link name="d">
        <inertial><mass value="1"/><inertia ixx="1" iyy="1" izz="1" ixy="0" ixz="0" iyz="0"/></inertial>
      </link>
      <joint name="ab" type="fixed">
        <parent link="a"/><child link="b"/><origin xyz="1 0 0"/>
      </joint>
      <joint name="bc" type="fixed">
        <parent link="b"/><child link="c"/><origin xyz="0 1 0"/>
      </joint>
      <joint name="cd" type="revolute">
        <parent link="c"/><child link="d"/><origin xyz="0 0 1"/><axis xyz="0 0 1"/>
        <limit lower="-1" upper="1" effort="1" velocity="1"/>
      </joint>
      <gazebo reference="c">
        <sensor name="cam" type="camera"><pose>0 0 0 0 0 0</pose></sensor>
      </gazebo>
    </robot>"#;

    #[test]
    fn test_chain_collapses_into_root() {
        let (tree, _, _) = reduce(CHAIN);
        let a = tree.link_id("a").unwrap();
        let d = tree.link_id("d").unwrap();

        assert_eq!(tree.attached_links(), vec![a, d]);
        assert_eq!(tree.link(d).parent, Some(a));

        let joint = tree.link(d).parent_joint.as_ref().unwrap();
        assert_eq!(joint.parent_link, "a");
        assert!(joint.origin.approx_eq(&Pose::from_xyz_rpy([1.0, 1.0, 1.0], [0.0; 3]), 1e-12));
    }

    #[test]
    fn test_shapes_are_conserved_and_keyed_by_origin() {
        let (tree, _, _) = reduce(CHAIN);
        assert_eq!(tree.total_visuals(), 3);
        assert_eq!(tree.total_collisions(), 1);

        let a = tree.link_by_name("a").unwrap();
        assert_eq!(a.visual_count(), 3);
        let from_c = &a.visual_groups["lump::c"];
        assert_eq!(from_c.len(), 1);
        assert_eq!(from_c[0].origin.xyz(), [1.0, 1.0, 0.0]);
        assert_eq!(a.visual_groups["lump::b"][0].origin.xyz(), [1.0, 0.0, 0.0]);
        assert_eq!(a.collision_groups["lump::b"].len(), 1);
    }

    #[test]
    fn test_masses_are_summed() {
        let (tree, _, _) = reduce(CHAIN);
        let a = tree.link_by_name("a").unwrap();
        assert!((a.mass() - 3.0).abs() < 1e-12);
        let com = a.inertial.unwrap().origin.position;
        assert!((com.x - 2.0 / 3.0).abs() < 1e-12);
        assert!((com.y - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_extension_follows_chain() {
        let (_, extensions, _) = reduce(CHAIN);
        assert!(!extensions.contains("c"));
        assert!(!extensions.contains("b"));

        let ext = extensions.for_original("a", "c").next().unwrap();
        let expected = Pose::from_xyz_rpy([1.0, 1.0, 0.0], [0.0; 3]);
        assert!(ext.reduction_transform.approx_eq(&expected, 1e-12));

        let pose: Pose = ext.blobs[0].fragment().child_text("pose").unwrap().parse().unwrap();
        assert!(pose.approx_eq(&expected, 1e-9));
    }

    #[test]
    fn test_world_anchor_is_kept() {
        let (tree, _, _) = reduce(
            r#"<robot name="r">
              <link name="world"/>
              <link name="base"><inertial><mass value="1"/></inertial></link>
              <link name="plate"><inertial><mass value="2"/></inertial></link>
              <joint name="anchor" type="fixed"><parent link="world"/><child link="base"/></joint>
              <joint name="mount" type="fixed"><parent link="base"/><child link="plate"/></joint>
            </robot>"#,
        );
        let world = tree.link_id("world").unwrap();
        let base = tree.link_id("base").unwrap();
        assert_eq!(tree.attached_links(), vec![world, base]);
        assert!((tree.link(base).mass() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_movable_joints_untouched() {
        let urdf = r#"<robot name="r">
          <link name="a"><inertial><mass value="1"/></inertial></link>
          <link name="b"><inertial><mass value="1"/></inertial></link>
          <joint name="j" type="continuous"><parent link="a"/><child link="b"/><origin xyz="0 0 2"/></joint>
        </robot>"#;
        let (tree, _, diagnostics) = reduce(urdf);
        assert_eq!(tree.attached_links().len(), 2);
        assert_eq!(tree.link_by_name("b").unwrap().parent_joint.as_ref().unwrap().origin.xyz(), [0.0, 0.0, 2.0]);
        assert!(!diagnostics.has_errors());
    }
}
