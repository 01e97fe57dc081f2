//! Generic element tree
//!
//! Elements live in an arena ([`ElementTree`]) and are addressed by
//! [`ElementId`]. Each node stores its parent as an index, so detaching a node
//! clears the link on both sides in one call and detached nodes stay
//! addressable until the tree is dropped.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{ErrorCode, Errors, ParamError, SdfError};
use crate::param::{Param, ParamType, ParamValue};
use crate::schema::{ElementDescription, Required};

/// Stable handle to an element inside one [`ElementTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

#[derive(Debug, Clone)]
struct Node {
    name: String,
    required: Required,
    description: String,
    copy_children: bool,
    include: Option<String>,
    parent: Option<ElementId>,
    attributes: Vec<Param>,
    value: Option<Param>,
    children: Vec<ElementId>,
    descriptions: Vec<Arc<ElementDescription>>,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: Required::Optional,
            description: String::new(),
            copy_children: false,
            include: None,
            parent: None,
            attributes: Vec::new(),
            value: None,
            children: Vec::new(),
            descriptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElementTree {
    nodes: Vec<Node>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements ever allocated in this tree, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: Node) -> ElementId {
        self.nodes.push(node);
        ElementId(self.nodes.len() - 1)
    }

    fn node(&self, id: ElementId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: ElementId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Create a detached element with no schema
    pub fn create(&mut self, name: &str) -> ElementId {
        self.push(Node::new(name))
    }

    /// Create a detached element from a description: attributes, value slot
    /// and child descriptions are copied, children themselves are not created.
    pub fn instantiate(&mut self, desc: &ElementDescription) -> ElementId {
        let mut node = Node::new(&desc.name);
        node.required = desc.required;
        node.description = desc.description.clone();
        node.copy_children = desc.copy_children;
        node.descriptions = desc.children.clone();

        for attr in &desc.attributes {
            match Param::new(&attr.name, attr.ty, &attr.default, attr.required, &attr.description) {
                Ok(param) => node.attributes.push(param),
                Err(e) => error!(element = %desc.name, error = %e, "Skipping attribute"),
            }
        }
        match desc.value_param() {
            Ok(value) => node.value = value,
            Err(e) => error!(element = %desc.name, error = %e, "Skipping value slot"),
        }
        self.push(node)
    }

    pub fn name(&self, id: ElementId) -> &str {
        &self.node(id).name
    }

    pub fn set_name(&mut self, id: ElementId, name: &str) {
        self.node_mut(id).name = name.to_string();
    }

    pub fn required(&self, id: ElementId) -> Required {
        self.node(id).required
    }

    pub fn set_required(&mut self, id: ElementId, required: Required) {
        self.node_mut(id).required = required;
    }

    pub fn description(&self, id: ElementId) -> &str {
        &self.node(id).description
    }

    pub fn set_description(&mut self, id: ElementId, description: &str) {
        self.node_mut(id).description = description.to_string();
    }

    pub fn copy_children(&self, id: ElementId) -> bool {
        self.node(id).copy_children
    }

    pub fn set_copy_children(&mut self, id: ElementId, copy: bool) {
        self.node_mut(id).copy_children = copy;
    }

    pub fn include(&self, id: ElementId) -> Option<&str> {
        self.node(id).include.as_deref()
    }

    pub fn set_include(&mut self, id: ElementId, filename: &str) {
        self.node_mut(id).include = Some(filename.to_string());
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).parent
    }

    /// Slash-separated names from the root down to `id`
    pub fn path(&self, id: ElementId) -> String {
        let mut names = vec![self.name(id)];
        let mut current = self.parent(id);
        while let Some(p) = current {
            names.push(self.name(p));
            current = self.parent(p);
        }
        names.reverse();
        names.join("/")
    }

    // ---- attributes and value --------------------------------------------

    /// Register an attribute slot, replacing any slot with the same key
    pub fn add_attribute(
        &mut self,
        id: ElementId,
        key: &str,
        ty: ParamType,
        default: &str,
        required: bool,
        description: &str,
    ) -> Result<(), ParamError> {
        let param = Param::new(key, ty, default, required, description)?;
        let node = self.node_mut(id);
        match node.attributes.iter_mut().find(|a| a.key() == key) {
            Some(existing) => *existing = param,
            None => node.attributes.push(param),
        }
        Ok(())
    }

    /// Register the element's own value slot
    pub fn add_value(
        &mut self,
        id: ElementId,
        ty: ParamType,
        default: &str,
        required: bool,
        description: &str,
    ) -> Result<(), ParamError> {
        let name = self.name(id).to_string();
        let param = Param::new(&name, ty, default, required, description)?;
        self.node_mut(id).value = Some(param);
        Ok(())
    }

    pub fn attributes(&self, id: ElementId) -> &[Param] {
        &self.node(id).attributes
    }

    pub fn attribute(&self, id: ElementId, key: &str) -> Option<&Param> {
        self.node(id).attributes.iter().find(|a| a.key() == key)
    }

    pub fn has_attribute(&self, id: ElementId, key: &str) -> bool {
        self.attribute(id, key).is_some()
    }

    /// True when the attribute exists and was given a value
    pub fn attribute_set(&self, id: ElementId, key: &str) -> bool {
        self.attribute(id, key).is_some_and(|a| a.is_set())
    }

    pub fn set_attribute(&mut self, id: ElementId, key: &str, value: &str) -> Result<(), ParamError> {
        let element = self.name(id).to_string();
        match self.node_mut(id).attributes.iter_mut().find(|a| a.key() == key) {
            Some(attr) => attr.set_from_str(value),
            None => Err(ParamError::NoAttribute {
                element,
                key: key.to_string(),
            }),
        }
    }

    pub fn value(&self, id: ElementId) -> Option<&Param> {
        self.node(id).value.as_ref()
    }

    pub fn value_mut(&mut self, id: ElementId) -> Option<&mut Param> {
        self.node_mut(id).value.as_mut()
    }

    /// Store into the element's own value; false when there is no value slot
    /// or the value does not fit its type
    pub fn set<T: ParamValue>(&mut self, id: ElementId, value: T) -> bool {
        match self.node_mut(id).value.as_mut() {
            Some(param) => match param.set(value) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Unable to set element value");
                    false
                }
            },
            None => false,
        }
    }

    pub fn set_value_str(&mut self, id: ElementId, text: &str) -> Result<(), ParamError> {
        let name = self.name(id).to_string();
        match self.node_mut(id).value.as_mut() {
            Some(param) => param.set_from_str(text),
            None => Err(ParamError::NoValue(name)),
        }
    }

    /// Resolve `key` against, in order: the element's own value (empty key),
    /// an attribute, a child element's value, a described child's default.
    pub fn try_get<T: ParamValue>(&self, id: ElementId, key: &str) -> Option<T> {
        if key.is_empty() {
            return self.value(id).and_then(|p| p.get());
        }
        if let Some(attr) = self.attribute(id, key) {
            return attr.get();
        }
        if let Some(child) = self.element(id, key) {
            return self.value(child).and_then(|p| p.get());
        }
        let desc = self.element_description(id, key)?;
        desc.value_param().ok().flatten().and_then(|p| p.get())
    }

    /// Like [`try_get`](Self::try_get), logging and returning `T::default()`
    /// when nothing resolves.
    pub fn get<T: ParamValue>(&self, id: ElementId, key: &str) -> T {
        match self.try_get(id, key) {
            Some(value) => value,
            None => {
                error!(element = %self.path(id), key, "Unable to find value");
                T::default()
            }
        }
    }

    // ---- children ---------------------------------------------------------

    pub fn elements(&self, id: ElementId) -> &[ElementId] {
        &self.node(id).children
    }

    pub fn elements_named<'a>(
        &'a self,
        id: ElementId,
        name: &'a str,
    ) -> impl Iterator<Item = ElementId> + 'a {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |c| self.name(*c) == name)
    }

    pub fn has_element(&self, id: ElementId, name: &str) -> bool {
        self.element(id, name).is_some()
    }

    /// First child with the given name
    pub fn element(&self, id: ElementId, name: &str) -> Option<ElementId> {
        self.elements_named(id, name).next()
    }

    /// First child with the given name, created if absent
    pub fn get_element(&mut self, id: ElementId, name: &str) -> ElementId {
        match self.element(id, name) {
            Some(child) => child,
            None => self.add_element(id, name),
        }
    }

    /// Append a new child, pre-populated from this element's description of
    /// `name` when one exists
    pub fn add_element(&mut self, id: ElementId, name: &str) -> ElementId {
        let child = match self.element_description(id, name).cloned() {
            Some(desc) => self.instantiate(&desc),
            None => {
                debug!(parent = %self.name(id), element = name, "No description, adding bare element");
                self.create(name)
            }
        };
        self.attach(id, child);
        child
    }

    pub fn first_element(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).children.first().copied()
    }

    /// Next sibling after `id`, optionally restricted to a name
    pub fn next_element(&self, id: ElementId, name: Option<&str>) -> Option<ElementId> {
        let parent = self.parent(id)?;
        let siblings = &self.node(parent).children;
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|c| name.map_or(true, |n| self.name(*c) == n))
    }

    fn attach(&mut self, parent: ElementId, child: ElementId) {
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    fn is_ancestor(&self, candidate: ElementId, of: ElementId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Attach an existing element as the last child of `id`, detaching it from
    /// any previous parent. Refuses to create a cycle.
    pub fn insert_element(&mut self, id: ElementId, child: ElementId) -> bool {
        if self.is_ancestor(child, id) {
            error!(
                parent = %self.name(id),
                child = %self.name(child),
                "Refusing to insert an element into its own subtree"
            );
            return false;
        }
        self.remove_from_parent(child);
        self.attach(id, child);
        true
    }

    pub fn remove_from_parent(&mut self, id: ElementId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
    }

    /// Detach `child` from `id`; false when it is not a child of `id`
    pub fn remove_child(&mut self, id: ElementId, child: ElementId) -> bool {
        if self.parent(child) != Some(id) {
            return false;
        }
        self.remove_from_parent(child);
        true
    }

    pub fn clear_elements(&mut self, id: ElementId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.node_mut(child).parent = None;
        }
    }

    /// Deep copy of `id`; the copy is detached
    pub fn clone_element(&mut self, id: ElementId) -> ElementId {
        let mut node = self.node(id).clone();
        let children = std::mem::take(&mut node.children);
        node.parent = None;
        let copy = self.push(node);
        for child in children {
            let child_copy = self.clone_element(child);
            self.attach(copy, child_copy);
        }
        copy
    }

    /// Deep copy of an element from another tree; the copy is detached
    pub fn import(&mut self, other: &ElementTree, id: ElementId) -> ElementId {
        let mut node = other.node(id).clone();
        node.children.clear();
        node.parent = None;
        let copy = self.push(node);
        for child in other.elements(id) {
            let child_copy = self.import(other, *child);
            self.attach(copy, child_copy);
        }
        copy
    }

    /// Overwrite the content of `dst` with that of `src`: name, attribute
    /// values (adding missing slots), value and children. `dst` keeps its
    /// place in its parent.
    pub fn copy(&mut self, dst: ElementId, other: &ElementTree, src: ElementId) {
        let source = other.node(src);
        {
            let node = self.node_mut(dst);
            node.name = source.name.clone();
            node.copy_children = source.copy_children;
            for attr in &source.attributes {
                match node.attributes.iter_mut().find(|a| a.key() == attr.key()) {
                    Some(existing) => *existing = attr.clone(),
                    None => node.attributes.push(attr.clone()),
                }
            }
            if source.value.is_some() {
                node.value = source.value.clone();
            }
        }
        self.clear_elements(dst);
        for child in other.elements(src) {
            let child_copy = self.import(other, *child);
            self.attach(dst, child_copy);
        }
    }

    /// Value-based structural equality across trees
    pub fn deep_eq(&self, id: ElementId, other: &ElementTree, other_id: ElementId) -> bool {
        if self.name(id) != other.name(other_id) {
            return false;
        }
        let attrs = |tree: &ElementTree, id: ElementId| {
            let mut list: Vec<(String, String)> = tree
                .attributes(id)
                .iter()
                .filter(|a| a.is_set())
                .map(|a| (a.key().to_string(), a.as_string()))
                .collect();
            list.sort();
            list
        };
        if attrs(self, id) != attrs(other, other_id) {
            return false;
        }
        let value_a = self.value(id).map(|p| p.as_string());
        let value_b = other.value(other_id).map(|p| p.as_string());
        if value_a != value_b {
            return false;
        }
        let children_a = self.elements(id);
        let children_b = other.elements(other_id);
        children_a.len() == children_b.len()
            && children_a
                .iter()
                .zip(children_b)
                .all(|(a, b)| self.deep_eq(*a, other, *b))
    }

    // ---- descriptions -----------------------------------------------------

    pub fn add_element_description(&mut self, id: ElementId, desc: Arc<ElementDescription>) {
        self.node_mut(id).descriptions.push(desc);
    }

    pub fn element_descriptions(&self, id: ElementId) -> &[Arc<ElementDescription>] {
        &self.node(id).descriptions
    }

    pub fn element_description(&self, id: ElementId, name: &str) -> Option<&Arc<ElementDescription>> {
        self.node(id).descriptions.iter().find(|d| d.name == name)
    }

    pub fn has_element_description(&self, id: ElementId, name: &str) -> bool {
        self.element_description(id, name).is_some()
    }

    /// Check required attributes and child counts against the descriptions,
    /// recursively
    pub fn validate(&self, id: ElementId) -> Errors {
        let mut errors = Errors::new();
        self.validate_into(id, &mut errors);
        errors
    }

    fn validate_into(&self, id: ElementId, errors: &mut Errors) {
        for attr in self.attributes(id) {
            if attr.is_required() && !attr.is_set() && attr.default_as_string().is_empty() {
                errors.push(SdfError::new(
                    ErrorCode::AttributeMissing,
                    format!(
                        "Required attribute [{}] in element [{}] is not set",
                        attr.key(),
                        self.path(id)
                    ),
                ));
            }
        }
        for desc in self.element_descriptions(id) {
            let count = self.elements_named(id, &desc.name).count();
            if desc.required.is_mandatory() && count == 0 {
                errors.push(SdfError::new(
                    ErrorCode::ElementMissing,
                    format!(
                        "Missing required element [{}] in [{}]",
                        desc.name,
                        self.path(id)
                    ),
                ));
            }
            if !desc.required.allows_many() && count > 1 {
                errors.push(SdfError::new(
                    ErrorCode::ElementRepeated,
                    format!(
                        "Element [{}] appears {} times in [{}], at most one allowed",
                        desc.name,
                        count,
                        self.path(id)
                    ),
                ));
            }
        }
        for child in self.elements(id) {
            self.validate_into(*child, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Pose;
    use crate::schema::Schema;
    use nalgebra::Vector3;

    fn link_tree() -> (ElementTree, ElementId) {
        let schema = Schema::builtin().unwrap();
        let mut tree = ElementTree::new();
        let link = tree.instantiate(schema.describe("link").unwrap());
        (tree, link)
    }

    #[test]
    fn test_get_resolution_order() {
        let (mut tree, link) = link_tree();
        tree.set_attribute(link, "name", "base").unwrap();

        // attribute
        assert_eq!(tree.get::<String>(link, "name"), "base");
        // described child that does not exist yet falls back to its default
        assert!(tree.get::<bool>(link, "gravity"));
        assert!(!tree.has_element(link, "gravity"));

        // existing child wins over the description default
        let gravity = tree.add_element(link, "gravity");
        assert!(tree.set(gravity, false));
        assert!(!tree.get::<bool>(link, "gravity"));

        // own value with an empty key
        assert!(!tree.get::<bool>(gravity, ""));

        // nothing resolves: zero value
        assert_eq!(tree.get::<f64>(link, "no_such_key"), 0.0);
        assert_eq!(tree.try_get::<f64>(link, "no_such_key"), None);
    }

    #[test]
    fn test_set_without_value_slot_fails() {
        let (mut tree, link) = link_tree();
        assert!(!tree.set(link, 1.0f64));
        assert!(tree.value(link).is_none());
        assert!(matches!(
            tree.set_value_str(link, "1"),
            Err(ParamError::NoValue(_))
        ));
    }

    #[test]
    fn test_add_element_uses_description() {
        let (mut tree, link) = link_tree();
        let inertial = tree.add_element(link, "inertial");
        let mass = tree.add_element(inertial, "mass");
        assert_eq!(tree.value(mass).unwrap().ty(), ParamType::Double);
        assert_eq!(tree.get::<f64>(mass, ""), 1.0);
        assert_eq!(tree.parent(mass), Some(inertial));

        // get_element returns the existing child instead of adding another
        let again = tree.get_element(inertial, "mass");
        assert_eq!(again, mass);
        assert_eq!(tree.elements(inertial).len(), 1);

        // undescribed children are still allowed, without schema
        let custom = tree.add_element(link, "custom");
        assert!(tree.value(custom).is_none());
        assert!(tree.element_descriptions(custom).is_empty());
    }

    #[test]
    fn test_sibling_iteration() {
        let (mut tree, link) = link_tree();
        let c1 = tree.add_element(link, "collision");
        let v1 = tree.add_element(link, "visual");
        let c2 = tree.add_element(link, "collision");

        assert_eq!(tree.first_element(link), Some(c1));
        assert_eq!(tree.next_element(c1, Some("collision")), Some(c2));
        assert_eq!(tree.next_element(c1, None), Some(v1));
        assert_eq!(tree.next_element(c2, None), None);
        assert_eq!(tree.elements_named(link, "collision").count(), 2);
    }

    #[test]
    fn test_remove_and_clear_detach_both_sides() {
        let (mut tree, link) = link_tree();
        let pose = tree.add_element(link, "pose");
        let inertial = tree.add_element(link, "inertial");

        tree.remove_from_parent(pose);
        assert_eq!(tree.parent(pose), None);
        assert_eq!(tree.elements(link), &[inertial]);
        // detached elements stay usable
        assert!(tree.set(pose, Pose::from_xyz_rpy([1.0, 0.0, 0.0], [0.0; 3])));

        assert!(!tree.remove_child(link, pose));
        assert!(tree.remove_child(link, inertial));
        assert!(tree.elements(link).is_empty());

        tree.insert_element(link, pose);
        tree.insert_element(link, inertial);
        tree.clear_elements(link);
        assert!(tree.elements(link).is_empty());
        assert_eq!(tree.parent(inertial), None);
    }

    #[test]
    fn test_insert_moves_and_refuses_cycles() {
        let (mut tree, link) = link_tree();
        let a = tree.add_element(link, "inertial");
        let b = tree.add_element(link, "collision");

        assert!(tree.insert_element(b, a));
        assert_eq!(tree.parent(a), Some(b));
        assert_eq!(tree.elements(link), &[b]);

        assert!(!tree.insert_element(a, link));
        assert!(!tree.insert_element(a, a));
    }

    #[test]
    fn test_clone_is_detached_deep_copy() {
        let (mut tree, link) = link_tree();
        tree.set_attribute(link, "name", "arm").unwrap();
        let visual = tree.add_element(link, "visual");
        tree.set_attribute(visual, "name", "arm_vis").unwrap();
        let geometry = tree.add_element(visual, "geometry");
        let sphere = tree.add_element(geometry, "sphere");
        let radius = tree.add_element(sphere, "radius");
        tree.set(radius, 0.5f64);
        tree.set_include(link, "arm.sdf");

        let copy = tree.clone_element(visual);
        assert_eq!(tree.parent(copy), None);
        assert_ne!(copy, visual);
        assert!(tree.deep_eq(copy, &tree, visual));

        // changing the copy leaves the original alone
        let copy_radius = tree
            .element(copy, "geometry")
            .and_then(|g| tree.element(g, "sphere"))
            .and_then(|s| tree.element(s, "radius"))
            .unwrap();
        tree.set(copy_radius, 2.0f64);
        assert_eq!(tree.get::<f64>(radius, ""), 0.5);
        assert!(!tree.deep_eq(copy, &tree, visual));

        let link_copy = tree.clone_element(link);
        assert_eq!(tree.include(link_copy), Some("arm.sdf"));
        assert!(tree.has_element_description(link_copy, "visual"));
    }

    #[test]
    fn test_import_and_copy_between_trees() {
        let (mut tree, link) = link_tree();
        tree.set_attribute(link, "name", "wheel").unwrap();
        let pose = tree.add_element(link, "pose");
        tree.set(pose, Pose::from_xyz_rpy([0.0, 0.0, 1.0], [0.0; 3]));

        let mut other = ElementTree::new();
        let imported = other.import(&tree, link);
        assert!(other.deep_eq(imported, &tree, link));

        let mut target = ElementTree::new();
        let root = target.create("model");
        let placeholder = target.add_element(root, "placeholder");
        let stale = target.add_element(placeholder, "stale");
        target.copy(placeholder, &tree, link);
        assert_eq!(target.name(placeholder), "link");
        assert_eq!(target.parent(placeholder), Some(root));
        assert_eq!(target.parent(stale), None);
        assert!(target.deep_eq(placeholder, &tree, link));
    }

    #[test]
    fn test_validate_reports_missing_and_repeated() {
        let (mut tree, link) = link_tree();
        let collision = tree.add_element(link, "collision");
        let errors = tree.validate(link);
        let codes: Vec<ErrorCode> = errors.iter().map(|e| e.code).collect();
        // link name, collision name, collision geometry
        assert_eq!(
            codes.iter().filter(|c| **c == ErrorCode::AttributeMissing).count(),
            2
        );
        assert!(codes.contains(&ErrorCode::ElementMissing));

        tree.set_attribute(link, "name", "l").unwrap();
        tree.set_attribute(collision, "name", "c").unwrap();
        tree.add_element(collision, "geometry");
        tree.add_element(link, "pose");
        tree.add_element(link, "pose");
        let errors = tree.validate(link);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::ElementRepeated);
    }

    #[test]
    fn test_add_attribute_and_value() {
        let mut tree = ElementTree::new();
        let id = tree.create("axis");
        tree.add_value(id, ParamType::Vector3, "0 0 1", true, "axis").unwrap();
        tree.add_attribute(id, "frame", ParamType::String, "", false, "")
            .unwrap();
        assert!(tree.has_attribute(id, "frame"));
        assert!(!tree.attribute_set(id, "frame"));
        tree.set_attribute(id, "frame", "model").unwrap();
        assert!(tree.attribute_set(id, "frame"));
        assert_eq!(tree.get::<Vector3<f64>>(id, ""), Vector3::new(0.0, 0.0, 1.0));

        assert!(tree
            .add_attribute(id, "bad", ParamType::Double, "nope", false, "")
            .is_err());
        assert!(matches!(
            tree.set_attribute(id, "missing", "x"),
            Err(ParamError::NoAttribute { .. })
        ));
    }
}
