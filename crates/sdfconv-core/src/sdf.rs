//! SDF document wrapper
//!
//! An [`Sdf`] owns an element tree whose root is the versioned `<sdf>`
//! element built from a [`Schema`].

use std::path::Path;

use tracing::warn;

use crate::element::{ElementId, ElementTree};
use crate::error::{DocumentError, ErrorCode, Errors, SdfError};
use crate::schema::Schema;
use crate::xml;

#[derive(Debug, Clone)]
pub struct Sdf {
    tree: ElementTree,
    root: ElementId,
}

impl Sdf {
    /// Create an empty document at the schema's version
    pub fn new(schema: &Schema) -> Self {
        Self::with_version(schema, schema.version())
    }

    pub fn with_version(schema: &Schema, version: &str) -> Self {
        let mut tree = ElementTree::new();
        let root = tree.instantiate(schema.root());
        if let Err(e) = tree.set_attribute(root, "version", version) {
            warn!(error = %e, "Schema root has no version attribute");
        }
        Self { tree, root }
    }

    /// Parse and populate a document against `schema`
    pub fn from_xml(schema: &Schema, xml: &str) -> Result<(Self, Errors), DocumentError> {
        let mut sdf = Self::new(schema);
        let errors = sdf.set_from_string(xml)?;
        Ok((sdf, errors))
    }

    pub fn from_file(schema: &Schema, path: &Path) -> Result<(Self, Errors), DocumentError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_xml(schema, &content)
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn tree(&self) -> &ElementTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ElementTree {
        &mut self.tree
    }

    pub fn version(&self) -> String {
        self.tree.get::<String>(self.root, "version")
    }

    /// First `<model>` under the root
    pub fn model(&self) -> Option<ElementId> {
        self.tree.element(self.root, "model")
    }

    /// Replace the document content with `xml`, reading it through the
    /// element descriptions. Returns structural errors; hard XML errors are
    /// returned as `Err`.
    pub fn set_from_string(&mut self, xml: &str) -> Result<Errors, DocumentError> {
        let (raw, raw_root) = xml::parse_str(xml)?;
        let mut errors = Errors::new();
        if raw.name(raw_root) != self.tree.name(self.root) {
            errors.push(SdfError::new(
                ErrorCode::ElementIncorrectType,
                format!(
                    "Document root is <{}>, expected <{}>",
                    raw.name(raw_root),
                    self.tree.name(self.root)
                ),
            ));
            return Ok(errors);
        }

        self.tree.clear_elements(self.root);
        read_element(&mut self.tree, self.root, &raw, raw_root, &mut errors);
        errors.extend(self.tree.validate(self.root));
        Ok(errors)
    }

    pub fn validate(&self) -> Errors {
        self.tree.validate(self.root)
    }

    pub fn to_xml(&self) -> Result<String, DocumentError> {
        self.to_xml_with_indent(2)
    }

    pub fn to_xml_with_indent(&self, indent: usize) -> Result<String, DocumentError> {
        let body = xml::write_string(&self.tree, self.root, indent)?;
        Ok(format!("<?xml version='1.0'?>\n{}\n", body))
    }

    pub fn to_file(&self, path: &Path) -> Result<(), DocumentError> {
        let xml = self.to_xml()?;
        std::fs::write(path, xml)?;
        Ok(())
    }
}

fn read_element(
    tree: &mut ElementTree,
    target: ElementId,
    raw: &ElementTree,
    src: ElementId,
    errors: &mut Errors,
) {
    for attr in raw.attributes(src) {
        let key = attr.key();
        if tree.has_attribute(target, key) {
            if let Err(e) = tree.set_attribute(target, key, &attr.as_string()) {
                errors.push(SdfError::new(
                    ErrorCode::AttributeInvalid,
                    format!("In element [{}]: {}", tree.path(target), e),
                ));
            }
        } else {
            warn!(element = %tree.path(target), attribute = key, "Attribute not in schema, skipped");
        }
    }

    if let Some(text) = raw.value(src) {
        let text = text.as_string();
        if tree.value(target).is_some() {
            if let Err(e) = tree.set_value_str(target, &text) {
                errors.push(SdfError::new(
                    ErrorCode::ElementInvalid,
                    format!("In element [{}]: {}", tree.path(target), e),
                ));
            }
        } else {
            warn!(element = %tree.path(target), "Element carries text but has no value, skipped");
        }
    }

    for child in raw.elements(src) {
        let name = raw.name(*child);
        if tree.has_element_description(target, name) {
            let created = tree.add_element(target, name);
            read_element(tree, created, raw, *child, errors);
        } else if tree.copy_children(target) {
            let copy = tree.import(raw, *child);
            tree.insert_element(target, copy);
        } else {
            warn!(element = %tree.path(target), child = name, "Element not in schema, skipped");
        }
    }
}
