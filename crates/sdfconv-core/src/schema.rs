//! Element descriptions - the schema that drives element construction and validation
//!
//! Descriptions are loaded from a TOML file listing element kinds. Each entry
//! names the element, its attributes, an optional value slot and references to
//! the child kinds it may contain. Entries are resolved into a tree of shared
//! [`ElementDescription`]s rooted at the first entry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ParamError;
use crate::param::{Param, ParamType};

const BUILTIN_SCHEMA: &str = include_str!("../schema/sdf-1.3.toml");

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read schema: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse schema: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Schema defines no elements")]
    Empty,
    #[error("Element [{parent}] references unknown element [{reference}]")]
    UnknownReference { parent: String, reference: String },
    #[error("Element [{0}] is defined more than once")]
    Duplicate(String),
    #[error("Element [{0}] contains itself")]
    Cycle(String),
    #[error("Invalid default in element [{element}]: {source}")]
    InvalidDefault {
        element: String,
        #[source]
        source: ParamError,
    },
}

/// How many times an element may appear under its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Required {
    /// Optional, at most once
    #[default]
    #[serde(rename = "0")]
    Optional,
    /// Exactly once
    #[serde(rename = "1")]
    One,
    /// At least once
    #[serde(rename = "+")]
    OneOrMore,
    /// Any number
    #[serde(rename = "*")]
    ZeroOrMore,
}

impl Required {
    pub fn as_str(&self) -> &'static str {
        match self {
            Required::Optional => "0",
            Required::One => "1",
            Required::OneOrMore => "+",
            Required::ZeroOrMore => "*",
        }
    }

    /// Whether the element must be present
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Required::One | Required::OneOrMore)
    }

    /// Whether the element may appear more than once
    pub fn allows_many(&self) -> bool {
        matches!(self, Required::OneOrMore | Required::ZeroOrMore)
    }
}

impl fmt::Display for Required {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Required {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Required::Optional),
            "1" => Ok(Required::One),
            "+" => Ok(Required::OneOrMore),
            "*" => Ok(Required::ZeroOrMore),
            other => Err(format!("unknown requirement marker [{}]", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueDescription {
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
}

/// Template for an element kind as it appears under a particular parent
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDescription {
    pub name: String,
    pub required: Required,
    pub description: String,
    pub copy_children: bool,
    pub value: Option<ValueDescription>,
    pub attributes: Vec<AttributeDescription>,
    pub children: Vec<Arc<ElementDescription>>,
}

impl ElementDescription {
    pub fn child(&self, name: &str) -> Option<&Arc<ElementDescription>> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The value slot as a fresh param, if this element carries one
    pub fn value_param(&self) -> Result<Option<Param>, ParamError> {
        self.value
            .as_ref()
            .map(|v| Param::new(&self.name, v.ty, &v.default, v.required, &v.description))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    version: String,
    #[serde(default, rename = "element")]
    elements: Vec<ElementEntry>,
}

#[derive(Debug, Deserialize)]
struct ElementEntry {
    name: String,
    /// Lookup key when two kinds share a tag name
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    copy_children: bool,
    #[serde(default)]
    value: Option<ValueDescription>,
    #[serde(default, rename = "attribute")]
    attributes: Vec<AttributeDescription>,
    #[serde(default, rename = "child")]
    children: Vec<ChildEntry>,
}

impl ElementEntry {
    fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
struct ChildEntry {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default)]
    required: Required,
}

/// Resolved set of element descriptions
#[derive(Debug, Clone)]
pub struct Schema {
    version: String,
    root: Arc<ElementDescription>,
    by_key: HashMap<String, Arc<ElementDescription>>,
}

impl Schema {
    /// The SDF 1.3 subset compiled into the crate
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_toml(BUILTIN_SCHEMA)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(content)?;
        let root_key = file
            .elements
            .first()
            .map(|e| e.key().to_string())
            .ok_or(SchemaError::Empty)?;

        let mut entries: HashMap<&str, &ElementEntry> = HashMap::new();
        for entry in &file.elements {
            if entries.insert(entry.key(), entry).is_some() {
                return Err(SchemaError::Duplicate(entry.key().to_string()));
            }
        }

        let mut resolver = Resolver {
            entries: &entries,
            resolved: HashMap::new(),
            in_progress: HashSet::new(),
        };
        for entry in &file.elements {
            resolver.resolve(entry.key())?;
        }
        let by_key = resolver.resolved;
        let root = by_key
            .get(root_key.as_str())
            .cloned()
            .ok_or(SchemaError::Empty)?;

        debug!(version = %file.version, elements = by_key.len(), "Loaded schema");
        Ok(Self {
            version: file.version,
            root,
            by_key,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Description of the document root element
    pub fn root(&self) -> &Arc<ElementDescription> {
        &self.root
    }

    /// Look up a description by entry id (or name when no id was given)
    pub fn describe(&self, key: &str) -> Option<&Arc<ElementDescription>> {
        self.by_key.get(key)
    }
}

struct Resolver<'a> {
    entries: &'a HashMap<&'a str, &'a ElementEntry>,
    resolved: HashMap<String, Arc<ElementDescription>>,
    in_progress: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, key: &str) -> Result<Arc<ElementDescription>, SchemaError> {
        if let Some(desc) = self.resolved.get(key) {
            return Ok(desc.clone());
        }
        if !self.in_progress.insert(key.to_string()) {
            return Err(SchemaError::Cycle(key.to_string()));
        }
        let entries = self.entries;
        let entry = entries.get(key).copied().ok_or_else(|| SchemaError::UnknownReference {
            parent: String::new(),
            reference: key.to_string(),
        })?;

        for attr in &entry.attributes {
            Param::new(&attr.name, attr.ty, &attr.default, attr.required, "").map_err(|source| {
                SchemaError::InvalidDefault {
                    element: entry.name.clone(),
                    source,
                }
            })?;
        }
        if let Some(value) = &entry.value {
            Param::new(&entry.name, value.ty, &value.default, value.required, "").map_err(
                |source| SchemaError::InvalidDefault {
                    element: entry.name.clone(),
                    source,
                },
            )?;
        }

        let mut children = Vec::with_capacity(entry.children.len());
        for child in &entry.children {
            if !entries.contains_key(child.reference.as_str()) {
                return Err(SchemaError::UnknownReference {
                    parent: entry.name.clone(),
                    reference: child.reference.clone(),
                });
            }
            let shared = self.resolve(&child.reference)?;
            // Requirement is a property of the occurrence, not of the kind
            let mut occurrence = (*shared).clone();
            occurrence.required = child.required;
            children.push(Arc::new(occurrence));
        }

        let desc = Arc::new(ElementDescription {
            name: entry.name.clone(),
            required: Required::Optional,
            description: entry.description.clone(),
            copy_children: entry.copy_children,
            value: entry.value.clone(),
            attributes: entry.attributes.clone(),
            children,
        });
        self.in_progress.remove(key);
        self.resolved.insert(key.to_string(), desc.clone());
        Ok(desc)
    }
}
