//! Error types for URDF loading and conversion

use sdfconv_core::{DocumentError, SchemaError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UrdfError {
    #[error("Failed to parse URDF: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Robot [{0}] has no links")]
    NoLinks(String),
    #[error("Link [{0}] is defined more than once")]
    DuplicateLink(String),
    #[error("Joint [{joint}] has unknown type [{kind}]")]
    UnknownJointType { joint: String, kind: String },
    #[error("Joint [{joint}] references unknown link [{link}]")]
    UnknownLink { joint: String, link: String },
    #[error("Link [{0}] is the child of more than one joint")]
    MultipleParents(String),
    #[error("No root link found")]
    NoRootLink,
    #[error("Multiple root links found: {0:?}")]
    MultipleRoots(Vec<String>),
    #[error("Links not connected to the root: {0:?}")]
    Disconnected(Vec<String>),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to load schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write document: {0}")]
    Document(#[from] DocumentError),
}
