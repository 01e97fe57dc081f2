//! Error types shared by the document model
//!
//! Hard failures (I/O, malformed XML, bad schema files) are `thiserror` enums.
//! Structural problems found while reading or validating a document are
//! collected into an [`Errors`] list so callers can decide whether to go on.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::param::ParamType;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse XML: {0}")]
    ParseError(String),
    #[error("Failed to serialize XML: {0}")]
    SerializeError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid document structure: {0}")]
    ValidationError(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("Unable to parse [{value}] as {ty} for key [{key}]")]
    InvalidValue {
        key: String,
        ty: ParamType,
        value: String,
    },
    #[error("Element [{0}] has no value slot")]
    NoValue(String),
    #[error("Element [{element}] has no attribute [{key}]")]
    NoAttribute { element: String, key: String },
}

/// Category of a structural error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A required element is absent
    ElementMissing,
    /// An element of another kind was supplied where a specific one is required
    ElementIncorrectType,
    /// An element is present but its content is unusable
    ElementInvalid,
    /// A required attribute is absent
    AttributeMissing,
    /// An attribute value could not be interpreted
    AttributeInvalid,
    /// An element that may appear once appears several times
    ElementRepeated,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ElementMissing => "element missing",
            ErrorCode::ElementIncorrectType => "element incorrect type",
            ErrorCode::ElementInvalid => "element invalid",
            ErrorCode::AttributeMissing => "attribute missing",
            ErrorCode::AttributeInvalid => "attribute invalid",
            ErrorCode::ElementRepeated => "element repeated",
        };
        f.write_str(s)
    }
}

/// A single structural error
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct SdfError {
    pub code: ErrorCode,
    pub message: String,
}

impl SdfError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Accumulated structural errors
pub type Errors = Vec<SdfError>;
