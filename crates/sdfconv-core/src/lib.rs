//! sdfconv core - document model for the SDF output format
//!
//! This crate provides the pieces every converter builds on:
//! - Typed parameters and the arena-backed element tree
//! - Element descriptions (schema) loaded from TOML, with a built-in SDF 1.3 subset
//! - Poses and frame composition
//! - The `Sdf` document with XML reading, validation and writing
//! - Diagnostics and structural error lists
//! - The sensor sub-model

pub mod diagnostics;
pub mod element;
pub mod error;
pub mod param;
pub mod pose;
pub mod schema;
pub mod sdf;
pub mod sensor;
pub mod xml;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use element::{ElementId, ElementTree};
pub use error::{DocumentError, ErrorCode, Errors, ParamError, SdfError};
pub use param::{Param, ParamType, ParamValue, Value};
pub use pose::{compose, inverse_compose, Pose};
pub use schema::{ElementDescription, Required, Schema, SchemaError};
pub use sdf::Sdf;
pub use sensor::{Sensor, SensorType};
