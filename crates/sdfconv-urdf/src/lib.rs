//! sdfconv-urdf: URDF to SDF conversion
//!
//! The pipeline reads a URDF document into a [`KinematicTree`], collects
//! simulator extension blocks into an [`ExtensionStore`], optionally merges
//! links joined by fixed joints, and builds an SDF document from what is
//! left. [`UrdfConverter`] drives the whole pipeline.

pub mod blob;
pub mod builder;
pub mod convert;
pub mod error;
pub mod extension;
pub mod inertia;
pub mod model;
pub mod reduce;
pub mod urdf;

pub use blob::{Blob, Fragment, FrameRewrite};
pub use builder::SdfBuilder;
pub use convert::{Conversion, ConvertOptions, UrdfConverter};
pub use error::{ConvertError, UrdfError};
pub use extension::{Extension, ExtensionStore};
pub use model::{
    Geometry, Inertial, Joint, JointDynamics, JointKind, JointLimits, KinematicTree, Link, LinkId,
    Shape, ShapeGroups, ShapeId,
};
pub use reduce::{reduce_fixed_joints, ReductionContext};
pub use urdf::{parse_urdf, parse_urdf_file};
