//! JSON conversion report

use anyhow::Result;
use chrono::{DateTime, Utc};
use sdfconv_core::Diagnostics;
use sdfconv_urdf::Conversion;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Summary of one conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub source: String,
    /// SHA-256 of the source document
    pub source_sha256: String,
    pub generated_at: DateTime<Utc>,
    pub sdf_version: String,
    pub links: usize,
    pub joints: usize,
    pub diagnostics: Diagnostics,
}

impl Report {
    pub fn new(source: &Path, content: &[u8], conversion: &Conversion) -> Self {
        Self {
            source: source.display().to_string(),
            source_sha256: sha256_hex(content),
            generated_at: Utc::now(),
            sdf_version: conversion.sdf.version(),
            links: conversion.link_count(),
            joints: conversion.joint_count(),
            diagnostics: conversion.diagnostics.clone(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Wrote conversion report");
        Ok(())
    }
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
