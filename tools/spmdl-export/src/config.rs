//! Export configuration
//!
//! Settings come from an optional TOML file and are then overridden by CLI
//! flags. The resulting [`ExportConfig`] is passed explicitly to every stage.
//!
//! ```toml
//! vertex_format = "pos_rgb32f,nrm_rgba8sn,uv_rg16f;bonei_rgba8u,bonew_rgba8un"
//! combine = "materials"
//! transform_to_root = true
//! threads = 4
//! overdraw_threshold = 1.05
//!
//! [limits]
//! max_vertices = 65535
//! max_bones = 64
//!
//! [compression]
//! level = 10
//! uncompressed_threshold = 0.95
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spmdl_format::{CompressOptions, Semantic, VertexFormat};

use crate::error::{ExportError, Result};
use crate::mesh::MeshLimits;

/// Default vertex layout when none is configured
pub const DEFAULT_VERTEX_FORMAT: &str = "pos_rgb32f,nrm_rgba8sn,uv_rg16f";

/// Default overdraw pass threshold
pub const DEFAULT_OVERDRAW_THRESHOLD: f32 = 1.05;

/// Maximum worker thread count
pub const MAX_THREADS: usize = 10_000;

/// How mesh parts are coalesced before splitting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    /// Keep one part per (mesh, material)
    #[default]
    None,
    /// Merge parts that share a material and vertex format
    Materials,
    /// Merge every part that shares a vertex format
    Everything,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Compression level, 1 (fastest) to 20 (smallest)
    pub level: i32,
    /// Sections that do not compress below this ratio are stored raw
    pub uncompressed_threshold: f64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        let options = CompressOptions::default();
        Self {
            level: options.level,
            uncompressed_threshold: options.threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub vertex_format: String,
    pub combine: CombineMode,
    /// Bake node transforms into vertex positions and normals
    pub transform_to_root: bool,
    pub limits: MeshLimits,
    pub compression: CompressionConfig,
    /// Threads used for stream encoding and section compression (including the caller)
    pub threads: usize,
    /// Destination bone count above which merging stops deduplicating bones
    pub bone_merge_scan_limit: usize,
    /// Reorder indices and vertices for cache and fetch locality after splitting
    pub optimize: bool,
    /// Cache-miss ratio growth a triangle cluster may take to reduce overdraw
    pub overdraw_threshold: f32,
    pub verbose: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            vertex_format: DEFAULT_VERTEX_FORMAT.to_string(),
            combine: CombineMode::None,
            transform_to_root: false,
            limits: MeshLimits::default(),
            compression: CompressionConfig::default(),
            threads: 1,
            bone_merge_scan_limit: 512,
            optimize: true,
            overdraw_threshold: DEFAULT_OVERDRAW_THRESHOLD,
            verbose: false,
        }
    }
}

impl ExportConfig {
    /// Load a configuration file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ExportError::Config(e.to_string()))
    }

    /// Reject settings no stage can honor
    pub fn validate(&self) -> Result<()> {
        if !(1..=20).contains(&self.compression.level) {
            return Err(ExportError::Config(format!(
                "compression level {} out of range [1, 20]",
                self.compression.level
            )));
        }
        let threshold = self.compression.uncompressed_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ExportError::Config(format!(
                "uncompressed_threshold {} out of range (0, 1]",
                threshold
            )));
        }
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(ExportError::Config(format!(
                "thread count {} out of range [1, {}]",
                self.threads, MAX_THREADS
            )));
        }
        if self.limits.max_vertices == 0 || self.limits.max_bones == 0 {
            return Err(ExportError::Config(
                "mesh limits must be greater than zero".to_string(),
            ));
        }
        if !(self.overdraw_threshold >= 1.0) {
            return Err(ExportError::Config(format!(
                "overdraw_threshold {} must be at least 1.0",
                self.overdraw_threshold
            )));
        }

        // Local bone ids run from 0 to max_bones - 1
        let format = self.parse_vertex_format()?;
        if let Some(slot) = format.find(Semantic::BoneIndex) {
            if let Some(max) = slot.format.max_integer() {
                if self.limits.max_bones as u64 > max + 1 {
                    return Err(ExportError::Config(format!(
                        "max_bones {} does not fit bone index format {} (at most {})",
                        self.limits.max_bones,
                        slot.format,
                        max + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Parse the configured vertex format
    pub fn parse_vertex_format(&self) -> Result<Arc<VertexFormat>> {
        Ok(Arc::new(VertexFormat::parse(&self.vertex_format)?))
    }

    pub fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            level: self.compression.level,
            threshold: self.compression.uncompressed_threshold,
        }
    }
}
