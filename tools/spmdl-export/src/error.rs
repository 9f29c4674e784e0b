//! Export error taxonomy
//!
//! Every error is fatal for the run; there is no partial output.

use std::path::PathBuf;

use spmdl_format::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Bad vertex format string, or a container that failed to encode/decode
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("vertex format keeps {format} bone weights per vertex, but {requested} were requested")]
    SchemaMismatch { format: usize, requested: usize },

    #[error(
        "Failed to split {part}, limits too tight for a single triangle \
         (max_vertices={max_vertices}, max_bones={max_bones})"
    )]
    InfeasibleBudget {
        part: String,
        max_vertices: usize,
        max_bones: usize,
    },

    #[error("Failed to import {path:?}: {message}")]
    Import { path: PathBuf, message: String },

    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("worker failed on job {index}")]
    Worker {
        index: usize,
        #[source]
        source: Box<ExportError>,
    },
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
