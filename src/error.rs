//! Error handling module for the Docker image squasher

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SquashError {
    /// Missing manifest, malformed metadata or unexpected record layout
    #[error("Format error: {0}")]
    Format(String),

    /// A layer's parent does not resolve within the archive
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Overlay error: whiteout '{whiteout}' in layer {layer} found without existing file '{target}'")]
    Overlay {
        layer: String,
        whiteout: String,
        target: String,
    },

    #[error("Merge conflict: field '{field}' has conflicting types between versions")]
    MergeConflict { field: String },

    #[error("Tag conflict: tag flag specified with multiple tags in repository '{repo}'")]
    TagConflict { repo: String },

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SquashError {
    /// Prefix the error message with the operation that produced it.
    ///
    /// Structured variants already name their layer, field or repository
    /// and are returned unchanged so callers can still match on them.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            SquashError::Format(msg) => SquashError::Format(format!("{}: {}", context, msg)),
            SquashError::Graph(msg) => SquashError::Graph(format!("{}: {}", context, msg)),
            SquashError::Config(msg) => SquashError::Config(format!("{}: {}", context, msg)),
            SquashError::Io(err) => {
                SquashError::Io(io::Error::new(err.kind(), format!("{}: {}", context, err)))
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, SquashError>;

/// Macro for standardizing error context
#[macro_export]
macro_rules! with_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| $crate::error::SquashError::from(e).with_context(&$context))
    };
}
