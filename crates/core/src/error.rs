//! Typed errors shared by the core and GPU crates.

use thiserror::Error;

/// Errors raised by text buffers, atlas geometry and GPU resource setup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TextBufferError {
    /// A flat index or (x, y) position fell outside the grid.
    #[error("cell position {position} is outside a {width}x{height} buffer")]
    Index {
        /// Human-readable rendering of the offending position.
        position: String,
        width: u32,
        height: u32,
    },

    /// Atlas or cell geometry that cannot be addressed, e.g. an atlas whose
    /// pixel size is not a whole number of cells.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A GPU texture, surface or buffer could not be allocated.
    #[error("resource error: {0}")]
    Resource(String),
}

impl TextBufferError {
    pub(crate) fn index(position: impl std::fmt::Display, width: u32, height: u32) -> Self {
        TextBufferError::Index {
            position: position.to_string(),
            width,
            height,
        }
    }
}

pub type Result<T> = std::result::Result<T, TextBufferError>;
