//! `error`
//!
//! Errors raised while supervising plot jobs and while rotating designs.

use std::{io, path::PathBuf};

/// Errors that can occur when starting, running or talking to the drawing tool.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A job is already running; new jobs are rejected rather than queued.
    #[error("a job is already running")]
    Conflict,
    /// The design to plot does not exist.
    #[error("SVG not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The drawing tool binary could not be launched.
    #[error("{program} binary not found; {hint}")]
    ToolNotFound {
        /// The program that could not be found.
        program: String,
        /// How to point the server at the binary.
        hint: &'static str,
    },
    /// The drawing tool failed, either with a non-zero exit code or by reporting an error.
    /// Carries the captured tool output.
    #[error("{output}")]
    ToolExecution {
        /// The captured output of the tool, or a generic message if there was none.
        output: String,
    },
    /// The file name could not be turned into a safe SVG file name.
    #[error("{0}")]
    InvalidFileName(String),
    /// Failed to stage the working copy or to talk to the child process.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors that can occur when rotating a design.
///
/// All of these are raised before the document is written, a failed rotation never leaves
/// a partially rewritten file behind.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// The document is not well-formed SVG.
    #[error("invalid SVG content: {0}")]
    Malformed(String),
    /// The document has neither a usable `viewBox` nor a usable width and height.
    #[error("unable to determine SVG dimensions for rotation")]
    UnknownDimensions,
    /// The requested angle is not a multiple of 90 degrees.
    #[error("rotation angle must be a multiple of 90 degrees, got {0}")]
    InvalidAngle(i64),
    /// Rotation metadata stored in the document could not be read.
    #[error("invalid rotation metadata: {0}")]
    InvalidMetadata(String),
    /// Failed to read or write the design.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<quick_xml::Error> for GeometryError {
    fn from(err: quick_xml::Error) -> Self {
        GeometryError::Malformed(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for GeometryError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        GeometryError::Malformed(err.to_string())
    }
}
