//! `plotterstudio`
//!
//! Drives a pen-plotter through the `nextdraw` command line tool.
//!
//! The [`Supervisor`] runs one plot at a time and keeps a [`JobState`] up to date from the
//! tool's output, [`rotate_svg_file`] turns stored designs by quarter turns without losing their
//! original frame, and [`estimate_distance_mm`] measures how far the pen will travel.

mod command;
mod config;
mod distance;
mod error;
mod files;
mod job;
pub mod output;
mod paths;
pub mod rotation;
mod supervisor;
pub mod svg;

pub use command::{
    infer_pen_state, model_code, plot_command, preview_command, Handling, ManualCommand,
    PageSize, PlotSettings, ToolCommand, UtilityCommand, DEFAULT_MODEL_CODE,
};
pub use config::{Config, DEFAULT_LISTEN_ADDRESS};
pub use distance::{estimate_distance_mm, estimate_seconds, estimate_svg_distance_mm};
pub use error::{GeometryError, JobError};
pub use files::{sanitize_filename, FileLocks};
pub use job::{Job, JobState, StatusSnapshot};
pub use output::{classify_exit, ExitOutcome, OutputLog, ProgressSample};
pub use rotation::{rotate_svg, rotate_svg_file, QuarterTurn, RotationOutcome, ViewBox};
pub use supervisor::{
    Cancelled, CommandOutput, EstimateSource, JobStarted, PreviewEstimate, Supervisor,
    CANCEL_TIMEOUT, PREVIEW_TIMEOUT, START_GRACE_PERIOD,
};

/// Name of the drawing tool, as used in messages.
pub const TOOL_NAME: &str = "nextdraw";
