//! # easel
//!
//! HTTP front end for the plotter studio: request and response bodies, and how library errors
//! become HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
pub use plotterstudio;
use plotterstudio::{CommandOutput, GeometryError, JobError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Body of a rotation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RotateRequest {
    /// Degrees to rotate by, any multiple of 90.
    pub angle: i64,
}

impl Default for RotateRequest {
    fn default() -> Self {
        RotateRequest { angle: 90 }
    }
}

/// Form fields of a request to move the pen to an absolute position.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct MoveRequest {
    /// Horizontal position in mm.
    pub x_mm: f64,
    /// Vertical position in mm.
    pub y_mm: f64,
}

/// Form fields of a request to jog the pen. Axes left out do not move.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct WalkRequest {
    /// Distance along X in mm.
    pub x_mm: f64,
    /// Distance along Y in mm.
    pub y_mm: f64,
}

/// The result of a one-shot plotter command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// What was done, for display.
    pub action: String,
    /// Exit code of the tool.
    pub returncode: i32,
    /// The command line that was run.
    pub command: String,
    /// Standard output, if any.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    /// Standard error, if any.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Pen state after a toggle, when it could be worked out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    /// Jog distance in mm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_mm: Option<f64>,
    /// Target X position in mm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// Target Y position in mm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl CommandResponse {
    /// Describes the output of a command.
    pub fn new(action: &str, output: CommandOutput) -> Self {
        CommandResponse {
            ok: output.success(),
            action: action.to_string(),
            returncode: output.code,
            command: output.command,
            stdout: output.stdout,
            stderr: output.stderr,
            state: None,
            distance_mm: None,
            x: None,
            y: None,
        }
    }

    /// Turns a failed command into an error response.
    ///
    /// # Errors
    /// [`ApiError::CommandFailed`] if the command did not succeed.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ApiError::CommandFailed(Box::new(self)))
        }
    }
}

/// The result of a jog: the move itself when only one axis moved, else both moves together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WalkReply {
    /// Only one axis moved.
    Single(CommandResponse),
    /// Both axes moved.
    Combined(WalkResponse),
}

impl WalkReply {
    /// Puts together the reply for the moves made for `request`.
    pub fn new(request: WalkRequest, mut segments: Vec<CommandResponse>) -> Self {
        if segments.len() == 1 {
            if let Some(segment) = segments.pop() {
                return WalkReply::Single(segment);
            }
        }
        WalkReply::Combined(WalkResponse {
            ok: segments.iter().all(|segment| segment.ok),
            action: "walk",
            distance_mm: Offset::from(request),
            segments,
        })
    }
}

/// The result of jogging along both axes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkResponse {
    /// Whether both moves succeeded.
    pub ok: bool,
    /// Always `walk`.
    pub action: &'static str,
    /// Requested distances.
    pub distance_mm: Offset,
    /// The individual moves.
    pub segments: Vec<CommandResponse>,
}

/// A jog distance along each axis, in mm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Offset {
    /// Along X.
    pub x: f64,
    /// Along Y.
    pub y: f64,
}

impl From<WalkRequest> for Offset {
    fn from(request: WalkRequest) -> Self {
        Offset {
            x: request.x_mm,
            y: request.y_mm,
        }
    }
}

/// The result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelResponse {
    /// Always `true`.
    pub ok: bool,
    /// For display.
    pub message: &'static str,
    /// Whether a plot was actually running.
    pub was_running: bool,
}

/// Errors returned by the server, sent as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    /// Failure starting or talking to the drawing tool.
    Job(JobError),
    /// Failure rotating a design.
    Geometry(GeometryError),
    /// The named design does not exist.
    NotFound(String),
    /// The request itself makes no sense.
    BadRequest(String),
    /// A plotter command ran and failed.
    CommandFailed(Box<CommandResponse>),
    /// Anything else.
    Internal(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        ApiError::Job(err)
    }
}

impl From<GeometryError> for ApiError {
    fn from(err: GeometryError) -> Self {
        ApiError::Geometry(err)
    }
}

impl ApiError {
    /// The HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Job(JobError::Conflict) => StatusCode::CONFLICT,
            ApiError::Job(JobError::NotFound(_)) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Job(JobError::InvalidFileName(_))
            | ApiError::Geometry(
                GeometryError::Malformed(_)
                | GeometryError::UnknownDimensions
                | GeometryError::InvalidAngle(_)
                | GeometryError::InvalidMetadata(_),
            )
            | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Job(
                JobError::ToolNotFound { .. } | JobError::ToolExecution { .. } | JobError::Io(_),
            )
            | ApiError::Geometry(GeometryError::Io(_))
            | ApiError::CommandFailed(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `detail` of the error body.
    pub fn detail(&self) -> Value {
        match self {
            ApiError::Job(err) => Value::String(err.to_string()),
            ApiError::Geometry(err) => Value::String(err.to_string()),
            ApiError::NotFound(message)
            | ApiError::BadRequest(message)
            | ApiError::Internal(message) => Value::String(message.clone()),
            ApiError::CommandFailed(response) => {
                serde_json::to_value(response).unwrap_or(Value::Null)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.detail());
        }
        (status, Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32) -> CommandOutput {
        CommandOutput {
            command: "nextdraw -m utility -M toggle".to_string(),
            code,
            stdout: "Pen is up".to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from(JobError::Conflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(JobError::NotFound("a.svg".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(JobError::InvalidFileName("bad".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(GeometryError::InvalidAngle(45)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(JobError::ToolExecution {
                output: "No NextDraw found".to_string()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tool_output_is_the_detail() {
        let err = ApiError::from(JobError::ToolExecution {
            output: "No NextDraw found".to_string(),
        });
        assert_eq!(err.detail(), json!("No NextDraw found"));
    }

    #[test]
    fn test_failed_command_detail() {
        let result = CommandResponse::new("pen toggled", output(1)).into_result();
        let Err(err) = result else {
            panic!("a failed command should be an error");
        };
        insta::assert_snapshot!(
            err.detail().to_string(),
            @r#"{"action":"pen toggled","command":"nextdraw -m utility -M toggle","ok":false,"returncode":1,"stdout":"Pen is up"}"#
        );
    }

    #[test]
    fn test_request_defaults() {
        let rotate: RotateRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(rotate.angle, 90);
        let walk: WalkRequest = serde_json::from_str(r#"{"x_mm": 2.5}"#).unwrap();
        assert_eq!(walk, WalkRequest { x_mm: 2.5, y_mm: 0.0 });
    }

    fn walked(action: &str, distance: f64) -> CommandResponse {
        let mut segment = CommandResponse::new(action, output(0));
        segment.stdout.clear();
        segment.distance_mm = Some(distance);
        segment
    }

    #[test]
    fn test_single_axis_walk_is_the_bare_move() {
        let request = WalkRequest { x_mm: 5.0, y_mm: 0.0 };
        let reply = WalkReply::new(request, vec![walked("walk x", 5.0)]);
        insta::assert_snapshot!(
            serde_json::to_string(&reply).unwrap(),
            @r#"{"ok":true,"action":"walk x","returncode":0,"command":"nextdraw -m utility -M toggle","distance_mm":5.0}"#
        );
    }

    #[test]
    fn test_two_axis_walk_is_combined() {
        let request = WalkRequest { x_mm: 5.0, y_mm: -2.0 };
        let reply = WalkReply::new(request, vec![walked("walk x", 5.0), walked("walk y", -2.0)]);
        let WalkReply::Combined(combined) = reply else {
            panic!("two moves should be combined");
        };
        assert!(combined.ok);
        assert_eq!(combined.distance_mm, Offset { x: 5.0, y: -2.0 });
        assert_eq!(combined.segments.len(), 2);
    }
}
