//! # easel
//!
//! Serves the plotter studio over HTTP: plots stored designs, reports on the running job,
//! rotates designs and drives the pen directly.

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{Form, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use easel::{
    ApiError, CancelResponse, CommandResponse, MoveRequest, RotateRequest, WalkReply,
    WalkRequest,
};
use plotterstudio::{
    infer_pen_state, rotate_svg_file, sanitize_filename, Config, FileLocks, JobStarted,
    ManualCommand, PlotSettings, PreviewEstimate, RotationOutcome, StatusSnapshot, Supervisor,
    UtilityCommand,
};
use serde_json::{json, Value};

/// Shared state of the server.
#[derive(Clone)]
struct AppState {
    supervisor: Supervisor,
    file_locks: Arc<FileLocks>,
}

impl AppState {
    /// Where the stored design called `filename` lives.
    fn design_path(&self, filename: &str) -> Result<PathBuf, ApiError> {
        let name = sanitize_filename(filename)?;
        let path = self.supervisor.config().data_dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ApiError::NotFound("File not found".to_string()))
        }
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;
    let address = config.socket_address();
    if config.offline {
        log::warn!("Offline mode: plotter commands will be logged but not executed");
    }
    log::info!(
        "Serving designs from {} using {}",
        config.data_dir.display(),
        config.tool_command.join(" ")
    );

    let state = AppState {
        supervisor: Supervisor::new(config),
        file_locks: Arc::new(FileLocks::new()),
    };

    let app = Router::new()
        .route("/status", get(status))
        .route("/version", get(version))
        .route("/cancel", post(cancel))
        .route("/files/{filename}/plot", post(plot_file))
        .route("/files/{filename}/rotate", post(rotate_file))
        .route("/files/{filename}/preview", get(preview_file))
        .route("/pen/up", post(pen_up))
        .route("/pen/down", post(pen_down))
        .route("/pen/toggle", post(pen_toggle))
        .route("/enable_motors", post(enable_motors))
        .route("/disable_motors", post(disable_motors))
        .route("/walk_home", post(walk_home))
        .route("/walk", post(walk))
        .route("/move", post(move_to))
        .route("/home", post(home))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    log::info!("Listening on {address}");
    axum::serve(listener, app).await
}

/// Runs blocking work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::Internal(format!("Request handler failed: {err}")))?
}

/// Reports on the current or last job.
async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.supervisor.job().snapshot())
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Stops the running plot.
async fn cancel(State(state): State<AppState>) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = blocking(move || Ok(state.supervisor.cancel())).await?;
    Ok(Json(CancelResponse {
        ok: true,
        message: "Canceled",
        was_running: cancelled.was_running,
    }))
}

/// Starts plotting a stored design.
async fn plot_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(settings): Json<PlotSettings>,
) -> Result<Json<JobStarted>, ApiError> {
    let path = state.design_path(&filename)?;
    let started =
        blocking(move || Ok(state.supervisor.start_job(&path, &settings, None)?)).await?;
    Ok(Json(started))
}

/// Rotates a stored design in place.
async fn rotate_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(request): Json<RotateRequest>,
) -> Result<Json<RotationOutcome>, ApiError> {
    let path = state.design_path(&filename)?;
    let outcome = blocking(move || {
        Ok(state
            .file_locks
            .with_lock(&path, || rotate_svg_file(&path, request.angle))?)
    })
    .await?;
    Ok(Json(outcome))
}

/// Estimates how long a stored design would take to plot.
async fn preview_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(settings): Query<PlotSettings>,
) -> Result<Json<PreviewEstimate>, ApiError> {
    let path = state.design_path(&filename)?;
    let estimate = blocking(move || Ok(state.supervisor.preview(&path, &settings)?)).await?;
    Ok(Json(estimate))
}

/// Runs a utility command and describes the result, failing if the command failed.
async fn utility(
    state: AppState,
    command: UtilityCommand,
    action: &'static str,
) -> Result<CommandResponse, ApiError> {
    let output = blocking(move || Ok(state.supervisor.run_utility(command, None)?)).await?;
    CommandResponse::new(action, output).into_result()
}

async fn pen_up(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(utility(state, UtilityCommand::RaisePen, "pen raised").await?))
}

async fn pen_down(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        utility(state, UtilityCommand::LowerPen, "pen lowered").await?,
    ))
}

/// Toggles the pen, reporting where it ended up when the tool says so.
async fn pen_toggle(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    let mut response = utility(state, UtilityCommand::TogglePen, "pen toggled").await?;
    response.state =
        infer_pen_state(&response.stdout).or_else(|| infer_pen_state(&response.stderr));
    Ok(Json(response))
}

async fn enable_motors(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        utility(state, UtilityCommand::EnableMotors, "motors enabled").await?,
    ))
}

async fn disable_motors(
    State(state): State<AppState>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        utility(state, UtilityCommand::DisableMotors, "motors disabled").await?,
    ))
}

async fn walk_home(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        utility(state, UtilityCommand::WalkHome, "returned home").await?,
    ))
}

/// Jogs the pen along one or both axes.
async fn walk(
    State(state): State<AppState>,
    Form(request): Form<WalkRequest>,
) -> Result<Json<WalkReply>, ApiError> {
    if request.x_mm == 0.0 && request.y_mm == 0.0 {
        return Err(ApiError::BadRequest(
            "Specify a non-zero distance for X and/or Y".to_string(),
        ));
    }

    let mut segments = Vec::new();
    for (distance, command, action) in [
        (request.x_mm, UtilityCommand::WalkX(request.x_mm), "walk x"),
        (request.y_mm, UtilityCommand::WalkY(request.y_mm), "walk y"),
    ] {
        if distance == 0.0 {
            continue;
        }
        let mut segment = utility(state.clone(), command, action).await?;
        segment.distance_mm = Some(distance);
        segments.push(segment);
    }

    Ok(Json(WalkReply::new(request, segments)))
}

/// Moves the pen to an absolute position.
async fn move_to(
    State(state): State<AppState>,
    Form(request): Form<MoveRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(
        manual_move(state, request.x_mm, request.y_mm, "move").await?,
    ))
}

/// Moves the pen to the origin.
async fn home(State(state): State<AppState>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(manual_move(state, 0.0, 0.0, "home").await?))
}

/// Energises the motors and then moves to `(x, y)`, as the tool will not move released motors.
async fn manual_move(
    state: AppState,
    x: f64,
    y: f64,
    action: &'static str,
) -> Result<CommandResponse, ApiError> {
    utility(state.clone(), UtilityCommand::EnableMotors, "motors enabled").await?;
    let output = blocking(move || {
        Ok(state
            .supervisor
            .run_manual(ManualCommand::MoveTo { x, y }, None)?)
    })
    .await?;
    let mut response = CommandResponse::new(action, output).into_result()?;
    response.x = Some(x);
    response.y = Some(y);
    Ok(response)
}
