use crate::inbound::{ControllerHandle, SubmitError};
use crate::status::StatusSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mission_core::{CalibrationSample, OperatorCommand};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct MissionUpload {
    pub points: Vec<[f64; 3]>,
}

struct ApiError(SubmitError);

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!("rejecting request: {}", self.0);
        (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()).into_response()
    }
}

pub fn router(handle: ControllerHandle) -> Router {
    Router::new()
        .route("/comm/launch", post(launch))
        .route("/comm/test", post(start_test))
        .route("/comm/land", post(land))
        .route("/comm/abort", post(abort))
        .route("/comm/vicon", post(vicon))
        .route("/comm/waypoints", post(waypoints))
        .route("/status", get(status))
        .with_state(handle)
}

pub async fn serve(
    bind: SocketAddr,
    handle: ControllerHandle,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("operator api listening on {}", listener.local_addr()?);

    axum::serve(listener, router(handle))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("operator api stopped");
    Ok(())
}

fn command(handle: &ControllerHandle, command: OperatorCommand) -> Result<StatusCode, ApiError> {
    handle.command(command)?;
    Ok(StatusCode::OK)
}

async fn launch(State(handle): State<ControllerHandle>) -> Result<StatusCode, ApiError> {
    command(&handle, OperatorCommand::Launch)
}

async fn start_test(State(handle): State<ControllerHandle>) -> Result<StatusCode, ApiError> {
    command(&handle, OperatorCommand::Test)
}

async fn land(State(handle): State<ControllerHandle>) -> Result<StatusCode, ApiError> {
    command(&handle, OperatorCommand::Land)
}

async fn abort(State(handle): State<ControllerHandle>) -> Result<StatusCode, ApiError> {
    command(&handle, OperatorCommand::Abort)
}

async fn vicon(
    State(handle): State<ControllerHandle>,
    Json(sample): Json<CalibrationSample>,
) -> Result<StatusCode, ApiError> {
    handle.calibration(sample)?;
    Ok(StatusCode::OK)
}

async fn waypoints(
    State(handle): State<ControllerHandle>,
    Json(upload): Json<MissionUpload>,
) -> Result<StatusCode, ApiError> {
    handle.mission(upload.points)?;
    Ok(StatusCode::OK)
}

async fn status(State(handle): State<ControllerHandle>) -> Json<StatusSnapshot> {
    Json(handle.status())
}
