//! REST server for the activities and execute endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use super::{
    ActivitiesQuery, ActivitiesResponse, ClearResponse, ErrorBody, ExecuteQuery, ACTIVITIES_PATH,
    EXECUTE_PATH, HEALTH_PATH,
};
use crate::dispatch::{CommandDispatch, ExecuteReport, ExecuteRequest, LocalDispatcher};
use crate::error::{ErrorCode, ReconError, Result};
use crate::ledger::ActivityStatus;

/// Serves a [`LocalDispatcher`] and its ledger over HTTP
pub struct ApiServer {
    dispatcher: LocalDispatcher,
}

impl ApiServer {
    pub fn new(dispatcher: LocalDispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn router(self) -> Router {
        let state = Arc::new(ApiState {
            dispatcher: self.dispatcher,
        });

        Router::new()
            .route(HEALTH_PATH, get(health_check))
            .route(
                ACTIVITIES_PATH,
                get(get_activities)
                    .post(force_activities)
                    .delete(clear_activities),
            )
            .route(EXECUTE_PATH, post(execute))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr).await.map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_INVALID_VALUE,
                format!("Cannot bind API server to {}", addr),
            )
            .with_source(e)
        })
    }

    /// Serve on an already bound listener until the process exits
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Starting API server on {}", addr);
        }
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ReconError::other("API server stopped").with_source(e))
    }
}

struct ApiState {
    dispatcher: LocalDispatcher,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_status(err: &ReconError) -> StatusCode {
    match err {
        ReconError::Validation { .. } => StatusCode::BAD_REQUEST,
        ReconError::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: ReconError) -> ApiError {
    (
        error_status(&err),
        Json(ErrorBody {
            error: err.to_string(),
            code: err.code(),
        }),
    )
}

/// Ledger failures answer `Running`, never a false `Done`
fn activities_error(err: ReconError) -> (StatusCode, Json<ActivitiesResponse>) {
    warn!("Activities request failed: {}", err);
    (
        error_status(&err),
        Json(ActivitiesResponse::unavailable(err.to_string(), err.code())),
    )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_activities(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActivitiesQuery>,
) -> (StatusCode, Json<ActivitiesResponse>) {
    let ledger = state.dispatcher.ledger();
    match ledger.query_status(&query.workspace, &query.module).await {
        Ok(records) => (StatusCode::OK, Json(ActivitiesResponse::from_records(records))),
        Err(e) => activities_error(e.into()),
    }
}

async fn force_activities(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActivitiesQuery>,
) -> (StatusCode, Json<ActivitiesResponse>) {
    let ledger = state.dispatcher.ledger();
    let forced = match ledger.force_complete(&query.workspace, &query.module).await {
        Ok(forced) => forced,
        Err(e) => return activities_error(e.into()),
    };
    if forced > 0 {
        warn!(
            "Forced {} activities of {}/{} to Done",
            forced, query.workspace, query.module
        );
    }

    match ledger.query_status(&query.workspace, &query.module).await {
        Ok(records) => {
            let mut response = ActivitiesResponse::from_records(records);
            response.forced = Some(forced);
            (StatusCode::OK, Json(response))
        }
        Err(e) => activities_error(e.into()),
    }
}

async fn clear_activities(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ActivitiesQuery>,
) -> std::result::Result<Json<ClearResponse>, ApiError> {
    let cleared = state
        .dispatcher
        .ledger()
        .clear(&query.workspace, &query.module)
        .await
        .map_err(|e| api_error(e.into()))?;
    Ok(Json(ClearResponse { cleared }))
}

async fn execute(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ExecuteQuery>,
    Json(request): Json<ExecuteRequest>,
) -> std::result::Result<Json<ExecuteReport>, ApiError> {
    if request.cmd.trim().is_empty() {
        return Err(api_error(ReconError::validation_with_code(
            ErrorCode::VALIDATION_REQUIRED_FIELD,
            "Command is empty",
            Some("cmd".to_string()),
        )));
    }

    if query.wait {
        return state
            .dispatcher
            .execute(request)
            .await
            .map(Json)
            .map_err(api_error);
    }

    let receipt = state.dispatcher.submit(request).await.map_err(api_error)?;
    Ok(Json(ExecuteReport {
        status: (!receipt.duplicate).then_some(ActivityStatus::Running),
        id: receipt.id,
        duplicate: receipt.duplicate,
    }))
}
