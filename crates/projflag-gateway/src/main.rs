//! projflag Gateway: storage endpoints for the project active-flag map plus the operator
//! session API (reconcile, set, flip).

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use projflag_core::{
    open_store, DirectoryLookup, FlagError, FlagStore, GatewayConfig, HttpDirectory, PersistOutcome,
    ProjectRow, PropertyResponse, Reconciler, Session, SetPropertyRequest, SetPropertyResponse,
    StaticDirectory, EMPTY_MAP_JSON,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn FlagStore>,
    directory: Arc<dyn DirectoryLookup>,
}

impl AppState {
    fn reconciler(&self) -> Reconciler {
        Reconciler::new(Arc::clone(&self.directory), Arc::clone(&self.store))
    }
}

type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Serialize)]
struct ProjectsResponse {
    projects: Vec<ProjectRow>,
    persist: PersistOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    malformed: Option<String>,
}

#[derive(Deserialize)]
struct SetActiveRequest {
    active: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToggleResponse {
    success: bool,
    project_id: String,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    project_active_object: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[projflag-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::load()?;
    let store = open_store(&config)?;
    let directory: Arc<dyn DirectoryLookup> = match HttpDirectory::from_settings(&config.directory)
    {
        Some(dir) => Arc::new(dir),
        None => {
            tracing::info!(
                count = config.directory.static_projects.len(),
                "no directory URL configured; serving static project list"
            );
            Arc::new(StaticDirectory::new(config.directory.static_projects.clone()))
        }
    };

    let app = router(AppState { store, directory });

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        backend = ?config.store_backend,
        version = projflag_core::version(),
        "projflag gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/getProjectProperty", get(get_project_property))
        .route("/setProjectProperty", post(set_project_property))
        .route("/projects", get(list_projects))
        .route("/projects/:id/active", post(set_project_active))
        .route("/projects/:id/toggle", post(flip_project))
        .with_state(Arc::new(state))
        .layer(axum::middleware::from_fn(log_request))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("CTRL-C received; shutting down gateway");
    }
}

async fn log_request(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, %path, status = response.status().as_u16(), "request");
    response
}

async fn health() -> &'static str {
    "OK"
}

/// GET /getProjectProperty: the raw stored map, or `"{}"` when nothing is stored.
async fn get_project_property(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PropertyResponse>, ApiError> {
    let stored = state.store.get().await.map_err(api_error)?;
    let project_active_object = stored
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| EMPTY_MAP_JSON.to_string());
    Ok(Json(PropertyResponse {
        project_active_object,
    }))
}

/// POST /setProjectProperty: overwrite the stored value and echo it back. Content is stored
/// as given; a malformed map is repaired by the next reconciliation.
async fn set_project_property(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SetPropertyRequest>, JsonRejection>,
) -> Json<SetPropertyResponse> {
    let value = match body {
        Ok(Json(req)) => req.project_active_object,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "setProjectProperty rejected body");
            return Json(SetPropertyResponse::failed(rejection.body_text()));
        }
    };

    match state.store.set(&value).await {
        Ok(()) => Json(SetPropertyResponse::stored(value)),
        Err(e) => {
            tracing::warn!(error = %e, "setProjectProperty write failed");
            Json(SetPropertyResponse::failed(e.to_string()))
        }
    }
}

/// GET /projects: reconcile and return one row per directory project.
async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProjectsResponse>, ApiError> {
    let rec = state.reconciler().reconcile().await.map_err(api_error)?;
    Ok(Json(ProjectsResponse {
        projects: rec.rows(),
        persist: rec.persist,
        malformed: rec.malformed.map(|e| e.to_string()),
    }))
}

/// POST /projects/:id/active with `{ "active": bool }`.
async fn set_project_active(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    body: Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ToggleResponse>), ApiError> {
    let Json(body) = body.map_err(|rejection| {
        tracing::warn!(error = %rejection.body_text(), "set active rejected body");
        (rejection.status(), Json(json!({ "error": rejection.body_text() })))
    })?;
    let mut session = Session::start(state.reconciler()).await.map_err(api_error)?;
    let result = session.set_active(&project_id, body.active).await;
    Ok(toggle_response(&session, project_id, result))
}

/// POST /projects/:id/toggle: flip the current value (unknown ids become active).
async fn flip_project(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> Result<(StatusCode, Json<ToggleResponse>), ApiError> {
    let mut session = Session::start(state.reconciler()).await.map_err(api_error)?;
    let result = session.flip(&project_id).await;
    Ok(toggle_response(&session, project_id, result))
}

fn toggle_response(
    session: &Session,
    project_id: String,
    result: Result<bool, FlagError>,
) -> (StatusCode, Json<ToggleResponse>) {
    match result {
        Ok(active) => (
            StatusCode::OK,
            Json(ToggleResponse {
                success: true,
                project_id,
                active,
                project_active_object: Some(projflag_core::encode(session.active_map())),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(project_id = %project_id, error = %e, "toggle not stored");
            // The reported flag is the one still in effect; an id with no entry is inactive.
            let active = session.active_map().get(&project_id).unwrap_or(false);
            (
                status_for(&e),
                Json(ToggleResponse {
                    success: false,
                    project_id,
                    active,
                    project_active_object: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

fn status_for(e: &FlagError) -> StatusCode {
    match e {
        FlagError::DirectoryUnavailable(_) => StatusCode::BAD_GATEWAY,
        FlagError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        FlagError::MalformedStoredMap(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FlagError::PersistFailed(_) | FlagError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: FlagError) -> ApiError {
    tracing::warn!(error = %e, "request failed");
    (status_for(&e), Json(json!({ "error": e.to_string() })))
}
