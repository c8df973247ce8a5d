//! Depot API Module
//! REST endpoints for update checks, release metadata and artifact downloads

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use utoipa::{OpenApi, ToSchema};

use crate::engine::config::Config;
use crate::engine::error::DepotError;
use crate::engine::manifest::ReleaseManifest;
use crate::engine::resolver::{UpdateDecision, UpdateResolver, FRESH_INSTALL};
use crate::engine::store::{ChangelogView, IndexOptions, ReleaseIndex, ReleaseStore, ScanIssue};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<ReleaseStore>,
    pub resolver: Arc<UpdateResolver>,
}

impl ApiState {
    pub fn new(store: Arc<ReleaseStore>) -> Self {
        let resolver = Arc::new(UpdateResolver::new(Arc::clone(&store)));
        Self { store, resolver }
    }
}

/// Success envelope expected by the desktop client
#[derive(Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { success: true, data })
}

/// Maps core errors to HTTP statuses; the core itself knows nothing about HTTP
pub struct ApiError(DepotError);

impl From<DepotError> for ApiError {
    fn from(err: DepotError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DepotError::NotFound(_) | DepotError::NoReleasesAvailable => StatusCode::NOT_FOUND,
            DepotError::InvalidVersion(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(OpenApi)]
#[openapi(
    paths(
        get_latest,
        check_updates,
        get_release,
        get_changelog,
        list_versions,
        download_update,
        get_latest_setup,
        download_latest_setup,
        download_setup,
        reload,
    ),
    components(schemas(ReleaseManifest, ChangelogView, InstallerInfo)),
    tags(
        (name = "updates", description = "Application release queries and downloads"),
        (name = "setup", description = "Installer downloads"),
        (name = "admin", description = "Index maintenance"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/updates/latest", get(get_latest))
        .route("/api/updates/check", get(check_updates))
        .route("/api/updates/release/{version}", get(get_release))
        .route("/api/updates/changelog/{version}", get(get_changelog))
        .route("/api/updates/versions", get(list_versions))
        .route("/api/updates/download/{version}", get(download_update))
        .route("/api/setup/latest", get(get_latest_setup))
        .route("/api/setup/download/latest", get(download_latest_setup))
        .route("/api/setup/download/{version}", get(download_setup))
        .route("/api/status", get(status))
        .route("/api/admin/reload", post(reload))
        .route("/api/openapi.json", get(openapi))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub releases: usize,
    pub latest: Option<String>,
}

async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let index = state.store.snapshot();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: format!("{} Update Server", state.store.layout().product_name),
        version: env!("CARGO_PKG_VERSION").to_string(),
        releases: index.len(),
        latest: index.latest().map(|e| e.manifest.version.to_string()),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub releases: usize,
    pub installers: usize,
    pub latest: Option<String>,
    pub built_at: DateTime<Utc>,
    pub issues: Vec<ScanIssue>,
}

impl From<&ReleaseIndex> for StatusResponse {
    fn from(index: &ReleaseIndex) -> Self {
        Self {
            releases: index.len(),
            installers: index.installers().len(),
            latest: index.latest().map(|e| e.manifest.version.to_string()),
            built_at: index.built_at(),
            issues: index.issues().to_vec(),
        }
    }
}

async fn status(State(state): State<ApiState>) -> Json<Envelope<StatusResponse>> {
    ok(StatusResponse::from(state.store.snapshot().as_ref()))
}

#[utoipa::path(
    get,
    path = "/api/updates/latest",
    responses(
        (status = 200, description = "Latest release manifest", body = ReleaseManifest),
        (status = 404, description = "No releases available")
    ),
    tag = "updates"
)]
async fn get_latest(State(state): State<ApiState>) -> ApiResult<Json<Envelope<ReleaseManifest>>> {
    Ok(ok(state.store.get_latest()?))
}

#[derive(Deserialize)]
pub struct CheckParams {
    current: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/updates/check",
    params(
        ("current" = Option<String>, Query,
            description = "Installed version, 0.0.0 for a fresh install"),
    ),
    responses(
        (status = 200,
            description = "Update decision; download metadata only when an update applies"),
        (status = 400, description = "Malformed version"),
        (status = 404, description = "No releases available")
    ),
    tag = "updates"
)]
async fn check_updates(
    State(state): State<ApiState>,
    Query(params): Query<CheckParams>,
) -> ApiResult<Json<Envelope<UpdateDecision>>> {
    let current = params.current.as_deref().unwrap_or(FRESH_INSTALL);
    Ok(ok(state.resolver.check(current)?))
}

#[utoipa::path(
    get,
    path = "/api/updates/release/{version}",
    params(
        ("version" = String, Path, description = "Release version"),
    ),
    responses(
        (status = 200, description = "Release manifest", body = ReleaseManifest),
        (status = 404, description = "Release not found")
    ),
    tag = "updates"
)]
async fn get_release(
    State(state): State<ApiState>,
    Path(version): Path<String>,
) -> ApiResult<Json<Envelope<ReleaseManifest>>> {
    Ok(ok(state.store.get_release(&version)?))
}

#[utoipa::path(
    get,
    path = "/api/updates/changelog/{version}",
    params(
        ("version" = String, Path, description = "Release version"),
    ),
    responses(
        (status = 200, description = "Release changelog", body = ChangelogView),
        (status = 404, description = "Release not found")
    ),
    tag = "updates"
)]
async fn get_changelog(
    State(state): State<ApiState>,
    Path(version): Path<String>,
) -> ApiResult<Json<Envelope<ChangelogView>>> {
    Ok(ok(state.store.get_changelog(&version)?))
}

#[derive(Serialize)]
pub struct VersionList {
    pub versions: Vec<ReleaseManifest>,
    pub count: usize,
}

#[utoipa::path(
    get,
    path = "/api/updates/versions",
    responses(
        (status = 200, description = "All releases, newest first")
    ),
    tag = "updates"
)]
async fn list_versions(State(state): State<ApiState>) -> Json<Envelope<VersionList>> {
    let versions = state.store.list_versions();
    let count = versions.len();
    ok(VersionList { versions, count })
}

#[utoipa::path(
    get,
    path = "/api/updates/download/{version}",
    params(
        ("version" = String, Path, description = "Release version"),
    ),
    responses(
        (status = 200, description = "Artifact bytes"),
        (status = 404, description = "Release not found")
    ),
    tag = "updates"
)]
async fn download_update(
    State(state): State<ApiState>,
    Path(version): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.store.get_artifact_path(&version)?;
    let file_name = state.store.layout().artifact_download_name(&version);
    serve_attachment(&path, &file_name, request).await
}

#[derive(Serialize, ToSchema)]
pub struct InstallerInfo {
    pub version: String,
    pub filename: String,
    pub size: u64,
    pub download_url: String,
}

#[utoipa::path(
    get,
    path = "/api/setup/latest",
    responses(
        (status = 200, description = "Newest installer", body = InstallerInfo),
        (status = 404, description = "No installers available")
    ),
    tag = "setup"
)]
async fn get_latest_setup(
    State(state): State<ApiState>,
) -> ApiResult<Json<Envelope<InstallerInfo>>> {
    let installer = state.store.latest_installer()?;
    Ok(ok(InstallerInfo {
        version: installer.version_label,
        filename: installer.file_name,
        size: installer.size,
        download_url: "/api/setup/download/latest".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/setup/download/latest",
    responses(
        (status = 200, description = "Installer bytes"),
        (status = 404, description = "No installers available")
    ),
    tag = "setup"
)]
async fn download_latest_setup(
    State(state): State<ApiState>,
    request: Request,
) -> ApiResult<Response> {
    let installer = state.store.latest_installer()?;
    serve_attachment(&installer.path, &installer.file_name, request).await
}

#[utoipa::path(
    get,
    path = "/api/setup/download/{version}",
    params(
        ("version" = String, Path, description = "Installer version"),
    ),
    responses(
        (status = 200, description = "Installer bytes"),
        (status = 404, description = "Installer not found")
    ),
    tag = "setup"
)]
async fn download_setup(
    State(state): State<ApiState>,
    Path(version): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.store.get_installer_path(&version)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| state.store.layout().installer_file_name(&version));
    serve_attachment(&path, &file_name, request).await
}

#[utoipa::path(
    post,
    path = "/api/admin/reload",
    responses(
        (status = 200, description = "Index rebuilt"),
        (status = 500, description = "Rebuild failed; previous index still served")
    ),
    tag = "admin"
)]
async fn reload(State(state): State<ApiState>) -> ApiResult<Json<Envelope<StatusResponse>>> {
    let index = refresh_in_background(Arc::clone(&state.store)).await?;
    Ok(ok(StatusResponse::from(index.as_ref())))
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Stream a file as an attachment. Range requests are handled by `ServeFile`.
async fn serve_attachment(
    path: &std::path::Path,
    file_name: &str,
    request: Request,
) -> ApiResult<Response> {
    let response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    if response.status() == StatusCode::NOT_FOUND {
        return Err(DepotError::NotFound(format!("{} is missing on disk", path.display())).into());
    }

    let mut response = response.map(Body::new);
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    debug!("Serving {} as {}", path.display(), file_name);
    Ok(response)
}

async fn refresh_in_background(store: Arc<ReleaseStore>) -> Result<Arc<ReleaseIndex>, DepotError> {
    tokio::task::spawn_blocking(move || store.refresh())
        .await
        .map_err(|e| DepotError::Io(std::io::Error::other(e.to_string())))?
}

/// Rebuild the index on a fixed interval
pub fn spawn_refresh(store: Arc<ReleaseStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Ok(index) = refresh_in_background(Arc::clone(&store)).await {
                debug!(releases = index.len(), "Periodic index refresh complete");
            }
        }
    })
}

/// Open the store described by `config` and serve it until Ctrl+C
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let layout = config.releases.clone();
    std::fs::create_dir_all(&layout.root)?;

    let options = IndexOptions {
        verify_on_load: config.verify_on_load,
    };
    let store = tokio::task::spawn_blocking(move || ReleaseStore::open(layout, options)).await??;
    let store = Arc::new(store);

    if let Some(secs) = config.refresh_interval_secs.filter(|s| *s > 0) {
        spawn_refresh(Arc::clone(&store), Duration::from_secs(secs));
    }

    let index = store.snapshot();
    info!(
        root = %config.releases.root.display(),
        releases = index.len(),
        latest = ?index.latest().map(|e| e.manifest.version.to_string()),
        installer = ?index.latest_installer().map(|i| i.file_name.clone()),
        "Release index ready"
    );

    let app = create_router(ApiState::new(store));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("{} Update Server listening on http://{}", config.releases.product_name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
