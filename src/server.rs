use crate::config::AppConfig;
use crate::render::{RenderOptions, render_page, render_svg};
use crate::session::{ClickOutcome, FeatureSummary, MapSession, ViewSnapshot};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

const INTERACTIVE: RenderOptions = RenderOptions { interactive: true };

/// One session per server; requests are handled one at a time against it.
pub struct AppState {
    session: Mutex<MapSession>,
}

impl AppState {
    pub fn new(session: MapSession) -> Self {
        Self { session: Mutex::new(session) }
    }

    fn session(&self) -> MutexGuard<'_, MapSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize, Default)]
pub struct PointParams {
    x: Option<f64>,
    y: Option<f64>,
}

impl PointParams {
    fn point(&self) -> Option<(f64, f64)> {
        self.x.zip(self.y)
    }
}

#[derive(Debug, Deserialize)]
pub struct ClickParams {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
pub struct ZoomParams {
    factor: f64,
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct PanParams {
    dx: f64,
    dy: f64,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    outcome: &'static str,
    view: ViewSnapshot,
}

pub fn build_app(state: SharedState, data_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/map.svg", get(map_svg))
        .route("/select/{index}", get(select_and_redirect))
        .route("/reset", get(reset_and_redirect))
        .route("/zoom", get(zoom_and_redirect))
        .route("/pan", get(pan_and_redirect))
        .route("/click", get(click_and_redirect))
        .route("/api/features", get(api_features))
        .route("/api/view", get(api_view))
        .route("/api/select/{index}", post(api_select))
        .route("/api/reset", post(api_reset))
        .route("/api/zoom", post(api_zoom))
        .route("/api/pan", post(api_pan))
        .route("/api/click", post(api_click));

    if let Some(dir) = data_dir {
        app = app.nest_service("/data", ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn start_server(config: AppConfig, session: MapSession) -> Result<()> {
    let state = Arc::new(AppState::new(session));

    let port = config.server.port;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let app = build_app(state, config.input.data_dir.clone());

    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("serving map on http://{}", addr);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn index(State(state): State<SharedState>) -> Html<String> {
    let mut session = state.session();
    let pending = session.take_pending();
    Html(render_page(&session, pending.as_ref(), INTERACTIVE))
}

async fn map_svg(State(state): State<SharedState>) -> impl IntoResponse {
    let session = state.session();
    let svg = render_svg(&session, session.pending(), INTERACTIVE);
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}

async fn select_and_redirect(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
) -> Result<Redirect, StatusCode> {
    let mut session = state.session();
    session.select(index, None).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Redirect::to("/"))
}

async fn reset_and_redirect(State(state): State<SharedState>, Query(params): Query<PointParams>) -> Redirect {
    state.session().reset(params.point());
    Redirect::to("/")
}

async fn zoom_and_redirect(State(state): State<SharedState>, Query(params): Query<ZoomParams>) -> Redirect {
    state.session().zoom_by(params.factor, params.x.zip(params.y));
    Redirect::to("/")
}

async fn pan_and_redirect(State(state): State<SharedState>, Query(params): Query<PanParams>) -> Redirect {
    state.session().pan_by(params.dx, params.dy);
    Redirect::to("/")
}

async fn click_and_redirect(State(state): State<SharedState>, Query(params): Query<ClickParams>) -> Redirect {
    state.session().click((params.x, params.y));
    Redirect::to("/")
}

async fn api_features(State(state): State<SharedState>) -> Json<Vec<FeatureSummary>> {
    Json(state.session().summaries())
}

async fn api_view(State(state): State<SharedState>) -> Json<ViewSnapshot> {
    Json(state.session().snapshot())
}

async fn api_select(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
) -> Result<Json<ViewSnapshot>, StatusCode> {
    let mut session = state.session();
    session.select(index, None).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(session.snapshot()))
}

async fn api_reset(State(state): State<SharedState>) -> Json<ViewSnapshot> {
    let mut session = state.session();
    session.reset(None);
    Json(session.snapshot())
}

async fn api_zoom(State(state): State<SharedState>, Json(params): Json<ZoomParams>) -> Json<ViewSnapshot> {
    let mut session = state.session();
    session.zoom_by(params.factor, params.x.zip(params.y));
    Json(session.snapshot())
}

async fn api_pan(State(state): State<SharedState>, Json(params): Json<PanParams>) -> Json<ViewSnapshot> {
    let mut session = state.session();
    session.pan_by(params.dx, params.dy);
    Json(session.snapshot())
}

async fn api_click(State(state): State<SharedState>, Json(params): Json<ClickParams>) -> Json<ClickResponse> {
    let mut session = state.session();
    let outcome = match session.click((params.x, params.y)) {
        ClickOutcome::Selected(_) => "selected",
        ClickOutcome::Background => "background",
    };
    Json(ClickResponse { outcome, view: session.snapshot() })
}
