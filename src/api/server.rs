use std::sync::{Arc, RwLock};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;
use serde::Serialize;

use crate::analytics::PipelineStats;
use crate::display::{LabelBoard, SharedPreview, Slot};

#[derive(Embed)]
#[folder = "src/assets/"]
struct Assets;

#[derive(Clone)]
pub struct AppState {
    pub camera_id: String,
    pub board: Arc<RwLock<LabelBoard>>,
    pub preview: SharedPreview,
    pub stats: Arc<PipelineStats>,
}

impl AppState {
    pub fn new(
        camera_id: String,
        board: Arc<RwLock<LabelBoard>>,
        preview: SharedPreview,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            camera_id,
            board,
            preview,
            stats,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    camera: String,
    frames_analyzed: u64,
    frames_dropped: u64,
    objects_seen: u64,
    slots_in_use: usize,
}

pub async fn start_server(state: AppState, port: u16) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/assets/{*path}", get(static_handler))
        .route("/api/slots", get(slots_handler))
        .route("/api/preview", get(preview_handler))
        .route("/api/status", get(status_handler))
        .with_state(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("starting HTTP server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn index_handler() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn slots_handler(State(state): State<AppState>) -> Response {
    match state.board.read() {
        Ok(board) => {
            let slots: Vec<Slot> = board.slots().to_vec();
            axum::Json(slots).into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "board lock error").into_response(),
    }
}

async fn preview_handler(State(state): State<AppState>) -> Response {
    match state.preview.read() {
        Ok(preview) => match preview.as_ref() {
            Some(jpeg) => ([(header::CONTENT_TYPE, "image/jpeg")], jpeg.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, "no frame yet").into_response(),
        },
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "preview lock error").into_response(),
    }
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let slots_in_use = match state.board.read() {
        Ok(board) => board.slots_in_use(),
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "board lock error").into_response(),
    };

    let response = StatusResponse {
        camera: state.camera_id.clone(),
        frames_analyzed: state.stats.frames_analyzed(),
        frames_dropped: state.stats.frames_dropped(),
        objects_seen: state.stats.objects_seen(),
        slots_in_use,
    };

    axum::Json(response).into_response()
}
