pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod models;
pub mod routes;
pub mod storage;
pub mod yt_dlp;

mod test_support;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{extractor::Extractor, storage::Storage};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub extractor: Arc<dyn Extractor>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/video-info", post(routes::video_info))
        .route("/api/download", post(routes::download))
        .route("/api/downloads/{id}", get(routes::get_download))
        .with_state(state)
}
