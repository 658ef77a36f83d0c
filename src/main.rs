use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use vidgrab::{
    AppState, build_router,
    config::{AppConfig, build_cors_layer},
    error::ServerError,
    storage::MemStorage,
    yt_dlp::YtDlp,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "vidgrab=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    let config = AppConfig::from_env();

    if which_yt_dlp(&config.yt_dlp_bin).await {
        info!("Using yt-dlp at {:?}", config.yt_dlp_bin);
    } else {
        warn!(
            "{:?} could not be executed. Install yt-dlp or set YT_DLP_BIN before downloading.",
            config.yt_dlp_bin
        );
    }

    let state = AppState {
        storage: Arc::new(MemStorage::new()),
        extractor: Arc::new(YtDlp::new(config.yt_dlp_bin.clone(), config.yt_dlp_timeout)),
    };

    let cors = build_cors_layer(&config.allowed_origins)?;
    let app = build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind_addr.clone(),
            source,
        })?;

    info!("Backend ready at http://{}", config.bind_addr);

    axum::serve(listener, app).await.map_err(ServerError::Serve)
}

async fn which_yt_dlp(binary: &str) -> bool {
    tokio::process::Command::new(binary)
        .arg("--version")
        .output()
        .await
        .is_ok_and(|output| output.status.success())
}
