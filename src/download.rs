use std::{io, sync::Arc};

use axum::{
    body::{Body, Bytes},
    http::{
        HeaderMap, HeaderName, HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt, stream};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    extractor::{ByteStream, Extractor},
    models::{DownloadStatus, NewDownloadRequest, Quality},
    storage::Storage,
};

pub const DOWNLOAD_ID_HEADER: &str = "x-download-id";

/// Moves a stored request through its lifecycle. A tracker dropped before it
/// settles (for example when the client hangs up mid-transfer) marks the
/// request as failed.
struct StatusTracker {
    storage: Arc<dyn Storage>,
    id: Uuid,
    settled: bool,
}

impl StatusTracker {
    fn new(storage: Arc<dyn Storage>, id: Uuid) -> Self {
        Self {
            storage,
            id,
            settled: false,
        }
    }

    async fn advance(&self, status: DownloadStatus) {
        update_status(self.storage.as_ref(), self.id, status).await;
    }

    async fn settle(mut self, status: DownloadStatus) {
        self.settled = true;
        self.advance(status).await;
    }
}

impl Drop for StatusTracker {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let storage = Arc::clone(&self.storage);
        let id = self.id;
        warn!("Download {id} was abandoned before the transfer finished");
        runtime.spawn(async move {
            update_status(storage.as_ref(), id, DownloadStatus::Failed).await;
        });
    }
}

async fn update_status(storage: &dyn Storage, id: Uuid, status: DownloadStatus) {
    match storage.update_download_request_status(id, status).await {
        Ok(Some(_)) => {}
        Ok(None) => warn!("Download request {id} disappeared before it could be marked {status:?}"),
        Err(error) => warn!("Could not update download request {id}: {error}"),
    }
}

/// Validates the request, records it and answers with the media stream.
///
/// Headers are only produced once the first chunk has arrived, so every
/// failure up to that point is still reported as a JSON error.
pub async fn stream_download(
    storage: Arc<dyn Storage>,
    extractor: &dyn Extractor,
    request: NewDownloadRequest,
) -> Result<Response, ApiError> {
    let video_url = request.video_url.trim().to_string();
    if video_url.is_empty() || !extractor.validate_url(&video_url) {
        return Err(ApiError::invalid_url());
    }

    let record = storage
        .create_download_request(NewDownloadRequest {
            video_url: video_url.clone(),
            resolution: request.resolution.clone(),
        })
        .await;
    let tracker = StatusTracker::new(Arc::clone(&storage), record.id);
    tracker.advance(DownloadStatus::Processing).await;

    let prepared: Result<(String, Quality, Option<Bytes>, ByteStream), ApiError> = async {
        let info = extractor.get_info(&video_url).await.map_err(|error| {
            error!("Download {}: metadata lookup failed: {error}", record.id);
            ApiError::internal("Failed to process download request")
        })?;

        let filename = derive_filename(&info.title, &request.resolution);
        let quality = Quality::for_label(&request.resolution);

        let mut media = extractor
            .open_stream(&video_url, quality)
            .await
            .map_err(|error| {
                error!("Download {}: video stream error: {error}", record.id);
                ApiError::internal("Failed to download video")
            })?;

        let first_chunk = match media.next().await {
            Some(Ok(chunk)) => Some(chunk),
            Some(Err(error)) => {
                error!("Download {}: video stream error: {error}", record.id);
                return Err(ApiError::internal("Failed to download video"));
            }
            None => None,
        };

        Ok((filename, quality, first_chunk, media))
    }
    .await;

    let (filename, quality, first_chunk, media) = match prepared {
        Ok(prepared) => prepared,
        Err(error) => {
            tracker.settle(DownloadStatus::Failed).await;
            return Err(error);
        }
    };

    info!(
        "Download {} streaming {:?} at up to {}p as {filename}",
        record.id, video_url, quality.max_height
    );

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|_| ApiError::internal("Failed to process download request"))?,
    );
    headers.insert(
        HeaderName::from_static(DOWNLOAD_ID_HEADER),
        HeaderValue::from_str(&record.id.to_string())
            .map_err(|_| ApiError::internal("Failed to process download request"))?,
    );

    let body = Body::from_stream(track_transfer(first_chunk, media, tracker));
    Ok((headers, body).into_response())
}

fn track_transfer(
    first_chunk: Option<Bytes>,
    rest: ByteStream,
    tracker: StatusTracker,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    let head = stream::iter(first_chunk.map(Ok));
    let tail = stream::unfold(Some((rest, tracker)), |state| async move {
        let Some((mut rest, tracker)) = state else {
            return None;
        };
        match rest.next().await {
            Some(Ok(chunk)) => Some((Ok(chunk), Some((rest, tracker)))),
            Some(Err(error)) => {
                error!("Download {}: video stream error: {error}", tracker.id);
                tracker.settle(DownloadStatus::Failed).await;
                Some((Err(error), None))
            }
            None => {
                info!("Download {} completed", tracker.id);
                tracker.settle(DownloadStatus::Completed).await;
                None
            }
        }
    });

    head.chain(tail)
}

/// Builds `<title>_<resolution>.mp4`, keeping only ASCII word characters and
/// joining words with underscores.
pub fn derive_filename(title: &str, resolution: &str) -> String {
    let stem = sanitize_segment(title);
    let stem = if stem.is_empty() {
        "video".to_string()
    } else {
        stem
    };
    let resolution = sanitize_segment(resolution);

    if resolution.is_empty() {
        format!("{stem}.mp4")
    } else {
        format!("{stem}_{resolution}.mp4")
    }
}

fn sanitize_segment(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|character| {
            character.is_ascii_alphanumeric() || *character == '_' || character.is_whitespace()
        })
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join("_")
}
