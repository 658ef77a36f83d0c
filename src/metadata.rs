use tracing::error;

use crate::{
    error::ApiError,
    extractor::{Extractor, RawVideoInfo},
    models::VideoInfo,
};

/// Validates `video_url`, asks the extractor for its metadata and formats it
/// for display. Surrounding whitespace is ignored for validation and lookup;
/// the response echoes the URL exactly as submitted.
pub async fn fetch_video_info(
    extractor: &dyn Extractor,
    video_url: &str,
) -> Result<VideoInfo, ApiError> {
    let lookup_url = video_url.trim();
    if lookup_url.is_empty() || !extractor.validate_url(lookup_url) {
        return Err(ApiError::invalid_url());
    }

    let raw = extractor.get_info(lookup_url).await.map_err(|error| {
        error!("Error fetching video info for {lookup_url:?}: {error}");
        ApiError::internal("Failed to fetch video information")
    })?;

    Ok(to_video_info(raw, video_url))
}

pub fn to_video_info(raw: RawVideoInfo, video_url: &str) -> VideoInfo {
    VideoInfo {
        duration: format_duration(raw.length_seconds),
        views: format_views(raw.view_count),
        thumbnail: raw
            .thumbnails
            .into_iter()
            .next()
            .map(|thumbnail| thumbnail.url)
            .unwrap_or_default(),
        title: raw.title,
        video_url: video_url.to_string(),
    }
}

/// `m:ss`; minutes are not rolled over into hours.
pub fn format_duration(total_seconds: u64) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn format_views(views: u64) -> String {
    if views >= 1_000_000 {
        format!("{:.1}M views", views as f64 / 1_000_000.0)
    } else if views >= 1_000 {
        format!("{:.1}K views", views as f64 / 1_000.0)
    } else {
        format!("{views} views")
    }
}
