use std::io;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::models::Quality;

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("could not start extractor: {0}")]
    Spawn(#[source] io::Error),

    #[error("extractor timed out after {0}s")]
    Timeout(u64),

    #[error("extractor failed: {0}")]
    Failed(String),

    #[error("extractor returned unreadable metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Metadata as reported by the extraction backend, before formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoInfo {
    pub title: String,
    pub length_seconds: u64,
    pub view_count: u64,
    pub thumbnails: Vec<Thumbnail>,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn validate_url(&self, url: &str) -> bool;

    async fn get_info(&self, url: &str) -> Result<RawVideoInfo, ExtractorError>;

    /// Opens a stream of a single format carrying both audio and video, no
    /// taller than `quality.max_height` when such a format exists.
    async fn open_stream(&self, url: &str, quality: Quality) -> Result<ByteStream, ExtractorError>;
}

const YOUTUBE_HOSTS: [&str; 6] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "gaming.youtube.com",
    "youtube-nocookie.com",
];

const YOUTUBE_PATH_PREFIXES: [&str; 5] = ["embed", "v", "shorts", "live", "e"];

/// Accepts YouTube watch, short-link, embed, shorts and live URLs that carry a
/// well-formed video id.
pub fn is_youtube_video_url(input: &str) -> bool {
    let parsed = match Url::parse(input.trim()) {
        Ok(url) => url,
        Err(_) => return false,
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }

    let host = match parsed.host_str() {
        Some(host) => host.to_ascii_lowercase(),
        None => return false,
    };

    let mut segments = parsed
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter();

    if host == "youtu.be" || host == "www.youtu.be" {
        return segments.next().is_some_and(is_video_id);
    }

    if !YOUTUBE_HOSTS.contains(&host.as_str()) && !host.ends_with(".youtube-nocookie.com") {
        return false;
    }

    match segments.next() {
        Some("watch") => parsed
            .query_pairs()
            .find(|(key, _)| key == "v")
            .is_some_and(|(_, value)| is_video_id(&value)),
        Some(prefix) if YOUTUBE_PATH_PREFIXES.contains(&prefix) => {
            segments.next().is_some_and(is_video_id)
        }
        _ => false,
    }
}

fn is_video_id(value: &str) -> bool {
    value.len() == 11
        && value
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '-' | '_'))
}
