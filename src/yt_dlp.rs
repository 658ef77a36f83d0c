use std::{io, process::Stdio};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::{StreamExt, stream};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, Command},
    task::JoinHandle,
    time::{Duration, timeout},
};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    extractor::{
        ByteStream, Extractor, ExtractorError, RawVideoInfo, Thumbnail, is_youtube_video_url,
    },
    models::Quality,
};

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<String>,
    duration: Option<f64>,
    view_count: Option<u64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

impl YtDlpVideoInfo {
    fn into_raw(self) -> RawVideoInfo {
        // yt-dlp lists thumbnails worst first; `thumbnail` is its pick of the best.
        let mut thumbnails: Vec<Thumbnail> = self.thumbnails.into_iter().rev().collect();
        if let Some(best) = self.thumbnail.filter(|value| !value.trim().is_empty())
            && !thumbnails.iter().any(|item| item.url == best)
        {
            thumbnails.insert(
                0,
                Thumbnail {
                    url: best,
                    width: None,
                    height: None,
                },
            );
        }

        RawVideoInfo {
            title: self
                .title
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| "Untitled".to_string()),
            length_seconds: self
                .duration
                .filter(|value| value.is_finite() && *value > 0.0)
                .map(|value| value.round() as u64)
                .unwrap_or_default(),
            view_count: self.view_count.unwrap_or_default(),
            thumbnails,
        }
    }
}

/// Extractor backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    metadata_timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>, metadata_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            metadata_timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output, ExtractorError> {
        let command_future = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.metadata_timeout, command_future)
            .await
            .map_err(|_| ExtractorError::Timeout(self.metadata_timeout.as_secs()))?
            .map_err(ExtractorError::Spawn)?;

        if !output.status.success() {
            return Err(ExtractorError::Failed(run_error_message(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }

        Ok(output)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    fn validate_url(&self, url: &str) -> bool {
        is_youtube_video_url(url)
    }

    async fn get_info(&self, url: &str) -> Result<RawVideoInfo, ExtractorError> {
        let output = self
            .run(vec![
                "-J".to_string(),
                "--no-playlist".to_string(),
                "--no-warnings".to_string(),
                url.to_string(),
            ])
            .await?;

        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout)?;
        Ok(info.into_raw())
    }

    async fn open_stream(&self, url: &str, quality: Quality) -> Result<ByteStream, ExtractorError> {
        let mut child = Command::new(&self.binary)
            .args(stream_args(url, quality))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExtractorError::Spawn)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::Failed("yt-dlp stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::Failed("yt-dlp stderr was not captured".to_string()))?;

        let stderr_reader = tokio::spawn(async move {
            let mut collected = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("yt-dlp: {line}");
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        // The exit check runs once stdout is drained, so a failed run surfaces
        // as the final item of the stream instead of a silently short file.
        let exit = stream::once(wait_for_exit(child, stderr_reader))
            .filter_map(|outcome| async move { outcome.err().map(Err::<Bytes, io::Error>) });

        Ok(ReaderStream::new(stdout).chain(exit).boxed())
    }
}

async fn wait_for_exit(mut child: Child, stderr_reader: JoinHandle<String>) -> io::Result<()> {
    let status = child.wait().await?;
    if status.success() {
        return Ok(());
    }

    let stderr = stderr_reader.await.unwrap_or_default();
    Err(io::Error::other(run_error_message(&stderr)))
}

fn stream_args(url: &str, quality: Quality) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--quiet".to_string(),
        "--no-part".to_string(),
        "-f".to_string(),
        format_selector(quality),
        "-o".to_string(),
        "-".to_string(),
        url.to_string(),
    ]
}

/// Single-file formats only, since stdout output cannot be merged.
fn format_selector(quality: Quality) -> String {
    let height = quality.max_height;
    format!(
        "b[ext=mp4][height<={height}][vcodec!=none][acodec!=none]\
         /b[height<={height}][vcodec!=none][acodec!=none]\
         /b[vcodec!=none][acodec!=none]"
    )
}

fn run_error_message(stderr: &str) -> String {
    let message = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the operation")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "Unsupported or invalid URL.".to_string()
    } else {
        message
    }
}
