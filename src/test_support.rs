#![cfg(test)]

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::{StreamExt, stream};
use uuid::Uuid;

use crate::{
    extractor::{ByteStream, Extractor, ExtractorError, RawVideoInfo, is_youtube_video_url},
    models::{DownloadRequest, DownloadStatus, NewDownloadRequest, NewUser, Quality, User},
    storage::{MemStorage, Storage, StoreError},
};

#[derive(Clone)]
pub enum StreamBehavior {
    Chunks(Vec<&'static str>),
    FailOpen,
    FailAfter(Vec<&'static str>),
    /// Yields the chunks, then never finishes.
    Stall(Vec<&'static str>),
}

/// In-process extractor that accepts YouTube URLs and serves canned data.
pub struct FakeExtractor {
    info: Option<RawVideoInfo>,
    stream: StreamBehavior,
    info_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    qualities: Mutex<Vec<Quality>>,
}

impl FakeExtractor {
    pub fn new() -> Self {
        Self {
            info: Some(RawVideoInfo {
                title: "Test video".to_string(),
                length_seconds: 212,
                view_count: 42,
                thumbnails: Vec::new(),
            }),
            stream: StreamBehavior::Chunks(vec!["fake-", "mp4"]),
            info_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            qualities: Mutex::new(Vec::new()),
        }
    }

    pub fn with_info(mut self, info: RawVideoInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        if let Some(info) = self.info.as_mut() {
            info.title = title.to_string();
        }
        self
    }

    pub fn failing_info(mut self) -> Self {
        self.info = None;
        self
    }

    pub fn with_stream(mut self, stream: StreamBehavior) -> Self {
        self.stream = stream;
        self
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn qualities(&self) -> Vec<Quality> {
        self.qualities.lock().unwrap().clone()
    }
}

fn chunks(items: &[&'static str]) -> Vec<io::Result<Bytes>> {
    items
        .iter()
        .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
        .collect()
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn validate_url(&self, url: &str) -> bool {
        is_youtube_video_url(url)
    }

    async fn get_info(&self, _url: &str) -> Result<RawVideoInfo, ExtractorError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.info
            .clone()
            .ok_or_else(|| ExtractorError::Failed("ERROR: Video unavailable".to_string()))
    }

    async fn open_stream(
        &self,
        _url: &str,
        quality: Quality,
    ) -> Result<ByteStream, ExtractorError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.qualities.lock().unwrap().push(quality);

        match &self.stream {
            StreamBehavior::Chunks(items) => Ok(stream::iter(chunks(items)).boxed()),
            StreamBehavior::FailOpen => Err(ExtractorError::Failed(
                "ERROR: Requested format is not available".to_string(),
            )),
            StreamBehavior::FailAfter(items) => {
                let mut items = chunks(items);
                items.push(Err(io::Error::other("connection reset")));
                Ok(stream::iter(items).boxed())
            }
            StreamBehavior::Stall(items) => {
                Ok(stream::iter(chunks(items)).chain(stream::pending()).boxed())
            }
        }
    }
}

/// Wraps [`MemStorage`] and remembers every status it was asked to apply.
#[derive(Clone, Default)]
pub struct RecordingStorage {
    inner: MemStorage,
    transitions: Arc<Mutex<Vec<(Uuid, DownloadStatus)>>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses in the order they were recorded, including the initial one.
    pub fn history(&self, id: Uuid) -> Vec<DownloadStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(entry_id, _)| *entry_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for (id, _) in self.transitions.lock().unwrap().iter() {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

#[async_trait]
impl Storage for RecordingStorage {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.inner.get_user(id).await
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.inner.get_user_by_username(username).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(user).await
    }

    async fn create_download_request(&self, request: NewDownloadRequest) -> DownloadRequest {
        let record = self.inner.create_download_request(request).await;
        self.transitions
            .lock()
            .unwrap()
            .push((record.id, record.status));
        record
    }

    async fn get_download_request(&self, id: Uuid) -> Option<DownloadRequest> {
        self.inner.get_download_request(id).await
    }

    async fn update_download_request_status(
        &self,
        id: Uuid,
        status: DownloadStatus,
    ) -> Result<Option<DownloadRequest>, StoreError> {
        let updated = self.inner.update_download_request_status(id, status).await?;
        if let Some(record) = &updated {
            self.transitions
                .lock()
                .unwrap()
                .push((record.id, record.status));
        }
        Ok(updated)
    }
}

/// Polls `condition` until it holds or `max_wait` elapses.
pub async fn wait_for<F, Fut>(mut condition: F, max_wait: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < max_wait {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
