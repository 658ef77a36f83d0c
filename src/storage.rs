use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{DownloadRequest, DownloadStatus, NewDownloadRequest, NewUser, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("username {0:?} is already taken")]
    UsernameTaken(String),

    #[error("cannot move download request {id} from {from:?} to {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: DownloadStatus,
        to: DownloadStatus,
    },
}

/// Backend for users and download request records.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn get_user_by_username(&self, username: &str) -> Option<User>;
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn create_download_request(&self, request: NewDownloadRequest) -> DownloadRequest;
    async fn get_download_request(&self, id: Uuid) -> Option<DownloadRequest>;
    /// `Ok(None)` when no record has this id.
    async fn update_download_request_status(
        &self,
        id: Uuid,
        status: DownloadStatus,
    ) -> Result<Option<DownloadRequest>, StoreError>;
}

/// Process-local store. Entries live until the process exits.
#[derive(Clone, Default)]
pub struct MemStorage {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    download_requests: Arc<Mutex<HashMap<Uuid, DownloadRequest>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.lock().await.get(&id).cloned()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.users
            .lock()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().await;
        if users
            .values()
            .any(|existing| existing.username == user.username)
        {
            return Err(StoreError::UsernameTaken(user.username));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            password: user.password,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_download_request(&self, request: NewDownloadRequest) -> DownloadRequest {
        let record = DownloadRequest {
            id: Uuid::new_v4(),
            video_url: request.video_url,
            resolution: request.resolution,
            status: DownloadStatus::Pending,
            created_at: Utc::now(),
        };

        self.download_requests
            .lock()
            .await
            .insert(record.id, record.clone());
        record
    }

    async fn get_download_request(&self, id: Uuid) -> Option<DownloadRequest> {
        self.download_requests.lock().await.get(&id).cloned()
    }

    async fn update_download_request_status(
        &self,
        id: Uuid,
        status: DownloadStatus,
    ) -> Result<Option<DownloadRequest>, StoreError> {
        let mut requests = self.download_requests.lock().await;
        let Some(record) = requests.get_mut(&id) else {
            return Ok(None);
        };

        if !record.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        Ok(Some(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_request(url: &str) -> NewDownloadRequest {
        NewDownloadRequest {
            video_url: url.to_string(),
            resolution: "720p".to_string(),
        }
    }

    #[tokio::test]
    async fn created_requests_start_pending() {
        let store = MemStorage::new();
        let record = store
            .create_download_request(new_request("https://youtu.be/dQw4w9WgXcQ"))
            .await;

        assert_eq!(record.status, DownloadStatus::Pending);
        assert_eq!(store.get_download_request(record.id).await, Some(record));
    }

    #[tokio::test]
    async fn status_updates_follow_the_lifecycle() {
        let store = MemStorage::new();
        let record = store
            .create_download_request(new_request("https://youtu.be/dQw4w9WgXcQ"))
            .await;

        let updated = store
            .update_download_request_status(record.id, DownloadStatus::Processing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, DownloadStatus::Processing);

        store
            .update_download_request_status(record.id, DownloadStatus::Completed)
            .await
            .unwrap();

        let error = store
            .update_download_request_status(record.id, DownloadStatus::Processing)
            .await
            .unwrap_err();
        assert_eq!(
            error,
            StoreError::InvalidTransition {
                id: record.id,
                from: DownloadStatus::Completed,
                to: DownloadStatus::Processing,
            }
        );

        let stored = store.get_download_request(record.id).await.unwrap();
        assert_eq!(stored.status, DownloadStatus::Completed);
        assert_eq!(stored.created_at, record.created_at);
    }

    #[tokio::test]
    async fn updating_missing_request_returns_none() {
        let store = MemStorage::new();
        let result = store
            .update_download_request_status(Uuid::new_v4(), DownloadStatus::Processing)
            .await;
        assert_eq!(result, Ok(None));
    }

    #[tokio::test]
    async fn concurrent_requests_for_same_url_get_distinct_ids() {
        let store = MemStorage::new();
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_download_request(new_request(url)).await })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            let record = task.await.unwrap();
            assert!(ids.insert(record.id));
        }

        assert_eq!(ids.len(), 16);
        for id in ids {
            assert!(store.get_download_request(id).await.is_some());
        }
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemStorage::new();
        let user = store
            .create_user(NewUser {
                username: "ada".to_string(),
                password: "hunter2".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(store.get_user(user.id).await, Some(user.clone()));
        assert_eq!(store.get_user_by_username("ada").await, Some(user));
        assert_eq!(store.get_user_by_username("grace").await, None);

        let duplicate = store
            .create_user(NewUser {
                username: "ada".to_string(),
                password: "other".to_string(),
            })
            .await;
        assert_eq!(duplicate, Err(StoreError::UsernameTaken("ada".to_string())));
    }
}
