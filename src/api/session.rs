//! In-memory upload sessions.
//!
//! A session is nothing more than the last uploaded file. Parameters travel
//! with every request, so each page view re-runs the pipeline from the raw
//! bytes. Nothing is written to disk; the oldest upload is dropped once the
//! store is full.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
    pub uploaded_at: DateTime<Utc>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            uploaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    uploads: HashMap<Uuid, Upload>,
    order: VecDeque<Uuid>,
}

/// Bounded map of session id to upload.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
    capacity: usize,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            capacity: capacity.max(1),
        }
    }

    /// Store an upload under a fresh id, evicting the oldest when full.
    pub async fn insert(&self, upload: Upload) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        while inner.order.len() >= self.capacity {
            if let Some(old) = inner.order.pop_front() {
                inner.uploads.remove(&old);
                debug!(session = %old, "evicted oldest session");
            }
        }
        inner.uploads.insert(id, upload);
        inner.order.push_back(id);
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Upload> {
        self.inner.read().await.uploads.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.uploads.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SessionStore::new(4);
        let id = store.insert(Upload::new("a.csv", Bytes::from_static(b"a,b\n1,2\n"))).await;
        let upload = store.get(&id).await.unwrap();
        assert_eq!(upload.file_name, "a.csv");
        assert_eq!(&upload.bytes[..], b"a,b\n1,2\n");
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_oldest_session_evicted() {
        let store = SessionStore::new(2);
        let first = store.insert(Upload::new("1.csv", Bytes::new())).await;
        let second = store.insert(Upload::new("2.csv", Bytes::new())).await;
        let third = store.insert(Upload::new("3.csv", Bytes::new())).await;

        assert_eq!(store.len().await, 2);
        assert!(store.get(&first).await.is_none());
        assert!(store.get(&second).await.is_some());
        assert!(store.get(&third).await.is_some());
    }
}
