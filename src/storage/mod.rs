//! Object storage for product media.
//!
//! Rows only ever hold storage paths (`products/{product_id}/...`). Public
//! URLs are derived from a path at read time through [`MediaStorage::public_url`].

use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

pub mod image;
pub mod local;
#[cfg(test)]
pub mod test;

pub use local::LocalStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object path `{0}`")]
    InvalidPath(String),

    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("storage backend rejected the request: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Storage handles are cheap to clone and share their backend.
pub trait MediaStorage: Clone + Send + Sync + 'static {
    /// Store `bytes` under `path` and return the stored path.
    fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<String, StorageError>> + Send;

    fn remove(&self, path: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn public_url(&self, path: &str) -> String;
}

/// A file attached to a form submission that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: Option<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Lowercase extension taken from the file name, falling back to the MIME subtype.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
        let from_mime = || {
            self.content_type
                .as_deref()
                .and_then(|mime| mime.split_once('/'))
                .map(|(_, sub)| sub.split(';').next().unwrap_or(sub).trim())
                .map(|sub| if sub == "jpeg" { "jpg" } else { sub })
                .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        };
        from_name
            .or_else(from_mime)
            .unwrap_or("bin")
            .to_ascii_lowercase()
    }

    pub fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .unwrap_or("application/octet-stream")
    }
}

pub fn product_media_key(product_id: Uuid, extension: &str) -> String {
    format!("products/{product_id}/{}.{extension}", Uuid::new_v4())
}

pub fn variant_media_key(product_id: Uuid, extension: &str) -> String {
    format!("products/{product_id}/variants/{}.{extension}", Uuid::new_v4())
}

/// Tracks the objects written during one save so they can be removed if the
/// save does not complete.
///
/// A session dropped before [`finish`](Self::finish) or
/// [`rollback`](Self::rollback) (the request future was cancelled) removes its
/// objects on a background task.
pub struct UploadSession<M: MediaStorage> {
    storage: M,
    uploaded: Vec<String>,
    in_flight: Option<String>,
}

impl<M: MediaStorage> UploadSession<M> {
    pub fn new(storage: &M) -> Self {
        Self {
            storage: storage.clone(),
            uploaded: Vec::new(),
            in_flight: None,
        }
    }

    pub async fn put(&mut self, path: String, attachment: Attachment) -> Result<String, StorageError> {
        let content_type = attachment.content_type().to_string();
        self.in_flight = Some(path.clone());
        let result = self
            .storage
            .upload(&path, attachment.bytes, &content_type)
            .await;
        self.in_flight = None;
        let stored = result?;
        self.uploaded.push(stored.clone());
        Ok(stored)
    }

    pub fn uploaded(&self) -> &[String] {
        &self.uploaded
    }

    /// Keep everything uploaded so far.
    pub fn finish(mut self) -> Vec<String> {
        std::mem::take(&mut self.uploaded)
    }

    /// Remove everything uploaded so far, newest first.
    pub async fn rollback(mut self) {
        let paths: Vec<String> = std::mem::take(&mut self.uploaded).into_iter().rev().collect();
        if paths.is_empty() {
            return;
        }
        tracing::debug!(objects = paths.len(), "rolling back uploads");
        remove_best_effort(&self.storage, &paths).await;
    }
}

impl<M: MediaStorage> Drop for UploadSession<M> {
    fn drop(&mut self) {
        let mut paths = std::mem::take(&mut self.uploaded);
        // An interrupted upload may still have written its object.
        paths.extend(self.in_flight.take());
        if paths.is_empty() {
            return;
        }
        paths.reverse();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(objects = paths.len(), "save abandoned, removing its uploads");
                let storage = self.storage.clone();
                handle.spawn(async move {
                    remove_best_effort(&storage, &paths).await;
                });
            }
            Err(_) => {
                tracing::error!(objects = ?paths, "save abandoned outside a runtime, uploads left behind");
            }
        }
    }
}

/// Remove objects one by one, logging failures instead of returning them.
pub async fn remove_best_effort<M: MediaStorage>(storage: &M, paths: &[String]) {
    for path in paths {
        if let Err(err) = storage.remove(path).await {
            tracing::warn!(error = %err, path = %path, "failed to remove stored object");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_file_name_then_mime() {
        let named = Attachment::new(Some("Front.PNG".into()), Some("image/jpeg".into()), vec![]);
        assert_eq!(named.extension(), "png");

        let unnamed = Attachment::new(None, Some("image/jpeg".into()), vec![]);
        assert_eq!(unnamed.extension(), "jpg");

        let bare = Attachment::new(Some("blob".into()), None, vec![]);
        assert_eq!(bare.extension(), "bin");
        assert_eq!(bare.content_type(), "application/octet-stream");
    }

    #[test]
    fn keys_are_scoped_to_product() {
        let id = Uuid::new_v4();
        let key = product_media_key(id, "jpg");
        assert!(key.starts_with(&format!("products/{id}/")));
        assert!(key.ends_with(".jpg"));

        let variant = variant_media_key(id, "png");
        assert!(variant.starts_with(&format!("products/{id}/variants/")));
    }

    #[tokio::test]
    async fn rollback_removes_everything_uploaded() {
        let storage = test::TestStorage::default();
        let mut session = UploadSession::new(&storage);
        let a = session
            .put("products/x/a.jpg".into(), Attachment::new(None, None, vec![1]))
            .await
            .expect("upload a");
        let b = session
            .put("products/x/b.jpg".into(), Attachment::new(None, None, vec![2]))
            .await
            .expect("upload b");
        assert_eq!(session.uploaded(), &[a.clone(), b.clone()]);

        session.rollback().await;

        assert_eq!(storage.removed(), vec![b, a]);
        assert!(storage.stored_paths().is_empty());
    }

    #[tokio::test]
    async fn dropped_session_removes_its_uploads() {
        let storage = test::TestStorage::default();
        let mut session = UploadSession::new(&storage);
        session
            .put("products/x/a.jpg".into(), Attachment::new(None, None, vec![1]))
            .await
            .expect("upload a");
        drop(session);

        for _ in 0..10 {
            if storage.stored_paths().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(storage.stored_paths().is_empty());
        assert_eq!(storage.removed(), vec!["products/x/a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn finished_session_keeps_its_uploads() {
        let storage = test::TestStorage::default();
        let mut session = UploadSession::new(&storage);
        session
            .put("products/x/a.jpg".into(), Attachment::new(None, None, vec![1]))
            .await
            .expect("upload a");
        assert_eq!(session.finish(), vec!["products/x/a.jpg".to_string()]);

        tokio::task::yield_now().await;
        assert!(storage.removed().is_empty());
        assert_eq!(storage.stored_paths().len(), 1);
    }
}
