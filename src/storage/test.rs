use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{MediaStorage, StorageError};

#[derive(Default)]
struct Inner {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    uploads: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    fail_uploads_containing: Mutex<Option<String>>,
    hang_uploads_containing: Mutex<Option<String>>,
}

/// In-memory store used by unit tests. Records every call it receives; clones
/// share the same objects.
#[derive(Default, Clone)]
pub struct TestStorage {
    inner: Arc<Inner>,
}

impl TestStorage {
    /// Start with objects already present, as if uploaded by an earlier save.
    pub fn with_objects<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let storage = Self::default();
        {
            let mut objects = storage.inner.objects.lock().unwrap();
            for path in paths {
                objects.insert(path.into(), Vec::new());
            }
        }
        storage
    }

    /// Make every upload whose path contains `needle` fail.
    pub fn fail_uploads_containing(&self, needle: &str) {
        *self.inner.fail_uploads_containing.lock().unwrap() = Some(needle.to_string());
    }

    /// Make every upload whose path contains `needle` never complete.
    pub fn hang_uploads_containing(&self, needle: &str) {
        *self.inner.hang_uploads_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn uploads(&self) -> Vec<String> {
        self.inner.uploads.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.inner.removed.lock().unwrap().clone()
    }

    pub fn stored_paths(&self) -> Vec<String> {
        self.inner.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.objects.lock().unwrap().get(path).cloned()
    }
}

fn matches(needle: &Mutex<Option<String>>, path: &str) -> bool {
    needle
        .lock()
        .unwrap()
        .as_deref()
        .is_some_and(|needle| path.contains(needle))
}

impl MediaStorage for TestStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if matches(&self.inner.hang_uploads_containing, path) {
            std::future::pending::<()>().await;
        }
        if matches(&self.inner.fail_uploads_containing, path) {
            return Err(StorageError::Backend(format!("upload of {path} refused")));
        }
        self.inner.uploads.lock().unwrap().push(path.to_string());
        self.inner.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.inner.removed.lock().unwrap().push(path.to_string());
        match self.inner.objects.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(path.to_string())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://cdn.test/{path}")
    }
}
