//! In-memory asset store for tests and offline runs

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AssetUploader, UploadedAsset};
use crate::error::{ProductError, ProductResult};

/// A captured upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub public_id: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Keeps uploads in memory and serves them from `https://assets.test/`.
#[derive(Clone, Default)]
pub struct MockAssetUploader {
    uploads: Arc<Mutex<Vec<StoredAsset>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    upload_failure: Option<String>,
    delete_failure: Option<String>,
}

impl MockAssetUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upload fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            upload_failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Uploads succeed but every delete fails with `message`.
    pub fn failing_deletes(message: impl Into<String>) -> Self {
        Self {
            delete_failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub async fn uploads(&self) -> Vec<StoredAsset> {
        self.uploads.lock().await.clone()
    }

    pub async fn upload_count(&self) -> usize {
        self.uploads.lock().await.len()
    }

    /// Public ids passed to `delete`, in call order.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl AssetUploader for MockAssetUploader {
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> ProductResult<UploadedAsset> {
        if let Some(message) = &self.upload_failure {
            return Err(ProductError::Upload(message.clone()));
        }

        let mut uploads = self.uploads.lock().await;
        let public_id = format!("images/{}-{}", uploads.len() + 1, suggested_name);
        uploads.push(StoredAsset {
            public_id: public_id.clone(),
            name: suggested_name.to_string(),
            bytes,
        });

        Ok(UploadedAsset {
            secure_url: format!("https://assets.test/{public_id}"),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> ProductResult<()> {
        self.deleted.lock().await.push(public_id.to_string());
        match &self.delete_failure {
            Some(message) => Err(ProductError::Upload(message.clone())),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_is_captured() {
        let uploader = MockAssetUploader::new();

        let asset = uploader.upload(vec![1, 2, 3], "mug.jpg").await.unwrap();

        assert_eq!(asset.public_id, "images/1-mug.jpg");
        assert_eq!(asset.secure_url, "https://assets.test/images/1-mug.jpg");
        let uploads = uploader.uploads().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failing_upload() {
        let uploader = MockAssetUploader::failing("store offline");

        let err = uploader.upload(vec![0], "mug.jpg").await.unwrap_err();

        assert!(matches!(err, ProductError::Upload(msg) if msg == "store offline"));
        assert_eq!(uploader.upload_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_is_recorded_even_when_failing() {
        let uploader = MockAssetUploader::failing_deletes("nope");

        assert!(uploader.delete("images/1-mug.jpg").await.is_err());
        assert_eq!(uploader.deleted().await, vec!["images/1-mug.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let uploader = MockAssetUploader::new();
        let clone = uploader.clone();

        clone.upload(vec![9], "a.jpg").await.unwrap();

        assert_eq!(uploader.upload_count().await, 1);
    }
}
