//! Remote asset storage for product images.

pub mod cloudinary;
pub mod mock;

pub use cloudinary::{CloudinaryConfig, CloudinaryUploader, SignatureAlgorithm};
pub use mock::MockAssetUploader;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ProductResult;

/// Hard limit for a single upload or delete call. Calls are never retried.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A stored asset as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Public HTTPS URL of the asset.
    pub secure_url: String,
    /// Store-specific handle, needed to delete the asset again.
    pub public_id: String,
}

#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Store `bytes` under a name derived from `suggested_name`.
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> ProductResult<UploadedAsset>;

    /// Remove a previously uploaded asset.
    async fn delete(&self, public_id: &str) -> ProductResult<()>;

    fn name(&self) -> &'static str;
}
