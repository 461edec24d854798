use async_trait::async_trait;
use domain_catalog::{
    AssetUploader, CloudinaryConfig, CloudinaryUploader, ProductError, ProductResult,
    UploadedAsset,
};

/// Asset store chosen at startup from the environment.
pub enum AppUploader {
    Cloudinary(CloudinaryUploader),
    /// No credentials configured; reads work, uploads fail.
    Unconfigured,
}

impl AppUploader {
    pub fn from_config(config: Option<CloudinaryConfig>) -> ProductResult<Self> {
        match config {
            Some(config) => Ok(Self::Cloudinary(CloudinaryUploader::new(config)?)),
            None => Ok(Self::Unconfigured),
        }
    }

    fn unconfigured() -> ProductError {
        ProductError::Upload(
            "Cloudinary is not configured (set CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY, CLOUDINARY_API_SECRET)"
                .to_string(),
        )
    }
}

#[async_trait]
impl AssetUploader for AppUploader {
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> ProductResult<UploadedAsset> {
        match self {
            Self::Cloudinary(uploader) => uploader.upload(bytes, suggested_name).await,
            Self::Unconfigured => Err(Self::unconfigured()),
        }
    }

    async fn delete(&self, public_id: &str) -> ProductResult<()> {
        match self {
            Self::Cloudinary(uploader) => uploader.delete(public_id).await,
            Self::Unconfigured => Err(Self::unconfigured()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Cloudinary(uploader) => uploader.name(),
            Self::Unconfigured => "unconfigured",
        }
    }
}
