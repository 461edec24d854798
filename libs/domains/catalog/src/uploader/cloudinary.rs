//! Cloudinary image store
//!
//! Uploads through the signed REST API (`/image/upload`) and deletes through
//! `/image/destroy`. Requests are signed by hashing the sorted parameters
//! followed by the API secret, using the algorithm configured on the account.

use async_trait::async_trait;
use chrono::Utc;
use core_config::{env_or_default, env_parse, env_required, ConfigError, FromEnv};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use strum::{Display, EnumString};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::{AssetUploader, UploadedAsset, UPLOAD_TIMEOUT};
use crate::error::{ProductError, ProductResult};

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Hash used for request signatures; must match the account setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder the assets are stored under.
    pub folder: String,
    pub api_base: String,
    pub signature_algorithm: SignatureAlgorithm,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: "images".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            signature_algorithm: SignatureAlgorithm::default(),
        }
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("folder", &self.folder)
            .field("api_base", &self.api_base)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

/// Requires `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY` and `CLOUDINARY_API_SECRET`.
/// Optional: `CLOUDINARY_FOLDER` (default `images`), `CLOUDINARY_API_BASE`,
/// `CLOUDINARY_SIGNATURE_ALGORITHM` (`sha1` or `sha256`).
impl FromEnv for CloudinaryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new(
            env_required("CLOUDINARY_CLOUD_NAME")?,
            env_required("CLOUDINARY_API_KEY")?,
            env_required("CLOUDINARY_API_SECRET")?,
        );
        config.folder = env_or_default("CLOUDINARY_FOLDER", "images");
        config.api_base = env_or_default("CLOUDINARY_API_BASE", DEFAULT_API_BASE);
        config.signature_algorithm =
            env_parse("CLOUDINARY_SIGNATURE_ALGORITHM", SignatureAlgorithm::default())?;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

pub struct CloudinaryUploader {
    config: CloudinaryConfig,
    client: Client,
}

impl CloudinaryUploader {
    /// Build an uploader whose every request is bounded by [`UPLOAD_TIMEOUT`].
    pub fn new(config: CloudinaryConfig) -> ProductResult<Self> {
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| ProductError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            action
        )
    }

    fn sign(&self, params: &BTreeMap<&'static str, String>) -> String {
        signature(params, &self.config.api_secret, self.config.signature_algorithm)
    }

    fn signed_form(&self, params: BTreeMap<&'static str, String>) -> Form {
        let signature = self.sign(&params);
        params
            .into_iter()
            .fold(Form::new(), |form, (key, value)| form.text(key, value))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
    }
}

/// `k1=v1&k2=v2...` over the parameters in key order.
fn string_to_sign(params: &BTreeMap<&'static str, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn signature(
    params: &BTreeMap<&'static str, String>,
    secret: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    let payload = format!("{}{}", string_to_sign(params), secret);
    match algorithm {
        SignatureAlgorithm::Sha1 => format!("{:x}", Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => format!("{:x}", Sha256::digest(payload.as_bytes())),
    }
}

/// Public ids must be unique, otherwise a signed upload overwrites the older asset.
fn unique_public_id(suggested_name: &str) -> String {
    let stem = Path::new(suggested_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", stem, &suffix[..12])
}

#[async_trait]
impl AssetUploader for CloudinaryUploader {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> ProductResult<UploadedAsset> {
        let mut params = BTreeMap::new();
        params.insert("folder", self.config.folder.clone());
        params.insert("public_id", unique_public_id(suggested_name));
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let file = Part::bytes(bytes)
            .file_name(suggested_name.to_string())
            .mime_str("image/jpeg")?;
        let form = self.signed_form(params).part("file", file);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, error = %body, "Cloudinary rejected the upload");
            return Err(ProductError::Upload(format!(
                "Cloudinary returned {status}: {body}"
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        debug!(public_id = %uploaded.public_id, "image uploaded");
        Ok(UploadedAsset {
            secure_url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, public_id: &str) -> ProductResult<()> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", Utc::now().timestamp().to_string());

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .multipart(self.signed_form(params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProductError::Upload(format!(
                "Cloudinary destroy returned {status}: {body}"
            )));
        }

        let destroyed: DestroyResponse = response.json().await?;
        match destroyed.result.as_str() {
            "ok" => Ok(()),
            "not found" => {
                debug!("asset already gone");
                Ok(())
            }
            other => Err(ProductError::Upload(format!(
                "Cloudinary destroy answered '{other}'"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}
