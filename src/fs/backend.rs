use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::error::{ListingError, TransferError};
use crate::fs::types::FileRecord;

/// Backend type information for display and identification
#[derive(Debug, Clone, PartialEq)]
pub enum BackendType {
    Local,
    S3 { bucket: String, region: String, provider: S3Provider },
    Gcs { bucket: String },
    Memory,
}

impl BackendType {
    /// Get a short display name for the backend
    pub fn short_name(&self) -> &'static str {
        match self {
            BackendType::Local => "Local",
            BackendType::S3 { .. } => "S3",
            BackendType::Gcs { .. } => "GCS",
            BackendType::Memory => "Memory",
        }
    }
}

/// S3-compatible storage providers
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum S3Provider {
    #[default]
    Aws,
    DigitalOcean,
    Hetzner,
    MinIO,
    #[serde(rename = "r2")]
    CloudflareR2,
    Wasabi,
    Custom,
}

impl S3Provider {
    /// Get the endpoint URL for this provider. `Custom` takes it from config.
    pub fn endpoint(&self, region: &str) -> Option<String> {
        match self {
            S3Provider::Aws | S3Provider::Custom => None,
            S3Provider::DigitalOcean => Some(format!("https://{}.digitaloceanspaces.com", region)),
            S3Provider::Hetzner => Some(format!("https://{}.your-objectstorage.com", region)),
            S3Provider::MinIO => Some("http://localhost:9000".to_string()),
            S3Provider::CloudflareR2 => {
                Some(format!("https://{}.r2.cloudflarestorage.com", region))
            }
            S3Provider::Wasabi => Some(format!("https://s3.{}.wasabisys.com", region)),
        }
    }

    /// Get display name for the provider
    pub fn display_name(&self) -> &str {
        match self {
            S3Provider::Aws => "AWS S3",
            S3Provider::DigitalOcean => "DigitalOcean Spaces",
            S3Provider::Hetzner => "Hetzner Object Storage",
            S3Provider::MinIO => "MinIO",
            S3Provider::CloudflareR2 => "Cloudflare R2",
            S3Provider::Wasabi => "Wasabi",
            S3Provider::Custom => "S3-compatible",
        }
    }
}

/// Outcome of one path inside a batch call.
#[derive(Debug)]
pub struct BatchItem {
    pub path: String,
    pub result: Result<(), TransferError>,
}

impl BatchItem {
    pub fn ok(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            result: Ok(()),
        }
    }

    pub fn failed(error: TransferError) -> Self {
        Self {
            path: error.path().to_string(),
            result: Err(error),
        }
    }
}

/// Storage backend shared by both sides of a sync.
///
/// Every path handed to or returned from a backend is relative to the
/// backend's root (a local directory or a bucket prefix).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========== Listing ==========

    /// List every entry beneath the root, fully recursive.
    async fn list_files(&self) -> Result<Vec<FileRecord>, ListingError>;

    // ========== File Transfer ==========

    /// Store the local file at `local_path` under `path`, recording `modified`
    /// as the entry's modification time where the backend can.
    async fn upload(
        &self,
        local_path: &Path,
        path: &str,
        modified: Option<DateTime<Utc>>,
    ) -> Result<(), TransferError>;

    /// Fetch `path` into the local file at `local_path`.
    async fn download(&self, path: &str, local_path: &Path) -> Result<(), TransferError>;

    /// Delete a batch of paths. Non-transactional: the result holds one
    /// outcome per requested path, in request order.
    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem>;

    // ========== Backend Info ==========

    /// Get the backend type
    fn backend_type(&self) -> BackendType;

    /// Get display path for a path below the root
    fn display_path(&self, path: &str) -> String;
}
