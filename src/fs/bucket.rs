//! Bucket storage backends (S3, S3-compatible, GCS, in-memory) using OpenDAL.
//!
//! The operator root is set to the sync prefix, so every path this backend
//! sees is relative to `bucket/prefix`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use opendal::services::{Gcs, Memory, S3};
use opendal::{ErrorKind, Metadata, Operator};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{ListingError, SyncError, TransferError};
use crate::fs::backend::{BackendType, BatchItem, S3Provider, StorageBackend};
use crate::fs::types::{normalize_relative, FileRecord};

/// User-metadata key carrying the source file's modification time.
pub const MTIME_METADATA_KEY: &str = "mtime";

/// Concurrent `stat`/`delete` calls per listing or batch.
pub const DEFAULT_METADATA_CONCURRENCY: usize = 32;

/// S3 connection settings, usually read from the `[s3]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct S3Options {
    pub region: Option<String>,
    pub provider: S3Provider,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Object storage backend
pub struct BucketBackend {
    operator: Operator,
    backend_type: BackendType,
    location: String,
    metadata_concurrency: usize,
}

fn operator_root(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

impl BucketBackend {
    /// Wrap an already-built operator.
    pub fn from_operator(
        operator: Operator,
        backend_type: BackendType,
        location: impl Into<String>,
    ) -> Self {
        Self {
            operator,
            backend_type,
            location: location.into(),
            metadata_concurrency: DEFAULT_METADATA_CONCURRENCY,
        }
    }

    /// S3 or S3-compatible bucket.
    ///
    /// Without explicit keys the standard AWS credential chain applies
    /// (environment, shared credentials file, instance/pod identity).
    pub fn s3(bucket: &str, prefix: &str, options: &S3Options) -> Result<Self, SyncError> {
        let region = options.region.clone().unwrap_or_else(|| "us-east-1".to_string());
        let location = format!("s3://{}/{}", bucket, prefix.trim_matches('/'));
        debug!(provider = options.provider.display_name(), %region, %location, "opening S3 bucket");

        let mut builder = S3::default()
            .bucket(bucket)
            .region(&region)
            .root(&operator_root(prefix));

        let endpoint = options
            .endpoint
            .clone()
            .or_else(|| options.provider.endpoint(&region));
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(&endpoint);
        }
        if let (Some(key), Some(secret)) = (&options.access_key_id, &options.secret_access_key) {
            builder = builder.access_key_id(key).secret_access_key(secret);
        }

        let operator = Operator::new(builder)
            .map_err(|source| SyncError::Backend {
                location: location.clone(),
                source,
            })?
            .finish();

        Ok(Self::from_operator(
            operator,
            BackendType::S3 {
                bucket: bucket.to_string(),
                region,
                provider: options.provider.clone(),
            },
            location,
        ))
    }

    /// Google Cloud Storage bucket.
    ///
    /// Uses Application Default Credentials unless a service account file is given.
    pub fn gcs(
        bucket: &str,
        prefix: &str,
        credential_path: Option<&str>,
    ) -> Result<Self, SyncError> {
        let location = format!("gs://{}/{}", bucket, prefix.trim_matches('/'));

        let mut builder = Gcs::default().bucket(bucket).root(&operator_root(prefix));
        if let Some(path) = credential_path {
            builder = builder.credential_path(path);
        }

        let operator = Operator::new(builder)
            .map_err(|source| SyncError::Backend {
                location: location.clone(),
                source,
            })?
            .finish();

        Ok(Self::from_operator(
            operator,
            BackendType::Gcs {
                bucket: bucket.to_string(),
            },
            location,
        ))
    }

    /// Process-local in-memory bucket.
    pub fn memory(prefix: &str) -> Result<Self, SyncError> {
        let location = format!("memory://{}", prefix.trim_matches('/'));
        let operator = Operator::new(Memory::default().root(&operator_root(prefix)))
            .map_err(|source| SyncError::Backend {
                location: location.clone(),
                source,
            })?
            .finish();
        Ok(Self::from_operator(operator, BackendType::Memory, location))
    }

    fn supports_user_metadata(&self) -> bool {
        self.operator.info().full_capability().write_with_user_metadata
    }

    fn listing_error(&self, source: opendal::Error) -> ListingError {
        ListingError::Remote {
            location: self.location.clone(),
            source,
        }
    }
}

/// Parse a timestamp rendered by the store or by our own `mtime` metadata.
fn parse_store_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| value.parse::<DateTime<Utc>>().ok())
        .or_else(|| {
            NaiveDateTime::parse_from_str(value.trim_end_matches(" UTC"), "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Modification time for an object: our recorded mtime, else the upload time.
fn record_modified(meta: &Metadata) -> Option<DateTime<Utc>> {
    meta.user_metadata()
        .and_then(|user| user.get(MTIME_METADATA_KEY))
        .and_then(|value| parse_store_time(value))
        .or_else(|| {
            meta.last_modified()
                .and_then(|t| parse_store_time(&t.to_string()))
        })
}

#[async_trait]
impl StorageBackend for BucketBackend {
    async fn list_files(&self) -> Result<Vec<FileRecord>, ListingError> {
        let entries = self
            .operator
            .list_with("/")
            .recursive(true)
            .await
            .map_err(|e| self.listing_error(e))?;

        let mut records = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            let raw = entry.path();
            if raw.is_empty() || raw == "/" {
                continue;
            }
            let path = normalize_relative(raw)?;
            if entry.metadata().is_dir() {
                records.push(FileRecord::directory(path));
            } else {
                files.push((raw.to_string(), path));
            }
        }

        debug!(location = %self.location, files = files.len(), "fetching object metadata");

        // Listings omit user metadata and, on some services, sizes.
        let lookups = files.into_iter().map(|(raw, path)| {
            let operator = self.operator.clone();
            async move {
                match operator.stat(&raw).await {
                    Ok(meta) => {
                        let modified = record_modified(&meta);
                        Ok(Some(FileRecord::file(path, meta.content_length(), modified)))
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!(path = %path, "object vanished during listing");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        });
        let stats: Vec<Option<FileRecord>> = futures::stream::iter(lookups)
            .buffer_unordered(self.metadata_concurrency)
            .try_collect()
            .await
            .map_err(|e| self.listing_error(e))?;

        records.extend(stats.into_iter().flatten());
        records.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(records)
    }

    async fn upload(
        &self,
        local_path: &Path,
        path: &str,
        modified: Option<DateTime<Utc>>,
    ) -> Result<(), TransferError> {
        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| TransferError::Io {
                path: path.to_string(),
                operation: "reading",
                source,
            })?;

        let mut write = self.operator.write_with(path, content);
        if let Some(modified) = modified.filter(|_| self.supports_user_metadata()) {
            write = write.user_metadata(HashMap::from([(
                MTIME_METADATA_KEY.to_string(),
                modified.to_rfc3339(),
            )]));
        }
        write.await.map_err(|source| TransferError::Remote {
            path: path.to_string(),
            source,
        })?;

        Ok(())
    }

    async fn download(&self, path: &str, local_path: &Path) -> Result<(), TransferError> {
        let content = self
            .operator
            .read(path)
            .await
            .map_err(|source| TransferError::Remote {
                path: path.to_string(),
                source,
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| TransferError::Io {
                    path: path.to_string(),
                    operation: "creating parent of",
                    source,
                })?;
        }

        tokio::fs::write(local_path, content.to_vec())
            .await
            .map_err(|source| TransferError::Io {
                path: path.to_string(),
                operation: "writing",
                source,
            })
    }

    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem> {
        futures::stream::iter(paths.iter().cloned().map(|path| {
            let operator = self.operator.clone();
            async move {
                match operator.delete(&path).await {
                    Ok(()) => BatchItem::ok(path),
                    Err(source) => BatchItem::failed(TransferError::Remote { path, source }),
                }
            }
        }))
        .buffered(self.metadata_concurrency)
        .collect()
        .await
    }

    fn backend_type(&self) -> BackendType {
        self.backend_type.clone()
    }

    fn display_path(&self, path: &str) -> String {
        format!("{}/{}", self.location.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
