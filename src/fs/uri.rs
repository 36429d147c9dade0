//! Parsing of sync endpoints (`s3://`, `gs://`, `file://`, plain paths).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::SyncError;
use crate::fs::backend::StorageBackend;
use crate::fs::bucket::{BucketBackend, S3Options};
use crate::fs::local::LocalBackend;
use crate::sync::options::Direction;

/// Scheme of a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteScheme {
    S3,
    Gcs,
    /// A local directory treated as a remote store.
    File,
    Memory,
}

impl RemoteScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteScheme::S3 => "s3",
            RemoteScheme::Gcs => "gs",
            RemoteScheme::File => "file",
            RemoteScheme::Memory => "memory",
        }
    }
}

/// A bucket (or bucket-like) location: scheme, bucket and key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub scheme: RemoteScheme,
    /// Bucket name; for `file://` the absolute directory path.
    pub bucket: String,
    pub prefix: String,
}

/// One side of a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(RemoteLocation),
}

impl Location {
    /// Parse a command-line or plan-header endpoint.
    pub fn parse(uri: &str) -> Result<Self, SyncError> {
        let invalid = |reason: &str| SyncError::Endpoint {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let Some((scheme, rest)) = uri.split_once("://") else {
            if uri.is_empty() {
                return Err(invalid("empty path"));
            }
            return Ok(Location::Local(PathBuf::from(uri)));
        };

        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "s3" => RemoteScheme::S3,
            "gs" | "gcs" => RemoteScheme::Gcs,
            "file" => RemoteScheme::File,
            "memory" => RemoteScheme::Memory,
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        };

        if scheme == RemoteScheme::File {
            if !rest.starts_with('/') {
                return Err(invalid("file:// endpoints need an absolute path"));
            }
            return Ok(Location::Remote(RemoteLocation {
                scheme,
                bucket: rest.trim_end_matches('/').to_string(),
                prefix: String::new(),
            }));
        }

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() && scheme != RemoteScheme::Memory {
            return Err(invalid("missing bucket name"));
        }

        Ok(Location::Remote(RemoteLocation {
            scheme,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        }))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Remote(_))
    }
}

impl RemoteLocation {
    /// Build the storage backend rooted at this location.
    pub fn open(
        &self,
        s3: &S3Options,
        gcs_credential_path: Option<&str>,
    ) -> Result<Arc<dyn StorageBackend>, SyncError> {
        let backend: Arc<dyn StorageBackend> = match self.scheme {
            RemoteScheme::S3 => Arc::new(BucketBackend::s3(&self.bucket, &self.prefix, s3)?),
            RemoteScheme::Gcs => Arc::new(BucketBackend::gcs(
                &self.bucket,
                &self.prefix,
                gcs_credential_path,
            )?),
            RemoteScheme::Memory => Arc::new(BucketBackend::memory(&self.prefix)?),
            RemoteScheme::File => Arc::new(LocalBackend::new(&self.bucket)),
        };
        Ok(backend)
    }
}

/// The two sides of a sync after deciding which one is remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub local: PathBuf,
    pub remote: RemoteLocation,
    pub direction: Direction,
}

impl Endpoints {
    /// Exactly one side must be remote; it decides the direction.
    pub fn resolve(source: Location, destination: Location) -> Result<Self, SyncError> {
        match (source, destination) {
            (Location::Local(local), Location::Remote(remote)) => Ok(Self {
                local,
                remote,
                direction: Direction::LocalToRemote,
            }),
            (Location::Remote(remote), Location::Local(local)) => Ok(Self {
                local,
                remote,
                direction: Direction::RemoteToLocal,
            }),
            (Location::Local(_), Location::Local(dest)) => Err(SyncError::Endpoint {
                uri: dest.display().to_string(),
                reason: "one side must be a bucket URI (s3://, gs:// or file://)".to_string(),
            }),
            (Location::Remote(_), Location::Remote(dest)) => Err(SyncError::Endpoint {
                uri: dest.to_string(),
                reason: "bucket-to-bucket sync is not supported; one side must be a local path"
                    .to_string(),
            }),
        }
    }

    /// Canonical (source, destination) URIs for plan headers. Local paths
    /// are made absolute so a plan can be applied from another directory.
    pub fn uris(&self) -> (String, String) {
        let local = std::path::absolute(&self.local)
            .unwrap_or_else(|_| self.local.clone())
            .display()
            .to_string();
        let remote = self.remote.to_string();
        match self.direction {
            Direction::LocalToRemote => (local, remote),
            Direction::RemoteToLocal => (remote, local),
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            RemoteScheme::File => write!(f, "file://{}", self.bucket),
            _ if self.prefix.is_empty() => write!(f, "{}://{}", self.scheme.as_str(), self.bucket),
            _ => write!(f, "{}://{}/{}", self.scheme.as_str(), self.bucket, self.prefix),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote(remote) => remote.fmt(f),
        }
    }
}
