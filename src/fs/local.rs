use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use jwalk::WalkDir;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ListingError, TransferError};
use crate::fs::backend::{BackendType, BatchItem, StorageBackend};
use crate::fs::types::FileRecord;

/// Local filesystem backend rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    pub root: PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a root-relative key.
    pub fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    /// Walk the root synchronously. Run this off the async runtime.
    pub fn walk(root: &Path) -> Result<Vec<FileRecord>, ListingError> {
        let metadata = std::fs::metadata(root).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ListingError::RootNotFound {
                root: root.to_path_buf(),
            },
            _ => ListingError::Io {
                path: root.to_path_buf(),
                source,
            },
        })?;
        if !metadata.is_dir() {
            return Err(ListingError::Walk {
                root: root.to_path_buf(),
                message: "not a directory".to_string(),
            });
        }

        let mut records = Vec::new();

        for entry_result in WalkDir::new(root)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
        {
            let entry = entry_result.map_err(|e| ListingError::Walk {
                root: root.to_path_buf(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            let relative = match relative_key(root, &path)? {
                Some(relative) => relative,
                None => continue,
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                records.push(FileRecord::directory(relative));
                continue;
            }
            if !file_type.is_file() {
                warn!(path = %path.display(), "skipping symlink or special file");
                continue;
            }

            let metadata = entry.metadata().map_err(|e| ListingError::Walk {
                root: root.to_path_buf(),
                message: format!("{}: {}", path.display(), e),
            })?;
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            records.push(FileRecord::file(relative, metadata.len(), modified));
        }

        Ok(records)
    }

    /// Set a file's modification time.
    pub fn set_modified(path: &Path, modified: DateTime<Utc>) -> io::Result<()> {
        let mtime =
            FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
        filetime::set_file_mtime(path, mtime)
    }

    fn delete_one(&self, path: &str) -> Result<(), TransferError> {
        let full = self.full_path(path);
        match std::fs::remove_file(&full) {
            Ok(()) => {
                self.prune_empty_parents(&full);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path, "already absent");
                Ok(())
            }
            Err(source) => Err(TransferError::Io {
                path: path.to_string(),
                operation: "deleting",
                source,
            }),
        }
    }

    /// Remove directories left empty by a delete, stopping at the root.
    fn prune_empty_parents(&self, file: &Path) {
        let mut current = file.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

/// Root-relative `/`-separated key for `path`; `None` for the root itself.
fn relative_key(root: &Path, path: &Path) -> Result<Option<String>, ListingError> {
    let relative = path.strip_prefix(root).map_err(|_| ListingError::Walk {
        root: root.to_path_buf(),
        message: format!("{} is outside the root", path.display()),
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| ListingError::NonUtf8Path {
                    path: path.to_path_buf(),
                })?;
                segments.push(name);
            }
            Component::CurDir => {}
            _ => {
                return Err(ListingError::InvalidPath {
                    path: path.display().to_string(),
                    reason: "unexpected path component".to_string(),
                })
            }
        }
    }

    if segments.is_empty() {
        Ok(None)
    } else {
        Ok(Some(segments.join("/")))
    }
}

async fn copy_with_parents(from: &Path, to: &Path, path: &str) -> Result<(), TransferError> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| TransferError::Io {
                path: path.to_string(),
                operation: "creating parent of",
                source,
            })?;
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|source| TransferError::Io {
            path: path.to_string(),
            operation: "copying",
            source,
        })?;
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn list_files(&self) -> Result<Vec<FileRecord>, ListingError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || Self::walk(&root))
            .await
            .map_err(|e| ListingError::Walk {
                root: self.root.clone(),
                message: format!("walker task failed: {}", e),
            })?
    }

    async fn upload(
        &self,
        local_path: &Path,
        path: &str,
        modified: Option<DateTime<Utc>>,
    ) -> Result<(), TransferError> {
        let dest = self.full_path(path);
        copy_with_parents(local_path, &dest, path).await?;
        if let Some(modified) = modified {
            Self::set_modified(&dest, modified).map_err(|source| TransferError::Io {
                path: path.to_string(),
                operation: "setting mtime of",
                source,
            })?;
        }
        Ok(())
    }

    async fn download(&self, path: &str, local_path: &Path) -> Result<(), TransferError> {
        copy_with_parents(&self.full_path(path), local_path, path).await
    }

    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem> {
        let backend = self.clone();
        let batch = paths.to_vec();
        let outcome = tokio::task::spawn_blocking(move || {
            batch
                .iter()
                .map(|path| match backend.delete_one(path) {
                    Ok(()) => BatchItem::ok(path.clone()),
                    Err(err) => BatchItem::failed(err),
                })
                .collect()
        })
        .await;

        outcome.unwrap_or_else(|e| {
            let message = format!("delete task failed: {}", e);
            paths
                .iter()
                .map(|path| BatchItem::failed(TransferError::failed(path.clone(), message.clone())))
                .collect()
        })
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Local
    }

    fn display_path(&self, path: &str) -> String {
        self.full_path(path).to_string_lossy().to_string()
    }
}
