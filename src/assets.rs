//! Recorded terminal sessions served from a root directory.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::logging::log_asset_failure;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("recording not found")]
    NotFound,
    #[error("path escapes the recordings root")]
    Forbidden,
    #[error("failed to read recording: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    pub fn status(&self) -> u16 {
        match self {
            AssetError::NotFound => 404,
            AssetError::Forbidden => 403,
            AssetError::Io(_) => 500,
        }
    }

    /// Body sent to the client. I/O causes stay in the log.
    pub fn public_message(&self) -> &'static str {
        match self {
            AssetError::NotFound => "Recording not found",
            AssetError::Forbidden => "Forbidden",
            AssetError::Io(_) => "Internal Server Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("cast") => "text/plain; charset=utf-8",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Relative path for a request, resolved lexically. Segments are trimmed
/// and empty ones dropped; `..` that would climb above the root is
/// forbidden.
pub fn safe_relative_path(request: &str) -> Result<PathBuf, AssetError> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in request.split('/').map(str::trim).filter(|s| !s.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(AssetError::Forbidden);
                }
            }
            other => {
                // a segment must stay a plain name (no separators, drive prefixes)
                let mut components = Path::new(other).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => parts.push(other),
                    _ => return Err(AssetError::Forbidden),
                }
            }
        }
    }
    if parts.is_empty() {
        return Err(AssetError::NotFound);
    }
    Ok(parts.into_iter().collect())
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn fetch(&self, request_path: &str) -> Result<Asset, AssetError>;
}

/// Recordings on the local filesystem under `root`.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, AssetError> {
        let absolute = self.root.join(safe_relative_path(request_path)?);
        if !absolute.starts_with(&self.root) {
            return Err(AssetError::Forbidden);
        }
        Ok(absolute)
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn fetch(&self, request_path: &str) -> Result<Asset, AssetError> {
        let path = self.resolve(request_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Asset {
                content_type: content_type_for(&path),
                bytes,
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AssetError::NotFound),
            Err(err) => {
                log_asset_failure(&path.display().to_string(), &err.to_string());
                Err(AssetError::Io(err))
            }
        }
    }
}
