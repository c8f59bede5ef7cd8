//! Object storage for media handed out by higher layers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `data` under `name` and returns a location the caller can hand out.
    async fn put(&self, name: &str, data: &[u8], content_type: &str) -> Result<String>;

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// Stores objects as files under a base directory.
pub struct LocalFileStorage {
    base_path: PathBuf,
}

impl LocalFileStorage {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn sanitize_filename(key: &str) -> String {
        key.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-', "_")
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.base_path.join(Self::sanitize_filename(name))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn put(&self, name: &str, data: &[u8], _content_type: &str) -> Result<String> {
        let path = self.path_for(name);
        fs::write(&path, data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.path_for(name)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
