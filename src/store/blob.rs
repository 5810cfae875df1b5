//! Blob store seam for submission media.
//!
//! The archive proper only needs two primitives; S3, local disk, or
//! anything else can sit behind them. `save` is an idempotent overwrite.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;

/// Media byte storage keyed by file name.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read a stored file. Fails when the name is unknown.
    async fn read(&self, file_name: &str) -> anyhow::Result<Vec<u8>>;

    /// Store (or overwrite) a file.
    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

/// Directory-backed blob store.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn read(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        Ok(tokio::fs::read(self.root.join(file_name)).await?)
    }

    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(file_name), bytes).await?;
        Ok(())
    }
}

/// In-memory blob store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    files: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently stored, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        self.files
            .get(file_name)
            .map(|b| b.clone())
            .ok_or_else(|| anyhow::anyhow!("blob not found: {file_name}"))
    }

    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.files.insert(file_name.to_string(), bytes.to_vec());
        Ok(())
    }
}
