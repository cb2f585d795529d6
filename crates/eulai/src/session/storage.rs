//! Sandbox-private storage for model payloads

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

use super::protocol::PathConfig;

/// Virtual directory model files live under
pub const MODELS_DIR: &str = "models";

#[derive(Debug)]
struct Allocation {
    path: PathBuf,
    size: u64,
}

/// File storage owned exclusively by the sandbox worker
#[derive(Debug)]
pub struct SandboxStorage {
    root: PathBuf,
    files: HashMap<String, Allocation>,
    // Removed on drop when the storage is temporary
    _temp: Option<TempDir>,
}

impl SandboxStorage {
    /// Open storage under the configured root, or a fresh temporary directory
    pub async fn open(paths: &PathConfig) -> Result<Self> {
        let (root, temp) = match &paths.storage_root {
            Some(root) => (root.clone(), None),
            None => {
                let temp = tempfile::Builder::new().prefix("eulai-sandbox-").tempdir()?;
                (temp.path().to_path_buf(), Some(temp))
            }
        };

        tokio::fs::create_dir_all(root.join(MODELS_DIR)).await?;
        tracing::debug!("Sandbox storage at {}", root.display());

        Ok(Self {
            root,
            files: HashMap::new(),
            _temp: temp,
        })
    }

    /// Storage root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `models/<name>` with the given size
    pub async fn alloc(&mut self, name: &str, size: u64) -> Result<()> {
        validate_name(name)?;

        let path = self.root.join(MODELS_DIR).join(name);
        let file = tokio::fs::File::create(&path).await?;
        file.set_len(size).await?;

        tracing::debug!("Allocated {} ({} bytes)", path.display(), size);
        self.files.insert(name.to_string(), Allocation { path, size });
        Ok(())
    }

    /// Write a frame at `offset` into an allocated file
    pub async fn write(&self, name: &str, data: &[u8], offset: u64) -> Result<()> {
        let allocation = self
            .files
            .get(name)
            .ok_or_else(|| Error::internal(format!("fs.write to unallocated file '{}'", name)))?;

        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > allocation.size) {
            return Err(Error::internal(format!(
                "fs.write of {} bytes at offset {} exceeds allocated size {} of '{}'",
                data.len(),
                offset,
                allocation.size,
                name
            )));
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&allocation.path)
            .await?;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Resolve a `/models/<name>` load path to the backing file
    pub fn resolve(&self, model_path: &str) -> Result<PathBuf> {
        let name = model_path
            .strip_prefix('/')
            .unwrap_or(model_path)
            .strip_prefix(MODELS_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| Error::Config(format!("model path '{}' is outside /{}", model_path, MODELS_DIR)))?;

        self.files
            .get(name)
            .map(|allocation| allocation.path.clone())
            .ok_or_else(|| Error::internal(format!("model '{}' was never allocated", model_path)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(Error::Config(format!("invalid model file name '{}'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_alloc_write_resolve() {
        let mut storage = SandboxStorage::open(&PathConfig::default()).await.unwrap();
        storage.alloc("model.gguf", 6).await.unwrap();
        storage.write("model.gguf", b"abc", 0).await.unwrap();
        storage.write("model.gguf", b"def", 3).await.unwrap();

        let path = storage.resolve("/models/model.gguf").unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdef");
        assert!(path.starts_with(storage.root()));
    }

    #[tokio::test]
    async fn test_write_bounds_checked() {
        let mut storage = SandboxStorage::open(&PathConfig::default()).await.unwrap();
        storage.alloc("m", 4).await.unwrap();

        tokio_test::assert_err!(storage.write("m", b"abcde", 0).await);
        tokio_test::assert_err!(storage.write("m", b"ab", 3).await);
        tokio_test::assert_err!(storage.write("other", b"ab", 0).await);
        tokio_test::assert_ok!(storage.write("m", b"abcd", 0).await);
    }

    #[tokio::test]
    async fn test_rejects_escaping_names() {
        let mut storage = SandboxStorage::open(&PathConfig::default()).await.unwrap();

        assert!(storage.alloc("../evil", 1).await.is_err());
        assert!(storage.alloc("", 1).await.is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("/models/missing").is_err());
    }

    #[tokio::test]
    async fn test_configured_root() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathConfig {
            storage_root: Some(dir.path().to_path_buf()),
        };
        let mut storage = SandboxStorage::open(&paths).await.unwrap();
        storage.alloc("m", 0).await.unwrap();

        assert!(dir.path().join("models").join("m").exists());
    }
}
