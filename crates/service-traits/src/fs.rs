use std::path::Path;

use async_trait::async_trait;

#[async_trait]
pub trait Filesystem: Send + Sync {
    async fn mkdir(&self, path: &Path) -> anyhow::Result<()>;
    async fn write_file(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()>;
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>>;
    async fn rm(&self, path: &Path) -> anyhow::Result<()>;
}

/// Thin wrapper over `tokio::fs`, the default non-test implementation.
pub struct TokioFilesystem;

#[async_trait]
impl Filesystem for TokioFilesystem {
    async fn mkdir(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await.map_err(|e| anyhow::anyhow!("mkdir {}: {e}", path.display()))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(path, contents).await.map_err(|e| anyhow::anyhow!("write {}: {e}", path.display()))
    }

    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))
    }

    async fn rm(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = tokio::fs::metadata(path).await;
        match metadata {
            Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(path).await.map_err(|e| anyhow::anyhow!("rm -r {}: {e}", path.display())),
            Ok(_) => tokio::fs::remove_file(path).await.map_err(|e| anyhow::anyhow!("rm {}: {e}", path.display())),
            Err(_) => Ok(()),
        }
    }
}

pub struct NoopFilesystem;

#[async_trait]
impl Filesystem for NoopFilesystem {
    async fn mkdir(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
    async fn write_file(&self, _path: &Path, _contents: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn read_file(&self, _path: &Path) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("filesystem not configured")
    }
    async fn rm(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokio_filesystem_round_trips_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFilesystem;
        let path = dir.path().join("nested").join("file.txt");
        fs.write_file(&path, b"hello").await.unwrap();
        assert_eq!(fs.read_file(&path).await.unwrap(), b"hello");
        fs.rm(&path).await.unwrap();
        assert!(fs.read_file(&path).await.is_err());
    }
}
