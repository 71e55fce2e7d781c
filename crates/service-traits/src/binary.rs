use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub success: bool,
    pub needs_download: bool,
    pub missing_extensions: Vec<String>,
    pub outdated_extensions: Vec<String>,
}

/// Reports progress in `0.0..=1.0`. Callers are responsible for throttling
/// — the setup operation only forwards a call onward every 100ms (spec.md §4.7).
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

#[async_trait]
pub trait BinaryExtensionManager: Send + Sync {
    async fn preflight(&self) -> anyhow::Result<PreflightReport>;
    async fn download_binary(&self, on_progress: ProgressCallback) -> anyhow::Result<()>;
    async fn install(&self, extensions: Vec<String>, on_progress: ProgressCallback) -> anyhow::Result<()>;
}

pub struct NoopBinaryExtensionManager;

#[async_trait]
impl BinaryExtensionManager for NoopBinaryExtensionManager {
    async fn preflight(&self) -> anyhow::Result<PreflightReport> {
        Ok(PreflightReport { success: true, needs_download: false, missing_extensions: Vec::new(), outdated_extensions: Vec::new() })
    }

    async fn download_binary(&self, _on_progress: ProgressCallback) -> anyhow::Result<()> {
        Ok(())
    }

    async fn install(&self, _extensions: Vec<String>, _on_progress: ProgressCallback) -> anyhow::Result<()> {
        Ok(())
    }
}
