use serde::{Deserialize, Serialize};

/// Dispatcher tuning, loaded once at startup and handed to the composition
/// root. Nothing in `loom-dispatch` or `loom-control` reads a config file
/// itself — they're handed already-resolved values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoomConfig {
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub setup: SetupConfig,
}

/// Keys the idempotency interceptor suppresses concurrent dispatch for.
/// Mirrors the shape of a rule in `loom_dispatch::IdempotencyRule` minus the
/// closures, which the composition root attaches once these are loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdempotencyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Intent type tags suppressed while in flight, beyond the built-in
    /// `workspace:delete` / `workspace:create` defaults.
    #[serde(default)]
    pub extra_keyed_intents: Vec<String>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { enabled: true, extra_keyed_intents: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletionConfig {
    /// How long the retry-loop's `detect` stage waits before re-polling for
    /// blockers if the UI never answers `waitForRetryChoice` — a safety net,
    /// not part of the documented retry contract itself.
    #[serde(default = "default_retry_poll_ms")]
    pub retry_poll_interval_ms: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self { retry_poll_interval_ms: default_retry_poll_ms() }
    }
}

fn default_retry_poll_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupConfig {
    #[serde(default = "default_progress_throttle_ms")]
    pub progress_throttle_ms: u64,
    #[serde(default)]
    pub binaries: Vec<BinaryManifestEntry>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self { progress_throttle_ms: default_progress_throttle_ms(), binaries: Vec::new() }
    }
}

fn default_progress_throttle_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryManifestEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_true() -> bool {
    true
}
