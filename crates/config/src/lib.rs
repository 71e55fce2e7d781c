//! XDG-style config/data directory resolution and layered TOML config for
//! dispatcher tuning: idempotency rules, deletion retry cooldowns, and the
//! setup operation's binary manifest.

mod loader;
mod schema;

pub use loader::{config_dir, data_dir, discover_and_load, find_or_default_config_path, load_config, save_config};
pub use schema::{BinaryManifestEntry, DeletionConfig, IdempotencyConfig, LoomConfig, SetupConfig};
