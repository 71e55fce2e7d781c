//! Identifier derivation (spec.md §6 "Identifier formats").

use std::path::Path;

use sha2::{Digest, Sha256};

/// `<sanitized-basename>-<8 lowercase hex>`, where the hex is the leading 4
/// bytes of SHA-256 over the canonicalized absolute path, POSIX separators,
/// collapsed slashes, lowercased on case-insensitive hosts.
pub fn derive_project_id(path: &Path) -> anyhow::Result<String> {
    let canonical = path.canonicalize().map_err(|e| anyhow::anyhow!("cannot canonicalize {}: {e}", path.display()))?;
    let normalized = normalize_for_hash(&canonical);

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    let hex = digest[..4].iter().map(|b| format!("{b:02x}")).collect::<String>();

    let basename = canonical.file_name().and_then(|s| s.to_str()).unwrap_or("project");
    Ok(format!("{}-{hex}", sanitize_basename(basename)))
}

/// The basename of a worktree directory is its workspace name verbatim.
pub fn workspace_name_from_path(path: &Path) -> anyhow::Result<String> {
    path.file_name().and_then(|s| s.to_str()).map(str::to_string).ok_or_else(|| anyhow::anyhow!("path has no basename: {}", path.display()))
}

fn normalize_for_hash(path: &Path) -> String {
    let posix = path.to_string_lossy().replace('\\', "/");
    let collapsed = collapse_slashes(&posix);
    if cfg!(target_os = "windows") || cfg!(target_os = "macos") {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_slash = false;
    for ch in s.chars() {
        if ch == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(ch);
    }
    out
}

fn sanitize_basename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c.to_ascii_lowercase() } else { '-' })
        .collect();
    if sanitized.is_empty() { "project".to_string() } else { sanitized }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_derives_the_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let a = derive_project_id(dir.path()).unwrap();
        let b = derive_project_id(dir.path()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_derive_different_ids() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_ne!(derive_project_id(a.path()).unwrap(), derive_project_id(b.path()).unwrap());
    }

    #[test]
    fn id_carries_the_sanitized_basename_as_a_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("My Cool Project!!");
        std::fs::create_dir(&project_dir).unwrap();
        let id = derive_project_id(&project_dir).unwrap();
        assert!(id.starts_with("my-cool-project---"), "id was {id}");
    }

    #[test]
    fn workspace_name_is_the_worktree_basename() {
        let name = workspace_name_from_path(Path::new("/repo/.loom-worktrees/feature-x")).unwrap();
        assert_eq!(name, "feature-x");
    }
}
