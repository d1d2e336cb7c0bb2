use crate::error::{Result, SsrError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SSR_DIR: &str = ".ssr";
pub const CONFIG_FILE: &str = ".ssr/config.yaml";
pub const REGISTRY_FILE: &str = ".ssr/registry.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn ssr_dir(root: &Path) -> PathBuf {
    root.join(SSR_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn registry_path(root: &Path) -> PathBuf {
    root.join(REGISTRY_FILE)
}

/// Resolve a configured path: absolute paths pass through, relative ones are
/// taken from the project root.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

// ---------------------------------------------------------------------------
// Namespace validation
// ---------------------------------------------------------------------------

static NAMESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn namespace_re() -> &'static Regex {
    NAMESPACE_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_\-]*[a-z0-9]$|^[a-z0-9]$").expect("namespace regex is valid")
    })
}

/// Namespaces name independent encoding tables, one per upstream schema
/// (e.g. `mlb_sit_views`).
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() || namespace.len() > 64 || !namespace_re().is_match(namespace) {
        return Err(SsrError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
