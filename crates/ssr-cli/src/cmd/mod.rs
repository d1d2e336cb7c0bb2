pub mod config;
pub mod decode;
pub mod init;
pub mod reconcile;
pub mod registry;
pub mod run;
pub mod scan;
pub mod symbols;

use anyhow::Context;
use ssr_core::config::Config;
use ssr_core::reconcile::ReconcileOutcome;
use ssr_core::store::RedbStore;
use std::path::Path;

/// Open the registry database named by the project config.
pub fn open_store(root: &Path, config: &Config) -> anyhow::Result<RedbStore> {
    let path = config.registry.resolved_path(root);
    RedbStore::open(&path).with_context(|| format!("failed to open registry {}", path.display()))
}

/// Human-readable rendering of one reconcile call.
pub fn print_outcome(namespace: &str, outcome: &ReconcileOutcome) {
    for pair in &outcome.inserted {
        println!("  added:   {} -> {}", pair.encoded, pair.decoded);
    }
    for failure in &outcome.failed {
        println!(
            "  failed:  {} ({}: {})",
            failure.encoded, failure.kind, failure.detail
        );
    }
    println!(
        "{namespace}: {} added, {} already known, {} failed",
        outcome.inserted.len(),
        outcome.skipped.len(),
        outcome.failed.len()
    );
}
