use anyhow::Context;
use ssr_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing ssr in: {}", root.display());

    let dir = paths::ssr_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 1. Write config.yaml if missing
    let config_path = paths::config_path(root);
    if !config_path.exists() {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }

    // 2. Create the registry database
    let config = Config::load(root).context("failed to load config")?;
    let registry_path = config.registry.resolved_path(root);
    let existed = registry_path.exists();
    super::open_store(root, &config)?;
    if existed {
        println!("  exists:  {}", registry_path.display());
    } else {
        println!("  created: {}", registry_path.display());
    }

    Ok(())
}
