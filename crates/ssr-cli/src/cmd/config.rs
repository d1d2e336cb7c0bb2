use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use ssr_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;

    if json {
        print_json(&config)?;
        return Ok(());
    }

    println!("job:       {} ({})", config.job.name, config.job.task_type);
    println!(
        "decode:    unknown={} case_insensitive={}",
        config.decode.unknown_policy, config.decode.case_insensitive
    );
    println!(
        "registry:  {}",
        config.registry.resolved_path(root).display()
    );
    match &config.reporting.endpoint {
        Some(endpoint) => println!("reporting: {endpoint}"),
        None => println!("reporting: log"),
    }

    if config.sources.is_empty() {
        println!("\nNo sources configured.");
        return Ok(());
    }
    println!();
    let rows = config
        .sources
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.namespace.clone(),
                s.path.display().to_string(),
                s.lookback_hours
                    .map(|h| format!("{h}h"))
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["SOURCE", "NAMESPACE", "PATH", "LOOKBACK"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
