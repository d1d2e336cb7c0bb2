use crate::output::print_json;
use anyhow::Context;
use ssr_core::config::Config;
use ssr_core::reconcile::Reconciler;
use ssr_core::registry::EncodingRegistry;
use std::io::BufRead;
use std::path::Path;

pub fn run(root: &Path, namespace: &str, codes: Vec<String>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;

    let codes = if codes.is_empty() {
        read_stdin_codes()?
    } else {
        codes
    };

    let store = super::open_store(root, &config)?;
    let decoder = config.decode.decoder();
    let registry = EncodingRegistry::new(&store, namespace)?;
    let outcome = Reconciler::new(&decoder, registry)
        .reconcile(&codes)
        .context("failed to reconcile batch")?;

    if json {
        let value = serde_json::json!({
            "namespace": namespace,
            "outcome": outcome,
        });
        print_json(&value)?;
    } else {
        super::print_outcome(namespace, &outcome);
    }
    Ok(())
}

fn read_stdin_codes() -> anyhow::Result<Vec<String>> {
    let stdin = std::io::stdin();
    let mut codes = Vec::new();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        codes.push(line.trim().to_string());
    }
    Ok(codes)
}
