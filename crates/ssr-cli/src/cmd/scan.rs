use crate::output::print_json;
use anyhow::Context;
use ssr_core::config::Config;
use ssr_core::extract::{self, ExtractOptions};
use ssr_core::io::{atomic_write, ensure_dir};
use ssr_core::reconcile::{batch_from_rows, Reconciler};
use ssr_core::registry::EncodingRegistry;
use ssr_core::source::{BatchQuery, BatchSource, FileSource};
use std::path::Path;

pub fn run(
    root: &Path,
    path: &Path,
    namespace: &str,
    annotate: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let store = super::open_store(root, &config)?;
    let decoder = config.decode.decoder();

    let source = FileSource::new(path);
    let query = BatchQuery {
        source: path.display().to_string(),
        namespace: namespace.to_string(),
        lookback_hours: None,
    };
    let rows = source.fetch(&query)?;
    let batch = batch_from_rows(rows);

    let registry = EncodingRegistry::new(&store, namespace)?;
    let reconciler = Reconciler::new(&decoder, registry);
    let outcome = reconciler
        .reconcile(&batch)
        .context("failed to reconcile batch")?;

    let mut annotated = Vec::new();
    if let Some(out_dir) = annotate {
        ensure_dir(out_dir)?;
        let opts = ExtractOptions::default();
        let registry = reconciler.registry();
        for file in source.fixture_files()? {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            if !file
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("json"))
            {
                continue;
            }
            let mut doc = extract::read_fixture(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            // Lookups that fail are left undecoded rather than aborting the scan.
            let written = extract::annotate(&mut doc, &opts, |code| {
                registry.get(code).ok().flatten()
            });
            let target = out_dir.join(file_name);
            let data = serde_json::to_string_pretty(&doc)?;
            atomic_write(&target, data.as_bytes())
                .with_context(|| format!("failed to write {}", target.display()))?;
            annotated.push((target, written));
        }
    }

    if json {
        let files: Vec<serde_json::Value> = annotated
            .iter()
            .map(|(path, written)| {
                serde_json::json!({ "path": path.display().to_string(), "decoded_fields": written })
            })
            .collect();
        let value = serde_json::json!({
            "namespace": namespace,
            "batch_size": batch.len(),
            "outcome": outcome,
            "annotated": files,
        });
        print_json(&value)?;
        return Ok(());
    }

    super::print_outcome(namespace, &outcome);
    for (path, written) in &annotated {
        println!("annotated: {} ({written} fields)", path.display());
    }
    Ok(())
}
