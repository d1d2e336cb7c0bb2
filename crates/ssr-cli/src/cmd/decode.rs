use crate::output::{print_json, print_table};
use anyhow::Context;
use ssr_core::config::Config;
use ssr_core::decode::UnknownPolicy;
use ssr_core::SsrError;
use std::path::Path;

pub fn run(root: &Path, codes: &[String], strict: bool, json: bool) -> anyhow::Result<()> {
    // Decoding works without `ssr init`; fall back to the defaults.
    let config = match Config::load(root) {
        Ok(config) => config,
        Err(SsrError::NotInitialized) => Config::default(),
        Err(e) => return Err(e).context("failed to load config"),
    };
    let mut decoder = config.decode.decoder();
    if strict {
        decoder = decoder.with_policy(UnknownPolicy::Reject);
    }

    let mut results = Vec::with_capacity(codes.len());
    for code in codes {
        let decoded = decoder
            .decode(Some(code.as_str()))
            .with_context(|| format!("cannot decode '{code}'"))?;
        results.push((code, decoded));
    }

    if json {
        let value: Vec<serde_json::Value> = results
            .iter()
            .map(|(code, decoded)| {
                let labels: Vec<&str> = decoded
                    .as_ref()
                    .map(|d| d.labels().collect())
                    .unwrap_or_default();
                serde_json::json!({
                    "encoded": code,
                    "decoded": decoded.as_ref().map(|d| d.text.as_str()),
                    "labels": labels,
                    "unmapped": decoded.as_ref().map(|d| d.unmapped.clone()).unwrap_or_default(),
                })
            })
            .collect();
        print_json(&value)?;
        return Ok(());
    }

    let rows = results
        .iter()
        .map(|(code, decoded)| match decoded {
            Some(d) => vec![
                code.to_string(),
                d.text.clone(),
                d.unmapped.iter().collect::<String>(),
            ],
            None => vec![code.to_string(), "(no data)".to_string(), String::new()],
        })
        .collect();
    print_table(&["ENCODED", "DECODED", "UNMAPPED"], rows);
    Ok(())
}
