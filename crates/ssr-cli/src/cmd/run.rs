use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use ssr_core::config::{Config, SourceConfig};
use ssr_core::job::{report_aborted, JobRunner, JobStatus, PlannedSource};
use ssr_core::paths;
use ssr_core::report::{JobReporter, LogReporter, WebhookReporter};
use ssr_core::source::{BatchQuery, FileSource};
use std::path::Path;

pub fn run(root: &Path, only: Option<&str>, json: bool) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let config = Config::load(root).context("failed to load config")?;

    let selected: Vec<&SourceConfig> = match only {
        Some(name) => vec![config.source(name)?],
        None => config.sources.iter().collect(),
    };
    if selected.is_empty() {
        anyhow::bail!("no sources configured in {}", paths::CONFIG_FILE);
    }

    let reporter: Box<dyn JobReporter> = match &config.reporting.endpoint {
        Some(endpoint) => Box::new(
            WebhookReporter::new(endpoint.as_str()).context("failed to build report client")?,
        ),
        None => Box::new(LogReporter),
    };

    // The dashboard still hears about a run that never got going.
    let store = match super::open_store(root, &config) {
        Ok(store) => store,
        Err(e) => {
            report_aborted(
                &config.job.task_type,
                &config.job.name,
                started_at,
                &format!("{e:#}"),
                reporter.as_ref(),
            );
            return Err(e);
        }
    };
    let decoder = config.decode.decoder();

    let file_sources: Vec<FileSource> = selected
        .iter()
        .map(|s| FileSource::new(paths::resolve(root, &s.path)))
        .collect();
    let plan: Vec<PlannedSource<'_>> = selected
        .iter()
        .zip(&file_sources)
        .map(|(s, fs)| PlannedSource {
            query: BatchQuery {
                source: s.name.clone(),
                namespace: s.namespace.clone(),
                lookback_hours: s.lookback_hours,
            },
            source: fs,
        })
        .collect();

    let runner = JobRunner {
        task_type: config.job.task_type.clone(),
        name: config.job.name.clone(),
        include_encodings: config.reporting.include_encodings,
        decoder: &decoder,
        store: &store,
        reporter: reporter.as_ref(),
    };
    let summary = runner.run(&plan);

    if json {
        print_json(&summary)?;
    } else {
        let rows = summary
            .sources
            .iter()
            .map(|s| match (&s.outcome, &s.error) {
                (_, Some(err)) => vec![
                    s.source.clone(),
                    s.namespace.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    format!("{}: {}", err.kind, err.message),
                ],
                (Some(o), None) => vec![
                    s.source.clone(),
                    s.namespace.clone(),
                    o.inserted.len().to_string(),
                    o.skipped.len().to_string(),
                    o.failed.len().to_string(),
                ],
                (None, None) => vec![
                    s.source.clone(),
                    s.namespace.clone(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ],
            })
            .collect();
        print_table(&["SOURCE", "NAMESPACE", "ADDED", "KNOWN", "FAILED"], rows);
        println!("\n{}", summary.status_line());
    }

    if summary.status == JobStatus::Failed {
        anyhow::bail!("job failed: at least one source could not be read");
    }
    Ok(())
}
