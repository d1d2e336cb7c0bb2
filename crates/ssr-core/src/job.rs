//! One scheduled decode run across every configured source.
//!
//! For each source: fetch a batch, reconcile it into the source's namespace,
//! record the outcome. A source whose batch cannot be fetched is an upstream
//! failure for that source only; the others still run. The finished run is
//! handed to a [`JobReporter`].

use crate::decode::Decoder;
use crate::reconcile::{batch_from_rows, FailureKind, ReconcileOutcome, Reconciler};
use crate::registry::{EncodingPair, EncodingRegistry};
use crate::report::{JobReport, JobReporter};
use crate::source::{BatchQuery, BatchSource};
use crate::store::EncodingStore;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, info_span, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Succeeded,
    /// Every batch was fetched but some items failed to decode or persist.
    PartiallySucceeded,
    /// At least one source's batch could not be obtained.
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::PartiallySucceeded => "PARTIALLY_SUCCEEDED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub source: String,
    pub namespace: String,
    /// Absent when the batch could not be obtained or reconciled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SourceError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceError {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: JobStatus,
    pub sources: Vec<SourceSummary>,
}

impl JobSummary {
    pub fn inserted_count(&self) -> usize {
        self.sources
            .iter()
            .filter_map(|s| s.outcome.as_ref())
            .map(|o| o.inserted.len())
            .sum()
    }

    /// Newly inserted pairs grouped by namespace.
    pub fn inserted_by_namespace(&self) -> BTreeMap<String, Vec<EncodingPair>> {
        let mut map: BTreeMap<String, Vec<EncodingPair>> = BTreeMap::new();
        for s in &self.sources {
            if let Some(outcome) = &s.outcome {
                if !outcome.inserted.is_empty() {
                    map.entry(s.namespace.clone())
                        .or_default()
                        .extend(outcome.inserted.iter().cloned());
                }
            }
        }
        map
    }

    /// Dashboard status line, e.g. `SUCCEEDED - No new encodings`.
    pub fn status_line(&self) -> String {
        let inserted = self.inserted_count();
        if inserted == 0 {
            format!("{} - No new encodings", self.status)
        } else {
            format!("{} - Encodings added: {inserted}", self.status)
        }
    }
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

/// A source to run: the query describing its batch and where to fetch it.
pub struct PlannedSource<'a> {
    pub query: BatchQuery,
    pub source: &'a dyn BatchSource,
}

pub struct JobRunner<'a, S: EncodingStore + ?Sized> {
    pub task_type: String,
    pub name: String,
    pub include_encodings: bool,
    pub decoder: &'a Decoder,
    pub store: &'a S,
    pub reporter: &'a dyn JobReporter,
}

impl<'a, S: EncodingStore + ?Sized> JobRunner<'a, S> {
    pub fn run(&self, plan: &[PlannedSource<'_>]) -> JobSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("job", run_id = %run_id, name = %self.name);
        let _guard = span.enter();

        let started_at = Utc::now();
        info!(sources = plan.len(), "job started");

        let sources: Vec<SourceSummary> = plan.iter().map(|p| self.run_source(p)).collect();

        let status = if sources.iter().any(|s| s.error.is_some()) {
            JobStatus::Failed
        } else if sources
            .iter()
            .filter_map(|s| s.outcome.as_ref())
            .any(|o| !o.is_clean())
        {
            JobStatus::PartiallySucceeded
        } else {
            JobStatus::Succeeded
        };

        let summary = JobSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            status,
            sources,
        };

        if summary.inserted_count() == 0 {
            info!("no new encodings");
        }
        self.send_report(&summary);
        summary
    }

    fn run_source(&self, planned: &PlannedSource<'_>) -> SourceSummary {
        let query = &planned.query;
        let mut summary = SourceSummary {
            source: query.source.clone(),
            namespace: query.namespace.clone(),
            outcome: None,
            error: None,
        };

        let rows = match planned.source.fetch(query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(source = %query.source, error = %e, "could not obtain batch");
                summary.error = Some(SourceError {
                    kind: FailureKind::UpstreamFailure,
                    message: e.to_string(),
                });
                return summary;
            }
        };

        let batch = batch_from_rows(rows);
        if batch.is_empty() {
            info!(source = %query.source, "no data");
            summary.outcome = Some(ReconcileOutcome::default());
            return summary;
        }

        let result = EncodingRegistry::new(self.store, query.namespace.clone())
            .and_then(|registry| Reconciler::new(self.decoder, registry).reconcile(&batch));
        match result {
            Ok(outcome) => summary.outcome = Some(outcome),
            Err(e) => {
                warn!(source = %query.source, error = %e, "could not reconcile batch");
                summary.error = Some(SourceError {
                    kind: FailureKind::PersistenceFailure,
                    message: e.to_string(),
                });
            }
        }
        summary
    }

    fn send_report(&self, summary: &JobSummary) {
        let mut report = JobReport::new(
            &self.task_type,
            &self.name,
            summary.started_at.with_timezone(&Local),
            summary.finished_at.with_timezone(&Local),
            summary.status_line(),
        );
        if self.include_encodings {
            report = report.with_encodings(summary.inserted_by_namespace());
        }
        deliver(self.reporter, &report);
    }
}

/// Report a run that failed before any source could be reconciled, e.g.
/// because the registry could not be opened. Status is `FAILED - <reason>`.
pub fn report_aborted(
    task_type: &str,
    name: &str,
    started_at: DateTime<Utc>,
    reason: &str,
    reporter: &dyn JobReporter,
) -> JobReport {
    warn!(%reason, "job aborted");
    let report = JobReport::new(
        task_type,
        name,
        started_at.with_timezone(&Local),
        Utc::now().with_timezone(&Local),
        format!("{} - {reason}", JobStatus::Failed),
    );
    deliver(reporter, &report);
    report
}

fn deliver(reporter: &dyn JobReporter, report: &JobReport) {
    if let Err(e) = reporter.report(report) {
        warn!(error = %e, "job report not delivered");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::UnknownPolicy;
    use crate::error::{Result, SsrError};
    use crate::store::MemoryStore;
    use std::cell::RefCell;

    struct FixedSource(Vec<Option<String>>);

    impl BatchSource for FixedSource {
        fn fetch(&self, _query: &BatchQuery) -> Result<Vec<Option<String>>> {
            Ok(self.0.clone())
        }
    }

    struct DownSource;

    impl BatchSource for DownSource {
        fn fetch(&self, query: &BatchQuery) -> Result<Vec<Option<String>>> {
            Err(SsrError::Upstream {
                query: query.source.clone(),
                state: "FAILED".into(),
            })
        }
    }

    #[derive(Default)]
    struct CapturingReporter(RefCell<Vec<JobReport>>);

    impl JobReporter for CapturingReporter {
        fn report(&self, report: &JobReport) -> Result<()> {
            self.0.borrow_mut().push(report.clone());
            Ok(())
        }
    }

    struct RefusingReporter;

    impl JobReporter for RefusingReporter {
        fn report(&self, _report: &JobReport) -> Result<()> {
            Err(SsrError::Report("dashboard down".into()))
        }
    }

    fn rows(codes: &[&str]) -> Vec<Option<String>> {
        codes.iter().map(|c| Some(c.to_string())).collect()
    }

    fn query(source: &str, namespace: &str) -> BatchQuery {
        BatchQuery {
            source: source.into(),
            namespace: namespace.into(),
            lookback_hours: None,
        }
    }

    fn runner<'a>(
        decoder: &'a Decoder,
        store: &'a MemoryStore,
        reporter: &'a dyn JobReporter,
    ) -> JobRunner<'a, MemoryStore> {
        JobRunner {
            task_type: "ETL".into(),
            name: "MLB - Decode Suspension Reasons".into(),
            include_encodings: true,
            decoder,
            store,
            reporter,
        }
    }

    #[test]
    fn reconciles_each_source_into_its_namespace() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let mlb = FixedSource(rows(&["A", "AB", "A"]));
        let ncaab = FixedSource(vec![Some("K".into()), None]);

        let summary = runner(&decoder, &store, &reporter).run(&[
            PlannedSource {
                query: query("baseball_stagingus", "mlb_sit_views"),
                source: &mlb,
            },
            PlannedSource {
                query: query("ncaab_stagingus", "ncaab_sit_views"),
                source: &ncaab,
            },
        ]);

        assert_eq!(summary.status, JobStatus::Succeeded);
        assert_eq!(summary.inserted_count(), 3);
        assert_eq!(store.keys("mlb_sit_views").unwrap().len(), 2);
        assert_eq!(
            store.get("ncaab_sit_views", "K").unwrap().as_deref(),
            Some("SettlementCorrection")
        );

        let reports = reporter.0.borrow();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, "SUCCEEDED - Encodings added: 3");
        assert_eq!(reports[0].encodings_added.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn repeat_run_reports_no_new_encodings() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let src = FixedSource(rows(&["A", "B"]));
        let plan = [PlannedSource {
            query: query("baseball_stagingus", "mlb_sit_views"),
            source: &src,
        }];

        runner(&decoder, &store, &reporter).run(&plan);
        let second = runner(&decoder, &store, &reporter).run(&plan);

        assert_eq!(second.inserted_count(), 0);
        assert_eq!(second.status_line(), "SUCCEEDED - No new encodings");
    }

    #[test]
    fn upstream_failure_fails_job_but_other_sources_run() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let good = FixedSource(rows(&["C"]));

        let summary = runner(&decoder, &store, &reporter).run(&[
            PlannedSource {
                query: query("baseball_stagingus", "mlb_sit_views"),
                source: &DownSource,
            },
            PlannedSource {
                query: query("ncaab_stagingus", "ncaab_sit_views"),
                source: &good,
            },
        ]);

        assert_eq!(summary.status, JobStatus::Failed);
        let err = summary.sources[0].error.as_ref().unwrap();
        assert_eq!(err.kind, FailureKind::UpstreamFailure);
        assert!(store.get("ncaab_sit_views", "C").unwrap().is_some());
    }

    #[test]
    fn malformed_items_make_partial_success() {
        let decoder = Decoder::default().with_policy(UnknownPolicy::Reject);
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let src = FixedSource(rows(&["A", "AZ"]));

        let summary = runner(&decoder, &store, &reporter).run(&[PlannedSource {
            query: query("baseball_stagingus", "mlb_sit_views"),
            source: &src,
        }]);

        assert_eq!(summary.status, JobStatus::PartiallySucceeded);
        assert_eq!(summary.inserted_count(), 1);
    }

    #[test]
    fn empty_batch_is_no_data_success() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let src = FixedSource(vec![None, Some(String::new())]);

        let summary = runner(&decoder, &store, &reporter).run(&[PlannedSource {
            query: query("baseball_stagingus", "mlb_sit_views"),
            source: &src,
        }]);

        assert_eq!(summary.status, JobStatus::Succeeded);
        assert!(summary.sources[0].outcome.as_ref().unwrap().is_noop());
    }

    #[test]
    fn invalid_namespace_is_source_failure() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let reporter = CapturingReporter::default();
        let src = FixedSource(rows(&["A"]));

        let summary = runner(&decoder, &store, &reporter).run(&[PlannedSource {
            query: query("baseball_stagingus", "Not Valid"),
            source: &src,
        }]);

        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(
            summary.sources[0].error.as_ref().unwrap().kind,
            FailureKind::PersistenceFailure
        );
    }

    #[test]
    fn aborted_run_is_reported_as_failed() {
        let reporter = CapturingReporter::default();
        let report = report_aborted(
            "ETL",
            "MLB - Decode Suspension Reasons",
            Utc::now(),
            "registry busy",
            &reporter,
        );
        assert_eq!(report.status, "FAILED - registry busy");
        assert_eq!(reporter.0.borrow().as_slice(), [report]);

        // an undeliverable report is logged, not raised
        report_aborted("ETL", "n", Utc::now(), "x", &RefusingReporter);
    }

    #[test]
    fn reporter_failure_does_not_fail_job() {
        let decoder = Decoder::default();
        let store = MemoryStore::new();
        let src = FixedSource(rows(&["A"]));

        let summary = runner(&decoder, &store, &RefusingReporter).run(&[PlannedSource {
            query: query("baseball_stagingus", "mlb_sit_views"),
            source: &src,
        }]);
        assert_eq!(summary.status, JobStatus::Succeeded);
    }
}
