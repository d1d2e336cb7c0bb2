//! Job status reports for the data-engineering job dashboard.
//!
//! The dashboard accepts one flat JSON document per run. Delivery is
//! fire-and-forget from the job's point of view: the job logs a failed
//! delivery and carries on.

use crate::error::{Result, SsrError};
use crate::registry::EncodingPair;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::info;

pub const DATE_FORMAT: &str = "%d/%m/%Y - %H:%M:%S";

// ---------------------------------------------------------------------------
// JobReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobReport {
    #[serde(rename = "Type")]
    pub task_type: String,
    pub name: String,
    #[serde(rename = "StartDate")]
    pub start: String,
    #[serde(rename = "EndDate")]
    pub end: String,
    pub execution_time: String,
    pub status: String,
    /// New `[encoded, decoded]` pairs per namespace, when the job is
    /// configured to include them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encodings_added: Option<BTreeMap<String, Vec<(String, String)>>>,
}

impl JobReport {
    /// Dates are written as wall-clock time in the timezone of `start`; the
    /// job passes local time.
    pub fn new<Tz>(
        task_type: impl Into<String>,
        name: impl Into<String>,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        status: impl Into<String>,
    ) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let elapsed = end
            .clone()
            .signed_duration_since(start.clone())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            task_type: task_type.into(),
            name: name.into(),
            start: start.format(DATE_FORMAT).to_string(),
            end: end.format(DATE_FORMAT).to_string(),
            execution_time: seconds_label(elapsed),
            status: status.into(),
            encodings_added: None,
        }
    }

    pub fn with_encodings(mut self, encodings: BTreeMap<String, Vec<EncodingPair>>) -> Self {
        let added = encodings
            .into_iter()
            .map(|(namespace, pairs)| {
                let pairs = pairs.into_iter().map(|p| (p.encoded, p.decoded)).collect();
                (namespace, pairs)
            })
            .collect();
        self.encodings_added = Some(added);
        self
    }
}

/// Seconds, always with a decimal point: `3.0s`, `2.5s`.
fn seconds_label(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{secs:.1}s")
    } else {
        format!("{secs}s")
    }
}

// ---------------------------------------------------------------------------
// Reporters
// ---------------------------------------------------------------------------

pub trait JobReporter {
    fn report(&self, report: &JobReport) -> Result<()>;
}

/// Writes the report to the log instead of sending it anywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl JobReporter for LogReporter {
    fn report(&self, report: &JobReport) -> Result<()> {
        info!(
            name = %report.name,
            status = %report.status,
            execution_time = %report.execution_time,
            "job finished"
        );
        Ok(())
    }
}

/// POSTs the report as JSON to a dashboard endpoint.
pub struct WebhookReporter {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl WebhookReporter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SsrError::Report(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

impl JobReporter for WebhookReporter {
    fn report(&self, report: &JobReport) -> Result<()> {
        self.client
            .post(&self.endpoint)
            .json(report)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SsrError::Report(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
