//! Merge a batch of observed encoded strings into the registry.
//!
//! A batch is a set: blanks are dropped, duplicates collapse, and anything the
//! registry already knows is skipped before any decoding happens. Partial
//! failures never abort the batch; they come back tagged per encoded string.

use crate::decode::Decoder;
use crate::error::{Result, SsrError};
use crate::registry::{EncodingPair, EncodingRegistry};
use crate::store::EncodingStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// FailureKind / Failure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoData,
    MalformedInput,
    PersistenceFailure,
    UpstreamFailure,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NoData => "no_data",
            FailureKind::MalformedInput => "malformed_input",
            FailureKind::PersistenceFailure => "persistence_failure",
            FailureKind::UpstreamFailure => "upstream_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Failure {
    pub encoded: String,
    pub kind: FailureKind,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// ReconcileOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Pairs written by this call.
    pub inserted: BTreeSet<EncodingPair>,
    /// Encoded strings that were already stored, including ones another
    /// writer stored between our read and our write.
    pub skipped: BTreeSet<String>,
    /// Decode and persistence failures, ordered by encoded string.
    pub failed: Vec<Failure>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Nothing new was written and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Batch normalisation
// ---------------------------------------------------------------------------

/// Collapse raw upstream rows into a batch: nulls and blanks are no data.
pub fn batch_from_rows<I>(rows: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    rows.into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'a, S: EncodingStore + ?Sized> {
    decoder: &'a Decoder,
    registry: EncodingRegistry<'a, S>,
}

impl<'a, S: EncodingStore + ?Sized> Reconciler<'a, S> {
    pub fn new(decoder: &'a Decoder, registry: EncodingRegistry<'a, S>) -> Self {
        Self { decoder, registry }
    }

    pub fn registry(&self) -> &EncodingRegistry<'a, S> {
        &self.registry
    }

    /// Decode and store every encoded string in `batch` the registry has not
    /// seen yet.
    ///
    /// Errors only when the registry cannot be read at all.
    pub fn reconcile<I>(&self, batch: I) -> Result<ReconcileOutcome>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let batch: BTreeSet<String> = batch
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .filter(|s| !s.trim().is_empty())
            .collect();

        let mut outcome = ReconcileOutcome::default();
        if batch.is_empty() {
            debug!(namespace = %self.registry.namespace(), "empty batch");
            return Ok(outcome);
        }

        let known = self.registry.get_known()?;
        let (seen, new): (BTreeSet<String>, BTreeSet<String>) =
            batch.into_iter().partition(|e| known.contains(e));
        outcome.skipped = seen;

        if new.is_empty() {
            debug!(
                namespace = %self.registry.namespace(),
                skipped = outcome.skipped.len(),
                "no new encodings"
            );
            return Ok(outcome);
        }

        let mut pairs = Vec::with_capacity(new.len());
        for encoded in new {
            match self.decoder.decode(Some(encoded.as_str())) {
                Ok(Some(decoded)) => {
                    if !decoded.unmapped.is_empty() {
                        warn!(
                            encoded = %encoded,
                            unmapped = ?decoded.unmapped,
                            "unmapped suspension symbols substituted"
                        );
                    }
                    pairs.push(EncodingPair::new(encoded, decoded.text));
                }
                Ok(None) => {}
                Err(SsrError::MalformedInput { symbols, .. }) => {
                    warn!(encoded = %encoded, unmapped = ?symbols, "rejected encoding");
                    outcome.failed.push(Failure {
                        encoded,
                        kind: FailureKind::MalformedInput,
                        detail: format!("unmapped symbols {symbols:?}"),
                    });
                }
                Err(e) => {
                    outcome.failed.push(Failure {
                        encoded,
                        kind: FailureKind::MalformedInput,
                        detail: e.to_string(),
                    });
                }
            }
        }

        let report = self.registry.insert_many(pairs);
        if !report.is_complete() {
            warn!(
                namespace = %self.registry.namespace(),
                failed = report.failed.len(),
                "some encodings were not stored"
            );
        }
        outcome.inserted.extend(report.inserted);
        outcome
            .skipped
            .extend(report.already_present.into_iter().map(|p| p.encoded));
        outcome
            .failed
            .extend(report.failed.into_iter().map(|(pair, detail)| Failure {
                encoded: pair.encoded,
                kind: FailureKind::PersistenceFailure,
                detail,
            }));
        outcome.failed.sort();

        info!(
            namespace = %self.registry.namespace(),
            inserted = outcome.inserted.len(),
            skipped = outcome.skipped.len(),
            failed = outcome.failed.len(),
            "reconciled batch"
        );
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
