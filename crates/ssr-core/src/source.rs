//! Where batches of encoded strings come from.
//!
//! The warehouse is modelled as a [`QueryService`]: submit a structured
//! [`BatchQuery`], poll its [`QueryState`], then read single-column rows.
//! [`poll_batch`] is the blocking adapter between that and a plain
//! [`BatchSource`]. [`FileSource`] serves batches from local fixtures.

use crate::error::{Result, SsrError};
use crate::extract::{self, ExtractOptions};
use crate::io;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;

// ---------------------------------------------------------------------------
// BatchQuery
// ---------------------------------------------------------------------------

/// Structured description of a batch to fetch. Services translate this into
/// their own query language; callers never hand over raw query text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchQuery {
    /// Configured source name (an upstream schema or fixture set).
    pub source: String,
    /// Encoding table the batch reconciles into.
    pub namespace: String,
    /// Only consider data from the last N hours. Fixture directories skip
    /// files modified before the cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_hours: Option<u32>,
}

// ---------------------------------------------------------------------------
// QueryState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// QueryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryId(pub String);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An asynchronous query executor (e.g. a cloud warehouse).
pub trait QueryService {
    fn submit(&self, query: &BatchQuery) -> Result<QueryId>;
    fn status(&self, id: &QueryId) -> Result<QueryState>;
    /// Single-column result rows; `None` for SQL nulls.
    fn results(&self, id: &QueryId) -> Result<Vec<Option<String>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Submit `query` and block until it reaches a terminal state.
///
/// `Failed`/`Cancelled` and running past `opts.timeout` are upstream failures.
pub fn poll_batch<Q>(service: &Q, query: &BatchQuery, opts: PollOptions) -> Result<Vec<Option<String>>>
where
    Q: QueryService + ?Sized,
{
    let id = service.submit(query)?;
    let deadline = Instant::now() + opts.timeout;

    loop {
        let state = service.status(&id)?;
        match state {
            QueryState::Succeeded => return service.results(&id),
            QueryState::Failed | QueryState::Cancelled => {
                return Err(SsrError::Upstream {
                    query: id.to_string(),
                    state: state.to_string(),
                })
            }
            QueryState::Queued | QueryState::Running => {
                if Instant::now() >= deadline {
                    return Err(SsrError::UpstreamTimeout {
                        query: id.to_string(),
                        timeout: opts.timeout,
                    });
                }
                debug!(query = %id, state = %state, "waiting for query");
                std::thread::sleep(opts.interval);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// BatchSource
// ---------------------------------------------------------------------------

pub trait BatchSource {
    /// Raw rows for `query`; nulls and blanks are left for the caller to drop.
    fn fetch(&self, query: &BatchQuery) -> Result<Vec<Option<String>>>;
}

/// A [`QueryService`] driven to completion on every fetch.
pub struct QuerySource<Q> {
    service: Q,
    poll: PollOptions,
}

impl<Q: QueryService> QuerySource<Q> {
    pub fn new(service: Q, poll: PollOptions) -> Self {
        Self { service, poll }
    }
}

impl<Q: QueryService> BatchSource for QuerySource<Q> {
    fn fetch(&self, query: &BatchQuery) -> Result<Vec<Option<String>>> {
        poll_batch(&self.service, query, self.poll)
    }
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// Batches from local files.
///
/// - a directory: every `*.json` fixture inside it (not recursive)
/// - a `.json` file: that fixture
/// - anything else: one encoded string per line
pub struct FileSource {
    path: PathBuf,
    extract: ExtractOptions,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extract: ExtractOptions::default(),
        }
    }

    pub fn with_extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fixture files this source reads, sorted by name.
    pub fn fixture_files(&self) -> Result<Vec<PathBuf>> {
        if !self.path.is_dir() {
            return Ok(vec![self.path.clone()]);
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.is_file() && is_json(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<Option<String>>> {
        if is_json(path) {
            let doc = extract::read_fixture(path)?;
            let codes = extract::extract_codes(extract::fixture_body(&doc), &self.extract);
            Ok(codes.into_iter().map(Some).collect())
        } else {
            Ok(io::read_text(path)?
                .lines()
                .map(|l| Some(l.trim().to_string()))
                .collect())
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl BatchSource for FileSource {
    fn fetch(&self, query: &BatchQuery) -> Result<Vec<Option<String>>> {
        if !self.path.exists() {
            return Err(SsrError::SourceNotFound(format!(
                "{}: {}",
                query.source,
                self.path.display()
            )));
        }
        let cutoff = query
            .lookback_hours
            .filter(|_| self.path.is_dir())
            .and_then(|h| {
                SystemTime::now().checked_sub(Duration::from_secs(u64::from(h) * 3600))
            });

        let mut rows = Vec::new();
        for file in self.fixture_files()? {
            if let Some(cutoff) = cutoff {
                if std::fs::metadata(&file)?.modified()? < cutoff {
                    debug!(source = %query.source, file = %file.display(), "outside lookback");
                    continue;
                }
            }
            debug!(source = %query.source, file = %file.display(), "reading fixture");
            rows.extend(self.read_file(&file)?);
        }
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
