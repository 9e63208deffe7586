pub mod base;
pub mod bikeland_html;
pub mod csv_export;
pub mod manual_text;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use thiserror::Error;

use crate::config::AppConfig;
use crate::identity::identity_key;
use crate::models::{Event, Source};
use crate::store;
use crate::utils::{self, StorePaths};

/// Why a single upstream record was left out of a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIssue {
    #[error("row {row}: expected at least {expected} columns, found {found}")]
    ShortRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("block {block}: missing required fields: {}", .missing.join(", "))]
    MissingFields {
        block: usize,
        missing: Vec<&'static str>,
    },
    #[error("{context}: record has no title or date")]
    NoIdentity { context: String },
}

pub type RecordOutcome = Result<Event, ParseIssue>;

pub trait SourceAdapter {
    fn source(&self) -> Source;
    fn store_path(&self) -> &Path;
    /// Reads upstream and normalizes every record it finds.
    fn collect(&self) -> anyhow::Result<Vec<RecordOutcome>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub source: Source,
    pub new: usize,
    pub existing: usize,
    pub skipped: usize,
    pub issues: Vec<String>,
    /// Set when the adapter could not run at all; its store is untouched.
    pub error: Option<String>,
}

impl RefreshReport {
    fn empty(source: Source) -> Self {
        Self {
            source,
            new: 0,
            existing: 0,
            skipped: 0,
            issues: Vec::new(),
            error: None,
        }
    }
}

/// Appends records whose identity key the source's store has not seen yet.
///
/// New records are stamped with the current time; known keys keep their stored
/// record (and timestamp) as is.
pub fn refresh(adapter: &dyn SourceAdapter) -> anyhow::Result<RefreshReport> {
    let source = adapter.source();
    let path = adapter.store_path();
    let existing = store::load_records(path)
        .with_context(|| format!("{source} store is unreadable; refresh skipped"))?;

    let mut seen: HashSet<String> = existing
        .into_iter()
        .filter_map(|record| serde_json::from_value::<Event>(record).ok())
        .filter_map(|event| identity_key(&event))
        .collect();

    let mut report = RefreshReport::empty(source);
    let mut fresh = Vec::new();
    let now = utils::now_local();

    for outcome in adapter.collect()? {
        let mut event = match outcome {
            Ok(event) => event,
            Err(issue) => {
                tracing::warn!("{source}: {issue}");
                report.skipped += 1;
                report.issues.push(issue.to_string());
                continue;
            }
        };
        let Some(key) = identity_key(&event) else {
            let issue = ParseIssue::NoIdentity {
                context: source.to_string(),
            };
            report.skipped += 1;
            report.issues.push(issue.to_string());
            continue;
        };
        if !seen.insert(key.clone()) {
            tracing::debug!("{source}: already stored {key}");
            report.existing += 1;
            continue;
        }
        tracing::info!("{source}: new event {key}");
        event.source = source;
        event.added_timestamp = Some(now);
        fresh.push(event);
    }

    report.new = fresh.len();
    if !fresh.is_empty() {
        store::append_events(path, &fresh)?;
    }
    Ok(report)
}

pub fn refresh_all(adapters: &[Box<dyn SourceAdapter>]) -> Vec<RefreshReport> {
    adapters
        .iter()
        .map(|adapter| match refresh(adapter.as_ref()) {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!("{} refresh failed: {err:#}", adapter.source());
                let mut report = RefreshReport::empty(adapter.source());
                report.error = Some(format!("{err:#}"));
                report
            }
        })
        .collect()
}

/// Adapters wired to the data root, scrape first.
pub fn active_adapters(
    paths: &StorePaths,
    config: &AppConfig,
    include_scrape: bool,
) -> Vec<Box<dyn SourceAdapter>> {
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();
    if include_scrape {
        adapters.push(Box::new(bikeland_html::Bikeland::new(
            config.bikeland_url.clone(),
            config.bikeland_known_events.clone(),
            paths.bikeland_store(),
        )));
    }
    adapters.push(Box::new(csv_export::CsvExport::new(
        paths.csv_input(),
        paths.csv_store(),
    )));
    adapters.push(Box::new(manual_text::ManualText::new(
        paths.manual_input(),
        paths.manual_store(),
    )));
    adapters
}
