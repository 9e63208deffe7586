//! Builds the canonical event list from the manual-edit overlay and the
//! per-source stores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::export;
use crate::identity::identity_key;
use crate::models::{Blacklist, Event, Source};
use crate::sources::{self, RefreshReport, SourceAdapter};
use crate::store::{self, StoreError};
use crate::utils::StorePaths;

/// Source precedence, strongest first. Sources left out rank below all listed ones
/// in their default relative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Source>", into = "Vec<Source>")]
pub struct Priority(Vec<Source>);

const DEFAULT_PRIORITY: [Source; 4] = [
    Source::ManualEdit,
    Source::Manual,
    Source::Csv,
    Source::Bikeland,
];

impl Priority {
    pub fn new(order: Vec<Source>) -> Self {
        let mut normalized: Vec<Source> = Vec::with_capacity(DEFAULT_PRIORITY.len());
        for source in order.into_iter().chain(DEFAULT_PRIORITY) {
            if !normalized.contains(&source) {
                normalized.push(source);
            }
        }
        Priority(normalized)
    }

    pub fn order(&self) -> &[Source] {
        &self.0
    }

    fn rank(&self, source: Source) -> usize {
        let position = self
            .0
            .iter()
            .position(|candidate| *candidate == source)
            .unwrap_or(self.0.len());
        self.0.len() - position
    }

    pub fn outranks(&self, challenger: Source, holder: Source) -> bool {
        self.rank(challenger) > self.rank(holder)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority(DEFAULT_PRIORITY.to_vec())
    }
}

impl From<Vec<Source>> for Priority {
    fn from(order: Vec<Source>) -> Self {
        Priority::new(order)
    }
}

impl From<Priority> for Vec<Source> {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeInputs {
    pub manual_edits: Vec<Event>,
    pub scraped: Vec<Event>,
    pub csv: Vec<Event>,
    pub manual: Vec<Event>,
}

impl MergeInputs {
    /// Candidate streams in insertion order.
    pub fn streams(&self) -> [&[Event]; 4] {
        [
            self.manual_edits.as_slice(),
            self.scraped.as_slice(),
            self.csv.as_slice(),
            self.manual.as_slice(),
        ]
    }

    /// Every candidate record, in stream order.
    pub fn all(&self) -> Vec<Event> {
        self.streams()
            .into_iter()
            .flat_map(|stream| stream.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub candidates: usize,
    pub missing_key: usize,
    pub blacklisted: usize,
    /// Colliding records that displaced a weaker holder.
    pub replaced: usize,
    /// Colliding records that lost to the current holder.
    pub superseded: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub events: Vec<Event>,
    pub report: MergeReport,
}

pub fn merge(inputs: &MergeInputs, blacklist: &Blacklist, priority: &Priority) -> MergeOutcome {
    merge_streams(&inputs.streams(), blacklist, priority)
}

/// First record per identity key wins unless a later one comes from a strictly
/// stronger source. Output is sorted by start, unknown dates last.
pub fn merge_streams(
    streams: &[&[Event]],
    blacklist: &Blacklist,
    priority: &Priority,
) -> MergeOutcome {
    let mut report = MergeReport::default();
    let mut holders: Vec<Event> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for candidate in streams.iter().flat_map(|stream| stream.iter()) {
        report.candidates += 1;
        let Some(key) = identity_key(candidate) else {
            report.missing_key += 1;
            continue;
        };
        if blacklist.contains(&key) {
            report.blacklisted += 1;
            continue;
        }
        match slots.get(&key) {
            Some(&slot) => {
                if priority.outranks(candidate.source, holders[slot].source) {
                    tracing::debug!(
                        "{key}: {} replaces {}",
                        candidate.source,
                        holders[slot].source
                    );
                    holders[slot] = candidate.clone();
                    report.replaced += 1;
                } else {
                    report.superseded += 1;
                }
            }
            None => {
                slots.insert(key, holders.len());
                holders.push(candidate.clone());
            }
        }
    }

    // stable: equal starts keep insertion order
    holders.sort_by_key(|event| event.datetime);
    report.total = holders.len();

    MergeOutcome {
        events: holders,
        report,
    }
}

/// Reads the overlay and every per-source store. Unreadable stores count as empty.
pub fn load_inputs(paths: &StorePaths) -> MergeInputs {
    let manual_edits = match store::load_manual_edits(&paths.manual_edits()) {
        Ok(edits) => edits.events(),
        Err(err) => {
            tracing::warn!("manual edits: {err}; continuing without them");
            Vec::new()
        }
    };
    MergeInputs {
        manual_edits,
        scraped: store::load_events_or_empty(&paths.bikeland_store(), "bikeland"),
        csv: store::load_events_or_empty(&paths.csv_store(), "csv"),
        manual: store::load_events_or_empty(&paths.manual_store(), "manual"),
    }
}

pub fn load_blacklist_or_empty(paths: &StorePaths) -> Blacklist {
    match store::load_blacklist(&paths.blacklist()) {
        Ok(blacklist) => blacklist,
        Err(err) => {
            tracing::warn!("blacklist: {err}; nothing will be excluded");
            Blacklist::default()
        }
    }
}

/// Regenerates the canonical store and the text listing from what is on disk.
pub fn publish(paths: &StorePaths, priority: &Priority) -> Result<MergeOutcome, StoreError> {
    let inputs = load_inputs(paths);
    let blacklist = load_blacklist_or_empty(paths);
    let outcome = merge(&inputs, &blacklist, priority);

    store::write_events(&paths.canonical(), &outcome.events)?;
    tracing::info!(
        "wrote {} canonical events to {:?}",
        outcome.events.len(),
        paths.canonical()
    );

    if let Err(err) = export::write_listing(&paths.listing_output(), &outcome.events) {
        tracing::warn!("listing export failed: {err}");
    }

    Ok(outcome)
}

#[derive(Debug)]
pub struct PipelineRun {
    pub refreshed: Vec<RefreshReport>,
    pub merged: MergeOutcome,
}

/// Refreshes every adapter, then publishes. Adapter failures are reported, never fatal.
pub fn run_pipeline(
    paths: &StorePaths,
    priority: &Priority,
    adapters: &[Box<dyn SourceAdapter>],
) -> Result<PipelineRun, StoreError> {
    let refreshed = sources::refresh_all(adapters);
    let merged = publish(paths, priority)?;
    Ok(PipelineRun { refreshed, merged })
}
