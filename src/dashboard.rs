//! Read-only queries behind the event listing and map views.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDateTime};

use crate::identity::identity_key;
use crate::merge::{self, Priority};
use crate::models::{Blacklist, Event, Source};
use crate::store;
use crate::utils::StorePaths;

const FINNISH_MONTHS: [&str; 12] = [
    "Tammikuu",
    "Helmikuu",
    "Maaliskuu",
    "Huhtikuu",
    "Toukokuu",
    "Kesäkuu",
    "Heinäkuu",
    "Elokuu",
    "Syyskuu",
    "Lokakuu",
    "Marraskuu",
    "Joulukuu",
];

pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|index| FINNISH_MONTHS.get(index as usize))
        .copied()
        .unwrap_or("Tuntematon")
}

pub fn month_label(year: i32, month: u32) -> String {
    format!("{} {year}", month_name(month))
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub key: String,
    pub event: Event,
    pub blacklisted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Case-insensitive match against title, organizer and description.
    pub search: Option<String>,
    pub month: Option<(i32, u32)>,
    pub kind: Option<String>,
    pub location: Option<String>,
    pub source: Option<Source>,
    pub include_blacklisted: bool,
    pub added_within_days: Option<i64>,
}

impl EventFilter {
    pub fn matches(&self, row: &EventRow, now: NaiveDateTime) -> bool {
        let event = &row.event;
        if row.blacklisted && !self.include_blacklisted {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let hit = [&event.title, &event.organizer, &event.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some((year, month)) = self.month {
            match event.date() {
                Some(date) if date.year() == year && date.month() == month => {}
                _ => return false,
            }
        }
        if let Some(kind) = &self.kind {
            if !event.kind.eq_ignore_ascii_case(kind) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if event.location.as_str() != location {
                return false;
            }
        }
        if let Some(source) = self.source {
            if event.source != source {
                return false;
            }
        }
        if let Some(days) = self.added_within_days {
            // a window reaching past the calendar range has no lower bound
            let cutoff = Duration::try_days(days).and_then(|span| now.checked_sub_signed(span));
            match (event.added_timestamp, cutoff) {
                (Some(added), Some(cutoff)) if added < cutoff => return false,
                (Some(_), _) => {}
                (None, _) => return false,
            }
        }
        true
    }
}

/// Keys every event and flags the blacklisted ones. Events without a key are left out.
pub fn rows(events: &[Event], blacklist: &Blacklist) -> Vec<EventRow> {
    events
        .iter()
        .filter_map(|event| {
            let key = identity_key(event)?;
            Some(EventRow {
                blacklisted: blacklist.contains(&key),
                key,
                event: event.clone(),
            })
        })
        .collect()
}

/// Published rows, or with `include_blacklisted` the merge as it would look
/// without the blacklist so excluded events can be shown flagged.
pub fn load_rows(
    paths: &StorePaths,
    priority: &Priority,
    include_blacklisted: bool,
) -> Vec<EventRow> {
    let blacklist = merge::load_blacklist_or_empty(paths);
    let events = if include_blacklisted {
        let inputs = merge::load_inputs(paths);
        merge::merge(&inputs, &Blacklist::default(), priority).events
    } else {
        store::load_events_or_empty(&paths.canonical(), "canonical")
    };
    rows(&events, &blacklist)
}

pub fn filter_rows(rows: &[EventRow], filter: &EventFilter, now: NaiveDateTime) -> Vec<EventRow> {
    rows.iter()
        .filter(|row| filter.matches(row, now))
        .cloned()
        .collect()
}

/// Values offered by the view's filter controls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facets {
    /// Chronological `(year, month)` pairs with their Finnish label.
    pub months: Vec<((i32, u32), String)>,
    pub kinds: Vec<String>,
    pub locations: Vec<String>,
    pub sources: Vec<Source>,
}

pub fn facets(rows: &[EventRow]) -> Facets {
    let mut months = BTreeSet::new();
    let mut kinds = BTreeSet::new();
    let mut locations = BTreeSet::new();
    let mut sources = BTreeSet::new();
    for row in rows {
        let event = &row.event;
        if let Some(date) = event.date() {
            months.insert((date.year(), date.month()));
        }
        if !event.kind.is_empty() {
            kinds.insert(event.kind.clone());
        }
        if let Some(location) = event.location.known() {
            locations.insert(location.to_string());
        }
        sources.insert(event.source);
    }
    Facets {
        months: months
            .into_iter()
            .map(|(year, month)| ((year, month), month_label(year, month)))
            .collect(),
        kinds: kinds.into_iter().collect(),
        locations: locations.into_iter().collect(),
        sources: sources.into_iter().collect(),
    }
}

/// Events per calendar month, chronological. Undated events are not counted.
pub fn month_counts(rows: &[EventRow]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for date in rows.iter().filter_map(|row| row.event.date()) {
        *counts.entry((date.year(), date.month())).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((year, month), count)| (month_label(year, month), count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, Location};

    fn event(title: &str, datetime: &str, source: Source, kind: &str, location: &str) -> Event {
        let mut event = Event::new(title, EventDate::parse(datetime), source);
        event.kind = kind.to_string();
        event.location = Location::new(location);
        event
    }

    fn sample_rows() -> Vec<EventRow> {
        let mut tahko = event("Tahko MTB", "2025-07-12 08:00", Source::Csv, "MTB", "Nilsiä");
        tahko.organizer = "JYPS".to_string();
        tahko.added_timestamp = Some(at("2025-06-01 12:00"));
        let fnld = event("FNLD GRVL", "2025-08-09 08:00", Source::Bikeland, "GRAVEL", "Kuopio");
        let sipoo = event("Dirty Sipoo", "2025-05-10 08:00", Source::Manual, "GRAVEL", "Sipoo");
        let undated = event("Sorahiisi", "Unknown Date", Source::Bikeland, "", "");
        let blacklist: Blacklist = ["Dirty Sipoo_2025-05-10".to_string()].into_iter().collect();
        rows(&[sipoo, tahko, fnld, undated], &blacklist)
    }

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M").expect("valid datetime")
    }

    fn now() -> NaiveDateTime {
        at("2025-06-05 12:00")
    }

    #[test]
    fn blacklisted_rows_hidden_unless_requested() {
        let rows = sample_rows();
        let visible = filter_rows(&rows, &EventFilter::default(), now());
        assert_eq!(visible.len(), 3);

        let all = filter_rows(
            &rows,
            &EventFilter {
                include_blacklisted: true,
                ..EventFilter::default()
            },
            now(),
        );
        assert_eq!(all.len(), 4);
        assert!(all.iter().any(|row| row.blacklisted && row.key == "Dirty Sipoo_2025-05-10"));
    }

    #[test]
    fn filters_combine() {
        let rows = sample_rows();
        let by_search = EventFilter {
            search: Some("jyps".to_string()),
            ..EventFilter::default()
        };
        let found = filter_rows(&rows, &by_search, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event.title, "Tahko MTB");

        let gravel_in_august = EventFilter {
            kind: Some("gravel".to_string()),
            month: Some((2025, 8)),
            ..EventFilter::default()
        };
        let found = filter_rows(&rows, &gravel_in_august, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event.title, "FNLD GRVL");

        let from_bikeland = EventFilter {
            source: Some(Source::Bikeland),
            location: Some("Unknown Location".to_string()),
            ..EventFilter::default()
        };
        let found = filter_rows(&rows, &from_bikeland, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event.title, "Sorahiisi");
    }

    #[test]
    fn recently_added_needs_timestamp() {
        let rows = sample_rows();
        let recent = EventFilter {
            added_within_days: Some(7),
            ..EventFilter::default()
        };
        let found = filter_rows(&rows, &recent, now());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event.title, "Tahko MTB");

        let tighter = EventFilter {
            added_within_days: Some(2),
            ..EventFilter::default()
        };
        assert!(filter_rows(&rows, &tighter, now()).is_empty());
    }

    #[test]
    fn huge_recent_window_keeps_every_stamped_row() {
        let rows = sample_rows();
        for days in [1_000_000_000, i64::MAX] {
            let filter = EventFilter {
                added_within_days: Some(days),
                ..EventFilter::default()
            };
            let found = filter_rows(&rows, &filter, now());
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].event.title, "Tahko MTB");
        }
    }

    #[test]
    fn facets_are_sorted_and_labelled_in_finnish() {
        let facets = facets(&sample_rows());
        let labels: Vec<&str> = facets.months.iter().map(|(_, label)| label.as_str()).collect();
        assert_eq!(labels, vec!["Toukokuu 2025", "Heinäkuu 2025", "Elokuu 2025"]);
        assert_eq!(facets.kinds, vec!["GRAVEL", "MTB"]);
        assert_eq!(facets.locations, vec!["Kuopio", "Nilsiä", "Sipoo"]);
        assert_eq!(facets.sources, vec![Source::Bikeland, Source::Csv, Source::Manual]);
    }

    #[test]
    fn month_counts_skip_undated() {
        let counts = month_counts(&sample_rows());
        assert_eq!(
            counts,
            vec![
                ("Toukokuu 2025".to_string(), 1),
                ("Heinäkuu 2025".to_string(), 1),
                ("Elokuu 2025".to_string(), 1),
            ]
        );
        assert_eq!(month_name(13), "Tuntematon");
    }
}
