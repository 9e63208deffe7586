//! Operator curation: blacklist maintenance, corrections, manual additions and
//! the duplicate report. Every write republishes the canonical list.

use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::dashboard::{self, EventRow};
use crate::identity::{
    self, ExactDuplicate, LocationGroup, SimilarPair, MAX_SIMILARITY_THRESHOLD,
    MIN_SIMILARITY_THRESHOLD,
};
use crate::merge::{self, MergeReport, Priority};
use crate::models::{Blacklist, Event, EventDate, Location, Source};
use crate::store::{self, StoreError};
use crate::utils::{self, StorePaths};

const REPORT_LIMIT: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("no event with key {0:?}")]
    UnknownKey(String),
    #[error("an event needs a title and a date")]
    MissingIdentity,
    #[error(
        "similarity threshold {0} is outside {}..={}",
        MIN_SIMILARITY_THRESHOLD,
        MAX_SIMILARITY_THRESHOLD
    )]
    Threshold(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a curation write changed, and the merge it triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationOutcome {
    pub changed: usize,
    pub key: Option<String>,
    pub merged: MergeReport,
}

/// Field changes for an existing event. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct EventEdit {
    pub title: Option<String>,
    pub kind: Option<String>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub organizer: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

impl EventEdit {
    fn apply(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title.trim().to_string();
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
        if let Some(date) = self.date {
            event.datetime = Some(EventDate::on(date));
        }
        if let Some(location) = self.location {
            event.location = Location::new(&location);
        }
        if let Some(organizer) = self.organizer {
            event.organizer = organizer;
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(link) = self.link {
            event.link = link;
        }
    }
}

pub struct Curator {
    paths: StorePaths,
    priority: Priority,
}

impl Curator {
    pub fn new(paths: StorePaths, priority: Priority) -> Self {
        Self { paths, priority }
    }

    /// Every event the sources and overlay know about, blacklisted ones flagged.
    pub fn review_rows(&self) -> Vec<EventRow> {
        dashboard::load_rows(&self.paths, &self.priority, true)
    }

    pub fn blacklist(&self) -> Result<Blacklist, StoreError> {
        store::load_blacklist(&self.paths.blacklist())
    }

    pub fn blacklist_add(&self, keys: &[String]) -> Result<CurationOutcome, ReviewError> {
        let mut blacklist = self.blacklist()?;
        let changed = keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .filter(|key| blacklist.insert(key.to_string()))
            .count();
        self.save_blacklist(&blacklist, changed)
    }

    pub fn blacklist_remove(&self, keys: &[String]) -> Result<CurationOutcome, ReviewError> {
        let mut blacklist = self.blacklist()?;
        let changed = keys
            .iter()
            .filter(|key| blacklist.remove(key.trim()))
            .count();
        self.save_blacklist(&blacklist, changed)
    }

    /// Swaps the whole set, e.g. after bulk review.
    pub fn blacklist_replace(&self, keys: &[String]) -> Result<CurationOutcome, ReviewError> {
        let blacklist: Blacklist = keys
            .iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        let changed = blacklist.len();
        self.save_blacklist(&blacklist, changed)
    }

    /// One key per line; blank lines are ignored and the keys are added to the current set.
    pub fn blacklist_import(&self, text: &str) -> Result<CurationOutcome, ReviewError> {
        let keys: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        self.blacklist_add(&keys)
    }

    pub fn blacklist_export(&self) -> Result<String, StoreError> {
        let blacklist = self.blacklist()?;
        let mut out = String::new();
        for key in blacklist.iter() {
            let _ = writeln!(out, "{key}");
        }
        Ok(out)
    }

    fn save_blacklist(
        &self,
        blacklist: &Blacklist,
        changed: usize,
    ) -> Result<CurationOutcome, ReviewError> {
        store::write_blacklist(&self.paths.blacklist(), blacklist)?;
        tracing::info!("blacklist now holds {} keys", blacklist.len());
        self.republish(changed, None)
    }

    /// Stores a corrected copy in the overlay. A changed title or date gives the
    /// event a new key; the old key is blacklisted so the source copy stays hidden.
    pub fn edit(&self, key: &str, edit: EventEdit) -> Result<CurationOutcome, ReviewError> {
        let mut edits = store::load_manual_edits(&self.paths.manual_edits())?;
        let current = match edits.get(key) {
            Some(event) => event.clone(),
            None => self
                .review_rows()
                .into_iter()
                .find(|row| row.key == key)
                .map(|row| row.event)
                .ok_or_else(|| ReviewError::UnknownKey(key.to_string()))?,
        };

        let mut updated = current;
        edit.apply(&mut updated);
        updated.source = Source::ManualEdit;
        updated.added_timestamp = Some(utils::now_local());
        let new_key = identity::identity_key(&updated).ok_or(ReviewError::MissingIdentity)?;

        let rekeyed = new_key != key;
        if rekeyed {
            edits.remove(key);
        }
        edits.upsert(new_key.clone(), updated);
        // the replacement must be stored before the old key is hidden
        store::write_manual_edits(&self.paths.manual_edits(), &edits)?;
        if rekeyed {
            let mut blacklist = self.blacklist()?;
            blacklist.insert(key.to_string());
            blacklist.remove(&new_key);
            store::write_blacklist(&self.paths.blacklist(), &blacklist)?;
            tracing::info!("{key} renamed to {new_key}; old key blacklisted");
        }
        self.republish(1, Some(new_key))
    }

    /// Adds an operator-entered event to the overlay.
    pub fn add(&self, mut draft: Event) -> Result<CurationOutcome, ReviewError> {
        draft.title = draft.title.trim().to_string();
        draft.source = Source::ManualEdit;
        draft.added_timestamp = Some(utils::now_local());
        let key = identity::identity_key(&draft).ok_or(ReviewError::MissingIdentity)?;

        if self.blacklist()?.contains(&key) {
            tracing::warn!("{key} is blacklisted and will stay hidden until removed");
        }
        let mut edits = store::load_manual_edits(&self.paths.manual_edits())?;
        edits.upsert(key.clone(), draft);
        store::write_manual_edits(&self.paths.manual_edits(), &edits)?;
        self.republish(1, Some(key))
    }

    fn republish(
        &self,
        changed: usize,
        key: Option<String>,
    ) -> Result<CurationOutcome, ReviewError> {
        let merged = merge::publish(&self.paths, &self.priority)?;
        Ok(CurationOutcome {
            changed,
            key,
            merged: merged.report,
        })
    }
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ReviewError> {
    if (MIN_SIMILARITY_THRESHOLD..=MAX_SIMILARITY_THRESHOLD).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ReviewError::Threshold(threshold))
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateReport<'a> {
    pub threshold: f64,
    pub exact: Vec<ExactDuplicate<'a>>,
    pub similar: Vec<SimilarPair<'a>>,
    pub same_place: Vec<LocationGroup<'a>>,
}

pub fn duplicate_report(
    events: &[Event],
    threshold: f64,
) -> Result<DuplicateReport<'_>, ReviewError> {
    let threshold = validate_threshold(threshold)?;
    Ok(DuplicateReport {
        threshold,
        exact: identity::find_exact_duplicates(events),
        similar: identity::find_similar_pairs(events, threshold),
        same_place: identity::group_by_date_location(events),
    })
}

impl DuplicateReport<'_> {
    pub fn is_clean(&self) -> bool {
        self.exact.is_empty() && self.similar.is_empty() && self.same_place.is_empty()
    }

    /// Text report; each section is cut to five entries unless `verbose`.
    pub fn render(&self, verbose: bool) -> String {
        let limit = if verbose { usize::MAX } else { REPORT_LIMIT };
        let mut out = String::new();

        let _ = writeln!(out, "Exact duplicates: {}", self.exact.len());
        for dup in self.exact.iter().take(limit) {
            let _ = writeln!(
                out,
                "  {}: {} vs {}",
                dup.key, dup.original.source, dup.duplicate.source
            );
        }
        more(&mut out, self.exact.len(), limit);

        let _ = writeln!(
            out,
            "Similar titles (threshold {:.2}): {}",
            self.threshold,
            self.similar.len()
        );
        for pair in self.similar.iter().take(limit) {
            let _ = writeln!(
                out,
                "  {:.2}: {} ({}) ~ {} ({})",
                pair.similarity,
                pair.first.title,
                pair.first.datetime_label(),
                pair.second.title,
                pair.second.datetime_label()
            );
        }
        more(&mut out, self.similar.len(), limit);

        let _ = writeln!(out, "Same date and location: {}", self.same_place.len());
        for group in self.same_place.iter().take(limit) {
            let titles: Vec<&str> = group.events.iter().map(|e| e.title.as_str()).collect();
            let _ = writeln!(
                out,
                "  {} {}: {}",
                group.date,
                group.location,
                titles.join(", ")
            );
        }
        more(&mut out, self.same_place.len(), limit);
        out
    }
}

fn more(out: &mut String, total: usize, limit: usize) {
    if total > limit {
        let _ = writeln!(out, "  ... and {} more (use --verbose)", total - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(title: &str, datetime: &str, source: Source, location: &str) -> Event {
        let mut event = Event::new(title, EventDate::parse(datetime), source);
        event.location = Location::new(location);
        event
    }

    fn seeded() -> (TempDir, Curator) {
        let dir = TempDir::new().expect("tempdir");
        let paths = StorePaths::new(dir.path());
        store::write_events(
            &paths.bikeland_store(),
            &[
                event("Tahko MTB", "2025-07-12 08:00", Source::Bikeland, "Tahko"),
                event("Dirty Sipoo", "2025-05-10 08:00", Source::Bikeland, "Sipoo"),
            ],
        )
        .expect("seed bikeland");
        store::write_events(
            &paths.csv_store(),
            &[event("Tahko MTB", "2025-07-12 08:00", Source::Csv, "Tahko")],
        )
        .expect("seed csv");
        (dir, Curator::new(paths, Priority::default()))
    }

    fn canonical(dir: &TempDir) -> Vec<Event> {
        store::load_events(&StorePaths::new(dir.path()).canonical())
            .expect("canonical")
            .events
    }

    #[test]
    fn blacklist_add_remove_and_replace() {
        let (dir, curator) = seeded();
        let outcome = curator
            .blacklist_add(&["Dirty Sipoo_2025-05-10".to_string()])
            .expect("add");
        assert_eq!(outcome.changed, 1);
        assert_eq!(outcome.merged.blacklisted, 1);
        assert!(canonical(&dir).iter().all(|e| e.title != "Dirty Sipoo"));

        let again = curator
            .blacklist_add(&["Dirty Sipoo_2025-05-10".to_string()])
            .expect("add twice");
        assert_eq!(again.changed, 0);

        curator
            .blacklist_remove(&["Dirty Sipoo_2025-05-10".to_string()])
            .expect("remove");
        assert!(canonical(&dir).iter().any(|e| e.title == "Dirty Sipoo"));

        curator
            .blacklist_replace(&["Tahko MTB_2025-07-12".to_string(), " ".to_string()])
            .expect("replace");
        let blacklist = curator.blacklist().expect("load");
        assert_eq!(blacklist.len(), 1);
        assert!(blacklist.contains("Tahko MTB_2025-07-12"));
    }

    #[test]
    fn blank_keys_are_never_blacklisted() {
        let (_dir, curator) = seeded();
        let outcome = curator
            .blacklist_add(&["   ".to_string(), String::new()])
            .expect("add blanks");
        assert_eq!(outcome.changed, 0);
        assert!(curator.blacklist().expect("load").is_empty());
    }

    #[test]
    fn import_merges_and_export_lists_one_per_line() {
        let (_dir, curator) = seeded();
        curator
            .blacklist_add(&["Old Race_2024-06-01".to_string()])
            .expect("seed blacklist");
        let outcome = curator
            .blacklist_import("Dirty Sipoo_2025-05-10\n\n  Tahko MTB_2025-07-12  \n")
            .expect("import");
        assert_eq!(outcome.changed, 2);
        assert_eq!(
            curator.blacklist_export().expect("export"),
            "Dirty Sipoo_2025-05-10\nOld Race_2024-06-01\nTahko MTB_2025-07-12\n"
        );
    }

    #[test]
    fn edit_overrides_source_records() {
        let (dir, curator) = seeded();
        let outcome = curator
            .edit(
                "Tahko MTB_2025-07-12",
                EventEdit {
                    location: Some("Nilsiä".to_string()),
                    ..EventEdit::default()
                },
            )
            .expect("edit");
        assert_eq!(outcome.key.as_deref(), Some("Tahko MTB_2025-07-12"));

        let events = canonical(&dir);
        let tahko = events
            .iter()
            .find(|e| e.title == "Tahko MTB")
            .expect("tahko published");
        assert_eq!(tahko.source, Source::ManualEdit);
        assert_eq!(tahko.location, Location::new("Nilsiä"));
        assert!(tahko.added_timestamp.is_some());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn rekeying_edit_hides_the_old_key() {
        let (dir, curator) = seeded();
        let moved = NaiveDate::from_ymd_opt(2025, 7, 19).expect("valid date");
        curator
            .edit(
                "Tahko MTB_2025-07-12",
                EventEdit {
                    date: Some(moved),
                    ..EventEdit::default()
                },
            )
            .expect("edit");

        let blacklist = curator.blacklist().expect("blacklist");
        assert!(blacklist.contains("Tahko MTB_2025-07-12"));
        let events = canonical(&dir);
        let tahkos: Vec<&Event> = events.iter().filter(|e| e.title == "Tahko MTB").collect();
        assert_eq!(tahkos.len(), 1);
        assert_eq!(tahkos[0].datetime_label(), "2025-07-19 08:00");
    }

    #[test]
    fn failed_overlay_write_leaves_old_key_visible() {
        let (dir, curator) = seeded();
        let paths = StorePaths::new(dir.path());
        merge::publish(&paths, &Priority::default()).expect("publish");
        let staging = paths.manual_edits().with_extension("json.tmp");
        std::fs::create_dir(&staging).expect("block staging file");

        let moved = NaiveDate::from_ymd_opt(2025, 7, 19).expect("valid date");
        let err = curator
            .edit(
                "Tahko MTB_2025-07-12",
                EventEdit {
                    date: Some(moved),
                    ..EventEdit::default()
                },
            )
            .expect_err("overlay write fails");
        assert!(matches!(err, ReviewError::Store(_)));
        assert!(!curator.blacklist().expect("blacklist").contains("Tahko MTB_2025-07-12"));
        assert!(canonical(&dir).iter().any(|e| e.title == "Tahko MTB"));
    }

    #[test]
    fn edit_of_unknown_key_fails() {
        let (_dir, curator) = seeded();
        let err = curator
            .edit("Atlantis_2025-01-01", EventEdit::default())
            .expect_err("unknown key");
        assert!(matches!(err, ReviewError::UnknownKey(_)));
    }

    #[test]
    fn added_events_are_published_as_manual_edits() {
        let (dir, curator) = seeded();
        let mut draft = event("Sorahiisi", "2025-06-07 08:00", Source::Manual, "Lahti");
        draft.kind = "GRAVEL".to_string();
        let outcome = curator.add(draft).expect("add");
        assert_eq!(outcome.key.as_deref(), Some("Sorahiisi_2025-06-07"));

        let events = canonical(&dir);
        let added = events
            .iter()
            .find(|e| e.title == "Sorahiisi")
            .expect("added event published");
        assert_eq!(added.source, Source::ManualEdit);

        let untitled = event("  ", "2025-06-07 08:00", Source::Manual, "Lahti");
        assert!(matches!(
            curator.add(untitled),
            Err(ReviewError::MissingIdentity)
        ));
    }

    #[test]
    fn duplicate_report_sections_and_limits() {
        let mut events = vec![
            event("Saimaa Cycle Tour", "2025-06-14 08:00", Source::Bikeland, "Lappeenranta"),
            event("Saimaa Cycling Tour", "2025-06-15 08:00", Source::Csv, "Lappeenranta"),
            event("Tahko MTB", "2025-07-12 08:00", Source::Bikeland, "Tahko"),
            event("Tahko MTB", "2025-07-12 10:00", Source::Csv, "Tahko"),
        ];
        for day in 1..=7 {
            events.push(event(
                &format!("Kesäajo {day}"),
                "2025-08-01 08:00",
                Source::Manual,
                "Oulu",
            ));
        }

        let report = duplicate_report(&events, 0.8).expect("report");
        assert_eq!(report.exact.len(), 1);
        assert!(report
            .similar
            .iter()
            .any(|pair| pair.first.title == "Saimaa Cycle Tour"));
        assert_eq!(report.same_place.len(), 2);
        assert_eq!(report.same_place[1].events.len(), 7);
        assert!(!report.is_clean());

        let text = report.render(false);
        assert!(text.contains("Exact duplicates: 1"));
        assert!(text.contains("Tahko MTB_2025-07-12: bikeland vs csv"));

        assert!(matches!(
            duplicate_report(&events, 0.4),
            Err(ReviewError::Threshold(_))
        ));
    }

    #[test]
    fn quiet_report_truncates_long_sections() {
        let events: Vec<Event> = (1..=7)
            .map(|n| {
                event(
                    "Falling Leaves Lahti",
                    &format!("2025-10-0{n} 08:00"),
                    Source::Bikeland,
                    "Lahti",
                )
            })
            .collect();
        let report = duplicate_report(&events, 1.0).expect("report");
        assert_eq!(report.similar.len(), 21);

        let quiet = report.render(false);
        assert!(quiet.contains("... and 16 more"));
        let verbose = report.render(true);
        assert!(!verbose.contains("more (use --verbose)"));
        assert_eq!(verbose.matches("1.00: ").count(), 21);
    }
}
