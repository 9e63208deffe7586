use std::fs;
use std::path::{Path, PathBuf};

use cycle_events_lib::merge::{self, Priority};
use cycle_events_lib::models::{Event, EventDate, Location, Source};
use cycle_events_lib::sources::{RecordOutcome, SourceAdapter};
use cycle_events_lib::store;
use cycle_events_lib::utils::StorePaths;
use tempfile::TempDir;

fn event(title: &str, datetime: &str, source: Source, location: &str) -> Event {
    let mut event = Event::new(title, EventDate::parse(datetime), source);
    event.location = Location::new(location);
    event
}

fn seed(paths: &StorePaths) {
    store::write_events(
        &paths.bikeland_store(),
        &[
            event("Tahko MTB", "2025-07-12 08:00", Source::Bikeland, "Tahko"),
            event("Dirty Sipoo", "2025-05-10 08:00", Source::Bikeland, "Sipoo"),
            event("Sorahiisi", "Unknown Date", Source::Bikeland, ""),
        ],
    )
    .unwrap();

    let mut csv_tahko = event("Tahko MTB", "2025-07-12 08:00", Source::Csv, "Tahko");
    csv_tahko.organizer = "JYPS".to_string();
    store::write_events(
        &paths.csv_store(),
        &[
            csv_tahko,
            event("Dirty Sipoo", "2025-05-10 09:00", Source::Csv, "Sipoo"),
            event("Broken Date Race", "Unknown Date", Source::Csv, "Oulu"),
        ],
    )
    .unwrap();

    // overlay records are tagged on load whatever they claim
    store::write_events(
        &paths.manual_edits(),
        &[event("Tahko MTB", "2025-07-12 08:00", Source::Csv, "Nilsiä")],
    )
    .unwrap();

    fs::write(paths.blacklist(), r#"["Dirty Sipoo_2025-05-10"]"#).unwrap();
}

#[test]
fn publish_resolves_collisions_and_blacklist() {
    let dir = TempDir::new().unwrap();
    let paths = StorePaths::new(dir.path());
    seed(&paths);

    let outcome = merge::publish(&paths, &Priority::default()).unwrap();
    let titles: Vec<&str> = outcome.events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Tahko MTB", "Sorahiisi", "Broken Date Race"]);

    let tahko = &outcome.events[0];
    assert_eq!(tahko.source, Source::ManualEdit);
    assert_eq!(tahko.location, Location::new("Nilsiä"));
    assert_eq!(outcome.report.blacklisted, 2);

    let published = store::load_events(&paths.canonical()).unwrap().events;
    assert_eq!(published, outcome.events);
    assert!(paths.listing_output().exists());

    let again = merge::publish(&paths, &Priority::default()).unwrap();
    assert_eq!(again.events, outcome.events);
}

#[test]
fn unreadable_store_does_not_block_publishing() {
    let dir = TempDir::new().unwrap();
    let paths = StorePaths::new(dir.path());
    seed(&paths);
    fs::write(paths.csv_store(), "[{ truncated").unwrap();

    let outcome = merge::publish(&paths, &Priority::default()).unwrap();
    let tahko = outcome
        .events
        .iter()
        .find(|e| e.title == "Tahko MTB")
        .unwrap();
    assert_eq!(tahko.source, Source::ManualEdit);
    assert!(outcome.events.iter().all(|e| e.title != "Broken Date Race"));
}

struct Unreachable {
    store: PathBuf,
}

impl SourceAdapter for Unreachable {
    fn source(&self) -> Source {
        Source::Bikeland
    }

    fn store_path(&self) -> &Path {
        &self.store
    }

    fn collect(&self) -> anyhow::Result<Vec<RecordOutcome>> {
        anyhow::bail!("bikeland.fi timed out")
    }
}

#[test]
fn failed_scrape_keeps_previous_records() {
    let dir = TempDir::new().unwrap();
    let paths = StorePaths::new(dir.path());
    seed(&paths);

    let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(Unreachable {
        store: paths.bikeland_store(),
    })];
    let run = merge::run_pipeline(&paths, &Priority::default(), &adapters).unwrap();

    assert_eq!(run.refreshed.len(), 1);
    assert!(run.refreshed[0].error.is_some());
    assert!(run
        .merged
        .events
        .iter()
        .any(|e| e.title == "Sorahiisi" && e.source == Source::Bikeland));
}
