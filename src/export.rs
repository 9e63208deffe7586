//! Plain-text `/create` listing for posting the canonical events to chat.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::models::{Event, Source};
use crate::store::StoreError;
use crate::utils;

const CHANNEL: &str = "#ulkotapahtumat_listaus";
const INSTRUCTIONS: &str = "💡 **Ohjeet:** Klikkaa haluamaasi emojia ilmoittaaksesi osallistumisesi tai kiinnostuksesi. Emojin valinnan jälkeen sivupalkkiin avautuu chätti, jossa voit keskustella muiden osallistujien kanssa.";

/// Finnish one-paragraph summary used as the post body.
pub fn describe(event: &Event) -> String {
    let when = match event.date() {
        Some(date) => date.format("%d.%m.%Y").to_string(),
        None => event.datetime_label(),
    };
    let mut text = format!(
        "{} järjestetään {} paikkakunnalla {}.",
        event.title, when, event.location
    );
    if !event.organizer.is_empty() {
        let _ = write!(text, " Järjestäjänä toimii {}.", event.organizer);
    }
    // scraped and exported descriptions are long marketing copy
    if !event.description.is_empty()
        && matches!(event.source, Source::Manual | Source::ManualEdit)
    {
        let _ = write!(text, " {}", event.description);
    }
    if !event.link.is_empty() {
        let _ = write!(text, " Lisätietoja tapahtumasta: {}", event.link);
    }
    text
}

pub fn render_listing(events: &[Event]) -> String {
    let mut out = String::new();
    for event in events {
        let _ = writeln!(out, "/create");
        let _ = writeln!(out, "title: {} ({})", event.title, event.kind);
        let _ = writeln!(out, "channel: {CHANNEL}");
        let _ = writeln!(out, "datetime: {}", event.datetime_label());
        let _ = writeln!(out, "description: {}", describe(event));
        let _ = writeln!(out);
        let _ = writeln!(out, "{INSTRUCTIONS}");
        let _ = writeln!(out, "---");
    }
    out
}

pub fn write_listing(path: &Path, events: &[Event]) -> Result<(), StoreError> {
    utils::ensure_parent(path);
    fs::write(path, render_listing(events)).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("wrote listing for {} events to {:?}", events.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDate, Location};
    use tempfile::TempDir;

    fn tahko() -> Event {
        let mut event = Event::new("Tahko MTB", EventDate::parse("2025-07-12 08:00"), Source::Csv);
        event.kind = "MTB".to_string();
        event.location = Location::new("Nilsiä");
        event.organizer = "JYPS".to_string();
        event.description = "Pitkä mainosteksti".to_string();
        event.link = "https://tahkomtb.fi".to_string();
        event
    }

    #[test]
    fn description_reads_as_finnish_sentence() {
        assert_eq!(
            describe(&tahko()),
            "Tahko MTB järjestetään 12.07.2025 paikkakunnalla Nilsiä. \
             Järjestäjänä toimii JYPS. Lisätietoja tapahtumasta: https://tahkomtb.fi"
        );
    }

    #[test]
    fn manual_descriptions_are_kept() {
        let mut event = Event::new("Sorahiisi", EventDate::Unknown, Source::Manual);
        event.description = "Sorateitä Lahden ympäristössä.".to_string();
        assert_eq!(
            describe(&event),
            "Sorahiisi järjestetään Unknown Date paikkakunnalla Unknown Location. \
             Sorateitä Lahden ympäristössä."
        );
    }

    #[test]
    fn listing_has_one_block_per_event() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("output").join("clean_combined_events.txt");
        let events = vec![tahko(), Event::new("Sorahiisi", EventDate::Unknown, Source::Manual)];

        write_listing(&path, &events).expect("write listing");
        let text = fs::read_to_string(&path).expect("read listing");
        assert_eq!(text.matches("/create").count(), 2);
        assert_eq!(text.matches("\n---\n").count(), 2);
        assert!(text.contains("title: Tahko MTB (MTB)\n"));
        assert!(text.contains("datetime: 2025-07-12 08:00\n"));
        assert!(text.contains("datetime: Unknown Date\n"));
    }
}
