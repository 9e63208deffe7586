use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use super::base;
use super::{RecordOutcome, SourceAdapter};
use crate::models::{Event, EventDate, Location, Source};

// Each listing's details follow its title within this many bytes of markup.
const SECTION_BYTES: usize = 5000;

static TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"class="wixui-rich-text__text"><span class="color_42 wixui-rich-text__text">(.*?)</span></span></p>"#,
    )
    .expect("bikeland type regex")
});
static LOCATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class="wixui-rich-text__text">([\p{L}\-,\s]+)</span></span></p></div>"#)
        .expect("bikeland location regex")
});
static STYLED_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class="color_42 wixui-rich-text__text">(\d{1,2}\.\s+\w+\.\s+\d{4})</span>"#)
        .expect("bikeland styled date regex")
});
static BARE_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}\.\s+\w+\.\s+\d{4})").expect("bikeland date regex"));
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<span class="color_25 wixui-rich-text__text">(.*?)</span></p></div>"#)
        .expect("bikeland description regex")
});
static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<p class="font_9 wixui-rich-text__text"[^>]*><span class="color_25 wixui-rich-text__text">(.*?)</span></p>"#,
    )
    .expect("bikeland paragraph regex")
});
static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="(https?://[^"]+)""#).expect("bikeland link regex"));

/// Scrape adapter for the bikeland.fi events page.
pub struct Bikeland {
    url: String,
    known_events: Vec<String>,
    store: PathBuf,
}

impl Bikeland {
    pub fn new(url: String, known_events: Vec<String>, store: PathBuf) -> Self {
        Self {
            url,
            known_events,
            store,
        }
    }

    /// One record per known title found on the page.
    pub(crate) fn parse_document(&self, html: &str) -> Vec<RecordOutcome> {
        let mut records = Vec::new();
        for title in &self.known_events {
            let Some(start) = html.find(title.as_str()) else {
                tracing::debug!("bikeland: {title} not listed");
                continue;
            };
            let section = base::window(html, start, SECTION_BYTES);
            records.push(Ok(parse_section(title, section)));
        }
        records
    }
}

impl SourceAdapter for Bikeland {
    fn source(&self) -> Source {
        Source::Bikeland
    }

    fn store_path(&self) -> &Path {
        &self.store
    }

    fn collect(&self) -> Result<Vec<RecordOutcome>> {
        let html = base::fetch_html(&self.url)?;
        Ok(self.parse_document(&html))
    }
}

fn parse_section(title: &str, section: &str) -> Event {
    let datetime = STYLED_DATE_RE
        .captures(section)
        .or_else(|| BARE_DATE_RE.captures(section))
        .map(|caps| base::parse_finnish_date(&caps[1]))
        .unwrap_or(EventDate::Unknown);

    let mut event = Event::new(title, datetime, Source::Bikeland);
    event.kind = TYPE_RE
        .captures(section)
        .map(|caps| caps[1].trim().to_string())
        .filter(|kind| !kind.is_empty())
        .unwrap_or_else(|| infer_kind(title).to_string());
    event.location = LOCATION_RE
        .captures(section)
        .map(|caps| Location::new(&caps[1]))
        .unwrap_or_default();
    event.description = description(title, section);
    event.link = LINK_RE
        .captures_iter(section)
        .map(|caps| caps[1].to_string())
        .find(|link| !link.contains("bikeland.fi") && !link.contains("wix"))
        .unwrap_or_default();
    event
}

fn infer_kind(title: &str) -> &'static str {
    if title.contains("MTB") {
        "MTB"
    } else if title.contains("Gravel") || title.contains("GRVL") {
        "GRAVEL"
    } else if title.contains("Road") {
        "MAANTIE"
    } else {
        "Unknown"
    }
}

// Short or unrelated first blocks are usually teasers; prefer the body paragraph.
fn description(title: &str, section: &str) -> String {
    let Some(first) = DESCRIPTION_RE.captures(section).map(|caps| caps[1].to_string()) else {
        return String::new();
    };
    let raw = if first.chars().count() < 50 || !first.contains(title) {
        PARAGRAPH_RE
            .captures(section)
            .map(|caps| caps[1].to_string())
            .unwrap_or(first)
    } else {
        first
    };
    base::strip_html(&raw)
}
