use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::Html;

use crate::models::EventDate;

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s)"]+"#).expect("valid url regex"));

// Abbreviation prefixes as they appear on Finnish listings ("12. heinäk. 2025").
const FINNISH_MONTHS: [(&str, u32); 12] = [
    ("tammi", 1),
    ("helmi", 2),
    ("maalis", 3),
    ("huhti", 4),
    ("touko", 5),
    ("kesä", 6),
    ("heinä", 7),
    ("elo", 8),
    ("syys", 9),
    ("loka", 10),
    ("marras", 11),
    ("joulu", 12),
];

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an HTML fragment, whitespace collapsed.
pub fn strip_html(fragment: &str) -> String {
    let parsed = Html::parse_fragment(fragment);
    clean_text(&parsed.root_element().text().collect::<String>())
}

pub fn fetch_html(url: &str) -> Result<String> {
    static CLIENT: Lazy<Client> = Lazy::new(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; cycle-events/0.1)")
            .build()
            .expect("http client")
    });

    let response = CLIENT
        .get(url)
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .with_context(|| format!("unable to read response body for {url}"))
}

/// First http(s) URL in free text.
pub fn first_url(text: &str) -> Option<String> {
    URL_RE.find(text).map(|m| m.as_str().to_string())
}

/// `DD.MM.YYYY` (one-digit day or month allowed). Impossible dates are Unknown.
pub fn parse_dotted_date(text: &str) -> EventDate {
    let parts: Vec<&str> = text.trim().split('.').map(str::trim).collect();
    let [day, month, year] = parts.as_slice() else {
        return EventDate::Unknown;
    };
    calendar_date(day, month, year)
}

/// `12. heinäk. 2025` style dates.
pub fn parse_finnish_date(text: &str) -> EventDate {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let [day, month_name, year] = parts.as_slice() else {
        return EventDate::Unknown;
    };
    let month_name = month_name.to_lowercase();
    let Some(month) = FINNISH_MONTHS
        .iter()
        .find(|(prefix, _)| month_name.starts_with(prefix))
        .map(|(_, number)| number.to_string())
    else {
        return EventDate::Unknown;
    };
    calendar_date(day.trim_end_matches('.'), &month, year)
}

fn calendar_date(day: &str, month: &str, year: &str) -> EventDate {
    let parsed = (|| {
        let day = day.parse::<u32>().ok()?;
        let month = month.parse::<u32>().ok()?;
        let year = year.parse::<i32>().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })();
    match parsed {
        Some(date) => EventDate::on(date),
        None => {
            tracing::debug!("unparseable date {day}.{month}.{year}");
            EventDate::Unknown
        }
    }
}

/// Slice of at most `len` bytes starting at `start`, cut back to a char boundary.
pub fn window(text: &str, start: usize, len: usize) -> &str {
    let mut end = text.len().min(start.saturating_add(len));
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[start..end]
}
