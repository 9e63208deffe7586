use std::fs;
use std::mem::take;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::base;
use super::{ParseIssue, RecordOutcome, SourceAdapter};
use crate::models::{Event, Location, Source};

const SEPARATOR: char = ';';
const COLUMNS: usize = 6;

/// Adapter for the pyoraily.fi calendar export
/// (`date;name;location;type;organizer;info`, semicolon separated).
pub struct CsvExport {
    input: PathBuf,
    store: PathBuf,
}

impl CsvExport {
    pub fn new(input: PathBuf, store: PathBuf) -> Self {
        Self { input, store }
    }
}

impl SourceAdapter for CsvExport {
    fn source(&self) -> Source {
        Source::Csv
    }

    fn store_path(&self) -> &Path {
        &self.store
    }

    fn collect(&self) -> Result<Vec<RecordOutcome>> {
        if !self.input.exists() {
            tracing::warn!("csv export not found at {:?}", self.input);
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.input)
            .with_context(|| format!("unable to read {:?}", self.input))?;
        Ok(parse_export(&text))
    }
}

/// Every data row after the header, normalized or rejected.
pub fn parse_export(text: &str) -> Vec<RecordOutcome> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    parse_rows(text, SEPARATOR)
        .into_iter()
        .enumerate()
        .skip(1)
        .map(|(index, row)| parse_row(index + 1, &row))
        .collect()
}

fn parse_row(row_number: usize, row: &[String]) -> RecordOutcome {
    if row.len() < COLUMNS {
        return Err(ParseIssue::ShortRow {
            row: row_number,
            expected: COLUMNS,
            found: row.len(),
        });
    }
    let cell = |index: usize| row[index].trim();

    let info = cell(5);
    let mut event = Event::new(cell(1), base::parse_dotted_date(cell(0)), Source::Csv);
    event.location = Location::new(cell(2));
    event.kind = cell(3).to_string();
    event.organizer = cell(4).to_string();
    event.description = info.to_string();
    event.link = base::first_url(info).unwrap_or_default();
    Ok(event)
}

/// Quote and CRLF tolerant row splitter. Blank lines are dropped.
fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // unterminated last line
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}
