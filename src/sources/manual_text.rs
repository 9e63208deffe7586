use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::base;
use super::{ParseIssue, RecordOutcome, SourceAdapter};
use crate::models::{Event, EventDate, Location, Source};
use crate::utils;

const REQUIRED: [&str; 4] = ["title", "type", "date", "location"];

const TEMPLATE: &str = "\
Title: Nuuksio MTB Marathon
Type: MTB XCM
Date: 14.06.2025
Location: Espoo
Organizer: Espoon Pyöräilijät
Link: https://example.com/nuuksio-mtb
Description: Metsäpolkuja ja kallioita Nuuksion kansallispuiston laidalla.

Title: Saaristo Gravel
Type: Gravel
Date: 05.07.2025
Location: Parainen
Organizer: Turun Polkupyöräilijät
Link: https://example.com/saaristo-gravel
Description: Soratiet ja lossit Saariston rengastiellä.

Title: Pirkan Maantieajo
Type: Maantie
Date: 16.08.2025
Location: Tampere
Organizer: Tampereen Pyöräilijät
Link: https://example.com/pirkan-maantie
Description: Perinteinen maantieajo kolmella matkalla.
";

/// Adapter for the hand-maintained `Key: value` event list.
pub struct ManualText {
    input: PathBuf,
    store: PathBuf,
}

impl ManualText {
    pub fn new(input: PathBuf, store: PathBuf) -> Self {
        Self { input, store }
    }

    fn write_template(&self) -> Result<()> {
        utils::ensure_parent(&self.input);
        fs::write(&self.input, TEMPLATE)
            .with_context(|| format!("unable to write template to {:?}", self.input))
    }
}

impl SourceAdapter for ManualText {
    fn source(&self) -> Source {
        Source::Manual
    }

    fn store_path(&self) -> &Path {
        &self.store
    }

    /// A missing list is replaced by a template and contributes nothing this run.
    fn collect(&self) -> Result<Vec<RecordOutcome>> {
        if !self.input.exists() {
            self.write_template()?;
            tracing::info!("created manual event template at {:?}", self.input);
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.input)
            .with_context(|| format!("unable to read {:?}", self.input))?;
        Ok(parse_blocks(&text))
    }
}

pub fn parse_blocks(text: &str) -> Vec<RecordOutcome> {
    split_blocks(text)
        .iter()
        .enumerate()
        .map(|(index, lines)| parse_block(index + 1, lines))
        .collect()
}

fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn parse_block(block: usize, lines: &[&str]) -> RecordOutcome {
    let mut title = None;
    let mut kind = None;
    let mut date = None;
    let mut location = None;
    let mut organizer = String::new();
    let mut link = String::new();
    let mut description = String::new();

    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_lowercase().as_str() {
            "title" => title = Some(value),
            "type" => kind = Some(value),
            "date" => date = Some(base::parse_dotted_date(&value)),
            "location" => location = Some(value),
            "organizer" => organizer = value,
            "link" => link = value,
            "description" => description = value,
            other => tracing::debug!("manual block {block}: ignoring key {other:?}"),
        }
    }

    let present = [
        title.is_some(),
        kind.is_some(),
        date.is_some(),
        location.is_some(),
    ];
    let missing: Vec<&'static str> = REQUIRED
        .into_iter()
        .zip(present)
        .filter(|(_, found)| !found)
        .map(|(field, _)| field)
        .collect();
    if !missing.is_empty() {
        return Err(ParseIssue::MissingFields { block, missing });
    }

    let mut event = Event::new(
        &title.unwrap_or_default(),
        date.unwrap_or(EventDate::Unknown),
        Source::Manual,
    );
    event.kind = kind.unwrap_or_default();
    event.location = Location::new(&location.unwrap_or_default());
    event.organizer = organizer;
    event.link = link;
    event.description = description;
    Ok(event)
}
