//! Event identity and duplicate classification.
//!
//! Two records describe the same event when they share an identity key
//! (`{title}_{date}`). Everything else here is advisory: fuzzy title matches
//! and same-day/same-place collisions are surfaced for review, never merged.

use std::collections::HashMap;

use crate::models::Event;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;
pub const MIN_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const MAX_SIMILARITY_THRESHOLD: f64 = 1.0;

/// `None` when the record lacks a title or a datetime.
pub fn identity_key(event: &Event) -> Option<String> {
    if event.title.trim().is_empty() {
        return None;
    }
    let datetime = event.datetime?;
    Some(format!("{}_{}", event.title, datetime.date_part()))
}

pub fn is_exact_duplicate(a: &Event, b: &Event) -> bool {
    match (identity_key(a), identity_key(b)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Case-insensitive title similarity in `[0, 1]`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Similar titles on different dates. Same-date pairs belong to the exact-duplicate check.
pub fn is_fuzzy_duplicate(a: &Event, b: &Event, threshold: f64) -> bool {
    fuzzy_similarity(a, b).is_some_and(|similarity| similarity >= threshold)
}

fn fuzzy_similarity(a: &Event, b: &Event) -> Option<f64> {
    if a.title.trim().is_empty() || b.title.trim().is_empty() {
        return None;
    }
    let (left, right) = (a.datetime?, b.datetime?);
    if left.date_part() == right.date_part() {
        return None;
    }
    Some(title_similarity(&a.title, &b.title))
}

pub fn same_day_same_location(a: &Event, b: &Event) -> bool {
    match (venue_slot(a), venue_slot(b)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Date part and location exactly as stored. Sentinels take part like any
/// other value; only a missing datetime or a blank location opts out.
fn venue_slot(event: &Event) -> Option<(String, &str)> {
    let date = event.datetime?.date_part();
    let location = event.location.as_str();
    if location.is_empty() {
        return None;
    }
    Some((date, location))
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationGroup<'a> {
    pub date: String,
    pub location: &'a str,
    pub events: Vec<&'a Event>,
}

/// Groups sharing a date and location, in first-seen order. Singletons are omitted.
pub fn group_by_date_location(events: &[Event]) -> Vec<LocationGroup<'_>> {
    let mut groups: Vec<LocationGroup<'_>> = Vec::new();
    let mut index: HashMap<(String, &str), usize> = HashMap::new();

    for event in events {
        let Some(slot) = venue_slot(event) else {
            continue;
        };
        match index.get(&slot) {
            Some(&position) => groups[position].events.push(event),
            None => {
                let (date, location) = slot.clone();
                index.insert(slot, groups.len());
                groups.push(LocationGroup {
                    date,
                    location,
                    events: vec![event],
                });
            }
        }
    }

    groups.retain(|group| group.events.len() > 1);
    groups
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExactDuplicate<'a> {
    pub key: String,
    pub original: &'a Event,
    pub duplicate: &'a Event,
}

/// Every record whose key was already seen, paired with the first holder of that key.
pub fn find_exact_duplicates(events: &[Event]) -> Vec<ExactDuplicate<'_>> {
    let mut first_seen: HashMap<String, &Event> = HashMap::new();
    let mut duplicates = Vec::new();

    for event in events {
        let Some(key) = identity_key(event) else {
            continue;
        };
        match first_seen.get(&key) {
            Some(original) => duplicates.push(ExactDuplicate {
                key,
                original,
                duplicate: event,
            }),
            None => {
                first_seen.insert(key, event);
            }
        }
    }

    duplicates
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPair<'a> {
    pub similarity: f64,
    pub first: &'a Event,
    pub second: &'a Event,
}

/// Fuzzy duplicate pairs, most similar first.
pub fn find_similar_pairs(events: &[Event], threshold: f64) -> Vec<SimilarPair<'_>> {
    let mut pairs = Vec::new();
    for (i, first) in events.iter().enumerate() {
        for second in &events[i + 1..] {
            if let Some(similarity) = fuzzy_similarity(first, second) {
                if similarity >= threshold {
                    pairs.push(SimilarPair {
                        similarity,
                        first,
                        second,
                    });
                }
            }
        }
    }
    pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    pairs
}
