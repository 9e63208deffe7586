use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const UNKNOWN_DATE: &str = "Unknown Date";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Start time used when a source only supplies a calendar date.
pub fn default_start_time() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Provenance of an event record. Also the conflict-resolution signal at merge time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Bikeland,
    Csv,
    Manual,
    ManualEdit,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Bikeland,
        Source::Csv,
        Source::Manual,
        Source::ManualEdit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Bikeland => "bikeland",
            Source::Csv => "csv",
            Source::Manual => "manual",
            Source::ManualEdit => "manual_edit",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown source: {s}"))
    }
}

/// Event start. Serialized as `YYYY-MM-DD HH:MM`, or the `Unknown Date` sentinel.
///
/// Ordering puts every known date before `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventDate {
    Known(NaiveDateTime),
    Unknown,
}

impl EventDate {
    pub fn on(date: NaiveDate) -> Self {
        EventDate::Known(date.and_time(default_start_time()))
    }

    /// Lenient parse of stored values: full datetime, bare date (08:00), anything else Unknown.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(value) = NaiveDateTime::parse_from_str(trimmed, DATETIME_FORMAT) {
            return EventDate::Known(value);
        }
        match NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
            Ok(date) => EventDate::on(date),
            Err(_) => EventDate::Unknown,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            EventDate::Known(value) => Some(value.date()),
            EventDate::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, EventDate::Known(_))
    }

    /// Date component used by the identity key; the whole sentinel when unknown.
    pub fn date_part(&self) -> String {
        match self {
            EventDate::Known(value) => value.format(DATE_FORMAT).to_string(),
            EventDate::Unknown => UNKNOWN_DATE.to_string(),
        }
    }
}

impl fmt::Display for EventDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventDate::Known(value) => write!(f, "{}", value.format(DATETIME_FORMAT)),
            EventDate::Unknown => f.write_str(UNKNOWN_DATE),
        }
    }
}

impl Serialize for EventDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(EventDate::parse(&raw))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Location {
    Known(String),
    #[default]
    Unknown,
}

impl Location {
    pub fn new(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == UNKNOWN_LOCATION {
            Location::Unknown
        } else {
            Location::Known(trimmed.to_string())
        }
    }

    pub fn known(&self) -> Option<&str> {
        match self {
            Location::Known(name) => Some(name.as_str()),
            Location::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &str {
        self.known().unwrap_or(UNKNOWN_LOCATION)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|text| Location::new(&text)).unwrap_or_default())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    // absent (not merely unknown) datetimes leave the record without an identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<EventDate>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub organizer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub link: String,
    pub source: Source,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub added_timestamp: Option<NaiveDateTime>,
}

impl Event {
    pub fn new(title: &str, datetime: EventDate, source: Source) -> Self {
        Self {
            title: title.to_string(),
            kind: String::new(),
            datetime: Some(datetime),
            location: Location::Unknown,
            organizer: String::new(),
            description: String::new(),
            link: String::new(),
            source,
            added_timestamp: None,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.datetime.and_then(|value| value.date())
    }

    pub fn datetime_label(&self) -> String {
        self.datetime
            .map(|value| value.to_string())
            .unwrap_or_else(|| UNKNOWN_DATE.to_string())
    }
}

// Legacy stores carry naive ISO timestamps, some with offsets; anything else is dropped.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|text| {
        let text = text.trim();
        text.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|value| value.naive_local())
            })
    }))
}

/// Identity keys excluded from the canonical list.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Blacklist(BTreeSet<String>);

impl Blacklist {
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn insert(&mut self, key: String) -> bool {
        self.0.insert(key)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl FromIterator<String> for Blacklist {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Blacklist(iter.into_iter().collect())
    }
}
