//! Coordinates for event locations, for the map view.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::models::Location;
use crate::store::{self, StoreError};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("cache error: {0}")]
    Cache(#[from] StoreError),
}

/// A single forward-geocoding query. `Ok(None)` means the service had no match.
pub trait Lookup {
    fn search(&mut self, query: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim, spaced at least `min_interval` apart.
pub struct Nominatim {
    client: Client,
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl Nominatim {
    pub fn new(user_agent: &str, min_interval: Duration) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        Ok(Self {
            client,
            min_interval,
            last_request: None,
        })
    }

    fn wait_for_rate_limit(&mut self) {
        if let Some(previous) = self.last_request {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed);
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl Lookup for Nominatim {
    fn search(&mut self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let mut url = Url::parse(NOMINATIM_URL).map_err(|err| GeocodeError::Http(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("limit", "1");

        self.wait_for_rate_limit();
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| GeocodeError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(GeocodeError::Http(format!("status {status}: {text}")));
        }

        let places: Vec<Place> =
            serde_json::from_str(&text).map_err(|err| GeocodeError::Parse(err.to_string()))?;
        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let lat = place.lat.parse::<f64>();
        let lon = place.lon.parse::<f64>();
        match (lat, lon) {
            (Ok(lat), Ok(lon)) => Ok(Some(Coordinates { lat, lon })),
            _ => Err(GeocodeError::Parse(format!(
                "bad coordinates {}, {}",
                place.lat, place.lon
            ))),
        }
    }
}

/// Cached geocoding of free-text Finnish place names. Misses are cached too;
/// lookup failures are not, so they are retried next time.
pub struct Geocoder<L: Lookup> {
    lookup: L,
    cache_path: PathBuf,
    cache: BTreeMap<String, Option<Coordinates>>,
    country_suffix: String,
    dirty: bool,
}

impl<L: Lookup> Geocoder<L> {
    pub fn open(lookup: L, cache_path: PathBuf, country_suffix: &str) -> Self {
        let cache = match load_cache(&cache_path) {
            Ok(cache) => cache,
            Err(err) => {
                tracing::warn!("geocode cache unusable, starting empty: {err}");
                BTreeMap::new()
            }
        };
        Self {
            lookup,
            cache_path,
            cache,
            country_suffix: country_suffix.to_string(),
            dirty: false,
        }
    }

    pub fn locate(&mut self, location: &Location) -> Option<Coordinates> {
        let name = location.known()?;
        if let Some(cached) = self.cache.get(name) {
            return *cached;
        }

        match self.resolve(name) {
            Ok(found) => {
                if found.is_none() {
                    tracing::info!("no coordinates for {name}");
                }
                self.cache.insert(name.to_string(), found);
                self.dirty = true;
                found
            }
            Err(err) => {
                tracing::warn!("geocoding {name} failed: {err}");
                None
            }
        }
    }

    fn resolve(&mut self, name: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let query = self.qualified(name);
        if let Some(found) = self.lookup.search(&query)? {
            return Ok(Some(found));
        }
        // "Tahko, Nilsiä" style names often resolve on the first part alone
        let head = name.split(',').next().unwrap_or(name).trim();
        if head.is_empty() || head == name {
            return Ok(None);
        }
        let retry = self.qualified(head);
        self.lookup.search(&retry)
    }

    fn qualified(&self, name: &str) -> String {
        if name.contains("Finland") || name.contains("Suomi") || self.country_suffix.is_empty() {
            name.to_string()
        } else {
            format!("{name}, {}", self.country_suffix)
        }
    }

    pub fn save(&mut self) -> Result<(), GeocodeError> {
        if self.dirty {
            store::write_json(&self.cache_path, &self.cache)?;
            self.dirty = false;
        }
        Ok(())
    }
}

fn load_cache(path: &std::path::Path) -> Result<BTreeMap<String, Option<Coordinates>>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}
