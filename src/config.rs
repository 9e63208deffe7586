use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::identity::DEFAULT_SIMILARITY_THRESHOLD;
use crate::merge::Priority;
use crate::store::{self, StoreError};

pub const DEFAULT_BIKELAND_URL: &str = "https://www.bikeland.fi/tapahtumat";

const DEFAULT_KNOWN_EVENTS: [&str; 22] = [
    "Tour De Tuusulanjärvi",
    "Gravel Primavera I Nordic Gravel Series",
    "Koli Gravel Carnival",
    "Lohjanjärven ympäripyöräily",
    "Tour De Koivujärven ympäripyöräily",
    "Midnight Sun Gravel",
    "Pirkan pyöräily",
    "Tahko MTB",
    "Tour de Kainuu",
    "Nordic Gravel Series Jyväskylä",
    "Saimaa Cycle Tour",
    "Kitka MTB",
    "Kaldoaivi Ultra Road",
    "Kaldoaivi Ultra MTB",
    "Syöte MTB",
    "Dirty Sipoo x NGS",
    "Puss Weekend",
    "Luonterin pyöräily",
    "FNLD GRVL",
    "Sorahiisi",
    "Saariselkä MTB Stages",
    "Falling Leaves Lahti",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bikeland_url: String,
    /// Titles the scrape adapter looks for on the listing page.
    pub bikeland_known_events: Vec<String>,
    /// Source precedence, strongest first.
    pub priority: Priority,
    pub similarity_threshold: f64,
    pub geocode_user_agent: String,
    pub geocode_min_interval_ms: u64,
    pub geocode_country_suffix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bikeland_url: DEFAULT_BIKELAND_URL.to_string(),
            bikeland_known_events: DEFAULT_KNOWN_EVENTS.iter().map(|s| s.to_string()).collect(),
            priority: Priority::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            geocode_user_agent: "cycle-events/0.1 (pyorailytapahtumat)".to_string(),
            geocode_min_interval_ms: 1000,
            geocode_country_suffix: "Finland".to_string(),
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: AppConfig,
}

impl ConfigStore {
    /// Missing or unreadable config falls back to defaults.
    pub fn load(path: PathBuf) -> Self {
        let data = match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{err}; using default configuration");
                AppConfig::default()
            }
        };
        Self { path, data }
    }

    pub fn read(&self) -> &AppConfig {
        &self.data
    }

    pub fn update<F>(&mut self, transform: F) -> Result<AppConfig, StoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        transform(&mut self.data);
        store::write_json(&self.path, &self.data)?;
        Ok(self.data.clone())
    }
}

fn read_config(path: &PathBuf) -> Result<AppConfig, StoreError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Json {
        path: path.clone(),
        source,
    })
}
