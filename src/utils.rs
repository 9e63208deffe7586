use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{NaiveDateTime, Utc};
use dirs::data_dir;
use once_cell::sync::Lazy;

const LOCAL_TZ: chrono_tz::Tz = chrono_tz::Europe::Helsinki;

static DEFAULT_DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    base.join("cycle-events")
});

pub fn default_data_root() -> PathBuf {
    DEFAULT_DATA_ROOT.clone()
}

/// Wall-clock time in the listings' home timezone.
pub fn now_local() -> NaiveDateTime {
    Utc::now().with_timezone(&LOCAL_TZ).naive_local()
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!("failed to create parent {:?}: {err}", parent);
        }
    }
}

/// Every file the pipeline reads or writes, derived from one data root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn bikeland_store(&self) -> PathBuf {
        self.root.join("bikeland_events.json")
    }

    pub fn csv_store(&self) -> PathBuf {
        self.root.join("csv_events.json")
    }

    pub fn manual_store(&self) -> PathBuf {
        self.root.join("manual_events.json")
    }

    pub fn manual_edits(&self) -> PathBuf {
        self.root.join("manual_edits.json")
    }

    pub fn blacklist(&self) -> PathBuf {
        self.root.join("event_blacklist.json")
    }

    pub fn canonical(&self) -> PathBuf {
        self.root.join("all_events.json")
    }

    pub fn csv_input(&self) -> PathBuf {
        self.root.join("pyorailyfi-tapahtumat.csv")
    }

    pub fn manual_input(&self) -> PathBuf {
        self.root.join("simple_events.txt")
    }

    pub fn geocode_cache(&self) -> PathBuf {
        self.root.join("geocode_cache.json")
    }

    pub fn listing_output(&self) -> PathBuf {
        self.root.join("output").join("clean_combined_events.txt")
    }
}
