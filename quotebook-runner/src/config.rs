//! Runner configuration: the list master as TOML.
//!
//! ```toml
//! [defaults]
//! non_trading_days = "holidays.csv"
//! corrections = "corrections.csv"
//! tolerance = 0.5
//!
//! [[lists]]
//! name = "asx"
//! storage = "data/asx"
//! updates = "feeds/asx.csv"
//! use_corrections = true
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use chrono::NaiveDate;
use quotebook_core::data::{HolidayFileFormat, DEFAULT_CORRECTIONS_DATE_FORMAT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by every list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub non_trading_days: Option<PathBuf>,
    /// Zero-based column of the date in the non-trading days file.
    pub non_trading_date_column: usize,
    pub non_trading_date_format: String,
    pub corrections: Option<PathBuf>,
    pub corrections_date_format: String,
    /// Largest day-over-day fractional change that passes the tolerance check.
    pub tolerance: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        let holidays = HolidayFileFormat::default();
        Self {
            non_trading_days: None,
            non_trading_date_column: holidays.column,
            non_trading_date_format: holidays.date_format,
            corrections: None,
            corrections_date_format: DEFAULT_CORRECTIONS_DATE_FORMAT.into(),
            tolerance: 0.5,
        }
    }
}

impl Defaults {
    pub fn holiday_format(&self) -> HolidayFileFormat {
        HolidayFileFormat {
            column: self.non_trading_date_column,
            date_format: self.non_trading_date_format.clone(),
        }
    }
}

/// One series set and how to maintain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListConfig {
    pub name: String,
    pub storage: PathBuf,
    /// Observation feed applied by `update`.
    #[serde(default)]
    pub updates: Option<PathBuf>,
    #[serde(default)]
    pub use_corrections: bool,
    #[serde(default)]
    pub add_extra_day: bool,
    #[serde(default)]
    pub write_audit: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl ListConfig {
    /// A bare list for one storage directory, named after the directory.
    pub fn for_storage(storage: impl Into<PathBuf>) -> Self {
        let storage = storage.into();
        let name = storage
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| storage.display().to_string());
        Self {
            name,
            storage,
            updates: None,
            use_corrections: false,
            add_extra_day: false,
            write_audit: false,
            start_date: None,
            end_date: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub lists: Vec<ListConfig>,
}

impl RunnerConfig {
    /// Load a config file and resolve its relative paths against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse and validate a config string. Paths are left as written.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.defaults.tolerance.is_finite() || self.defaults.tolerance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tolerance must be a non-negative number, got {}",
                self.defaults.tolerance
            )));
        }

        let mut seen = HashSet::new();
        for list in &self.lists {
            if list.name.trim().is_empty() {
                return Err(ConfigError::Invalid("list with an empty name".into()));
            }
            if !seen.insert(list.name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!("duplicate list name '{}'", list.name)));
            }
            if let (Some(start), Some(end)) = (list.start_date, list.end_date) {
                if start > end {
                    return Err(ConfigError::Invalid(format!(
                        "list '{}': start_date {start} is after end_date {end}",
                        list.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(p) = self.defaults.non_trading_days.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.defaults.corrections.as_mut() {
            resolve(p);
        }
        for list in &mut self.lists {
            resolve(&mut list.storage);
            if let Some(p) = list.updates.as_mut() {
                resolve(p);
            }
        }
    }

    /// Lists whose names appear in `names` (case-insensitive); all lists when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<ListConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.lists.clone());
        }
        names
            .iter()
            .map(|name| {
                self.lists
                    .iter()
                    .find(|l| l.name.eq_ignore_ascii_case(name))
                    .cloned()
                    .ok_or_else(|| ConfigError::Invalid(format!("no list named '{name}'")))
            })
            .collect()
    }
}
