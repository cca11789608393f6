//! Loading a set from disk and writing it back.
//!
//! Writes are staged: every file is encoded in memory, written as
//! `<name>.tmp`, then renamed into place (series files first, catalog last).

use super::{SeriesSet, StoreError};
use crate::codec::{
    encode_extended_catalog, encode_series_file, read_catalog, read_series_file, series_file_name,
    CatalogEntry, CatalogLayout, SeriesRecord, COMPACT_CATALOG_FILE, EXTENDED_CATALOG_FILE,
};
use crate::domain::{Quote, QuoteSeries};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl SeriesSet {
    /// Load every series a storage location holds.
    ///
    /// A directory without a catalog loads as an empty set.
    pub fn load(storage_location: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut set = SeriesSet::new(storage_location);
        let dir = set.storage_location.clone();

        let catalog = read_catalog(&dir).map_err(|source| StoreError::Codec {
            path: dir.clone(),
            source,
        })?;
        let Some((layout, entries)) = catalog else {
            info!(path = %dir.display(), "no catalog found, starting an empty set");
            return Ok(set);
        };

        for entry in entries {
            let records = read_series_file(&dir, entry.slot).map_err(|source| StoreError::Codec {
                path: dir.join(series_file_name(entry.slot)),
                source,
            })?;
            debug!(symbol = %entry.symbol, slot = entry.slot, quotes = records.len(), "series loaded");

            let mut series = QuoteSeries::new(entry.symbol, entry.display_name, entry.time_frame)
                .with_slot(entry.slot)
                .with_autorun_flag(entry.autorun_flag)
                .with_observed_bounds(entry.first_date, entry.last_date);
            for record in records {
                series.load_stored(Quote::stored(record.date, record.values));
            }
            set.series.push(series);
        }

        info!(path = %dir.display(), ?layout, series = set.series.len(), "series set loaded");
        set.layout = Some(layout);
        set.dirty = false;
        Ok(set)
    }

    /// Write the whole set to its storage location in the extended layout.
    ///
    /// Slots are renumbered 1..=N and cached bounds refreshed first. Nothing
    /// on disk changes unless every file encodes. Series files beyond N are
    /// removed; a compact catalog left from load is kept but no longer read.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        let dir = self.storage_location.clone();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        self.renumber_slots();
        for series in &mut self.series {
            series.refresh_observed_bounds();
        }

        // Encode everything before touching the directory.
        let mut staged: Vec<(PathBuf, Vec<u8>)> = Vec::with_capacity(self.series.len() + 1);
        for series in &self.series {
            let records: Vec<SeriesRecord> = series
                .quotes()
                .map(|q| SeriesRecord {
                    date: q.date(),
                    values: q.values(),
                })
                .collect();
            let path = dir.join(series_file_name(series.slot()));
            let bytes = encode_series_file(&records).map_err(|source| StoreError::Codec {
                path: path.clone(),
                source,
            })?;
            staged.push((path, bytes));
        }

        let entries: Vec<CatalogEntry> = self.series.iter().map(catalog_entry).collect();
        let catalog_path = dir.join(EXTENDED_CATALOG_FILE);
        let catalog = encode_extended_catalog(&entries).map_err(|source| StoreError::Codec {
            path: catalog_path.clone(),
            source,
        })?;
        staged.push((catalog_path, catalog));

        write_staged(&staged)?;
        remove_stale_series_files(&dir, self.series.len());
        if self.layout == Some(CatalogLayout::Compact) && dir.join(COMPACT_CATALOG_FILE).is_file() {
            warn!(path = %dir.display(), "compact catalog left in place; the extended catalog now takes precedence");
        }

        for series in &mut self.series {
            series.mark_saved();
        }
        self.dirty = false;
        self.layout = Some(CatalogLayout::Extended);
        info!(path = %dir.display(), series = self.series.len(), "series set written");
        Ok(())
    }
}

fn catalog_entry(series: &QuoteSeries) -> CatalogEntry {
    CatalogEntry {
        slot: series.slot(),
        symbol: series.symbol().to_string(),
        display_name: series.display_name().to_string(),
        time_frame: series.time_frame(),
        first_date: series.first_observed(),
        last_date: series.last_observed(),
        autorun_flag: series.autorun_flag(),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write every file as `.tmp`, then rename all into place in order.
///
/// On failure every remaining `.tmp` file is removed.
fn write_staged(staged: &[(PathBuf, Vec<u8>)]) -> Result<(), StoreError> {
    let cleanup = || {
        for (path, _) in staged {
            let _ = fs::remove_file(tmp_path(path));
        }
    };

    for (path, bytes) in staged {
        let tmp = tmp_path(path);
        if let Err(source) = fs::write(&tmp, bytes) {
            cleanup();
            return Err(StoreError::Io { path: tmp, source });
        }
    }

    for (path, _) in staged {
        if let Err(source) = fs::rename(tmp_path(path), path) {
            cleanup();
            return Err(StoreError::Io {
                path: path.clone(),
                source,
            });
        }
    }
    Ok(())
}

/// Remove `F<n>.DAT` for every n above the live series count.
fn remove_stale_series_files(dir: &Path, live: usize) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let name = entry.file_name();
        let Some(slot) = name.to_str().and_then(parse_series_slot) else {
            continue;
        };
        if slot > live {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = ?name, "removed stale series file"),
                Err(e) => warn!(file = ?name, error = %e, "cannot remove stale series file"),
            }
        }
    }
}

fn parse_series_slot(name: &str) -> Option<usize> {
    name.strip_prefix('F')?.strip_suffix(".DAT")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecError;
    use crate::domain::{NonTradingDays, Ohlcv, TimeFrame};
    use crate::engine::ReconciliationEngine;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn filled_set(dir: &Path, symbols: &[&str]) -> SeriesSet {
        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let mut set = SeriesSet::new(dir);
        for (i, symbol) in symbols.iter().enumerate() {
            let series = set.add_series(QuoteSeries::new(*symbol, *symbol, TimeFrame::Daily)).unwrap();
            for (d, day) in [5, 6, 7].into_iter().enumerate() {
                let price = 10.0 + i as f32 + d as f32 * 0.5;
                engine.upsert_observation(series, ymd(2014, 5, day), Ohlcv::flat(price, 1000.0), "Feed");
            }
        }
        set
    }

    #[test]
    fn missing_directory_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let set = SeriesSet::load(dir.path().join("nothing-here")).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.layout(), None);
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = filled_set(dir.path(), &["BHP", "CBA"]);
        set.persist().unwrap();
        assert!(!set.is_dirty());

        let loaded = SeriesSet::load(dir.path()).unwrap();
        assert_eq!(loaded.layout(), Some(CatalogLayout::Extended));
        assert!(!loaded.is_dirty());
        assert_eq!(loaded.len(), 2);
        let cba = loaded.series("CBA").unwrap();
        assert_eq!(cba.slot(), 2);
        assert_eq!(cba.first_observed(), Some(ymd(2014, 5, 5)));
        assert_eq!(cba.last_observed(), Some(ymd(2014, 5, 7)));
        assert_eq!(cba.quote(ymd(2014, 5, 6)).unwrap().values().close, 11.5);
    }

    #[test]
    fn persist_leaves_no_tmp_files_and_drops_stale_slots() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = filled_set(dir.path(), &["A", "B", "C"]);
        set.persist().unwrap();
        assert!(dir.path().join("F3.DAT").is_file());

        set.remove_series("A");
        set.persist().unwrap();

        assert!(!dir.path().join("F3.DAT").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let loaded = SeriesSet::load(dir.path()).unwrap();
        assert_eq!(loaded.symbols().collect::<Vec<_>>(), vec!["B", "C"]);
    }

    #[test]
    fn unstorable_quote_date_fails_before_anything_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = filled_set(dir.path(), &["BHP"]);
        set.persist().unwrap();
        let before = fs::read(dir.path().join("F1.DAT")).unwrap();

        let cal = NonTradingDays::new();
        let engine = ReconciliationEngine::new(&cal);
        let series = set.series_mut("BHP").unwrap();
        engine.upsert_observation(series, ymd(2950, 1, 5), Ohlcv::flat(12.0, 1000.0), "Feed");

        let err = set.persist().unwrap_err();
        assert!(matches!(
            err,
            StoreError::Codec { source: CodecError::QuoteDateOutOfRange { .. }, .. }
        ));
        assert_eq!(fs::read(dir.path().join("F1.DAT")).unwrap(), before);
        assert!(set.is_dirty());

        let reloaded = SeriesSet::load(dir.path()).unwrap();
        assert_eq!(reloaded.series("BHP").unwrap().len(), 3);
    }

    #[test]
    fn missing_series_file_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = filled_set(dir.path(), &["A", "B"]);
        set.persist().unwrap();
        fs::remove_file(dir.path().join("F2.DAT")).unwrap();

        let err = SeriesSet::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Codec {
                source: CodecError::SeriesFileMissing { .. },
                ..
            }
        ));
    }

    #[test]
    fn series_slot_names() {
        assert_eq!(parse_series_slot("F12.DAT"), Some(12));
        assert_eq!(parse_series_slot("F12.DAT.tmp"), None);
        assert_eq!(parse_series_slot("EMASTER"), None);
    }
}
