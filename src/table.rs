use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use crate::data::Pid;
use crate::error::{Error, Result};
use crate::marker::IdentityKey;

/// One row of the persisted table. Location markers fill `lat`/`lon`,
/// process markers fill `process`/`pid` (and the location of their
/// first connection, when known).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    pub lat:         Option<f64>,
    pub lon:         Option<f64>,
    pub process:     Option<String>,
    pub pid:         Option<Pid>,
    pub marker_hash: String,
    #[serde(default)]
    pub city:        String,
    #[serde(default)]
    pub country:     String,
    #[serde(default)]
    pub desc:        String,
}

impl TableEntry {
    pub fn key(&self) -> Option<IdentityKey> {
        match (&self.process, self.pid, self.lat, self.lon) {
            (Some(name), Some(pid), _, _)  => Some(IdentityKey::process(name, pid)),
            (_, _, Some(lat), Some(lon))   => Some(IdentityKey::location(lat, lon)),
            _                              => None,
        }
    }
}

/// Identity key to marker hash, as of the previous run. Entries are never
/// evicted; keys that stop recurring simply stay behind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerTable {
    entries: Vec<TableEntry>,
}

impl MarkerTable {
    pub fn new(entries: Vec<TableEntry>) -> Self {
        Self { entries }
    }

    /// Read the table left by the previous run. A missing or unreadable
    /// table means no history.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("no marker table at {}", path.display());
            return Self::default();
        }

        match read(path) {
            Ok(table) => {
                debug!("loaded {} markers from {}", table.len(), path.display());
                table
            }
            Err(e) => {
                warn!("ignoring unreadable marker table: {}", e);
                Self::default()
            }
        }
    }

    /// Overwrite the table at `path` by renaming a fully written sibling
    /// into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = temporary(path);

        let write = || -> csv::Result<()> {
            {
                let mut writer = csv::Writer::from_path(&tmp)?;
                for entry in &self.entries {
                    writer.serialize(entry)?;
                }
                writer.flush()?;
            }
            fs::rename(&tmp, path)?;
            Ok(())
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Persistence { path: path.to_owned(), source: e }
        })?;

        debug!("saved {} markers to {}", self.entries.len(), path.display());

        Ok(())
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash per key; the first entry wins when several share a key.
    pub fn index(&self) -> HashMap<IdentityKey, &str> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            if let Some(key) = entry.key() {
                index.entry(key).or_insert(entry.marker_hash.as_str());
            }
        }
        index
    }

    /// Replace the first entry with the same key, or append.
    pub fn upsert(&mut self, entry: TableEntry) {
        let key = entry.key();
        let pos = self.entries.iter().position(|e| key.is_some() && e.key() == key);

        match pos {
            Some(n) => self.entries[n] = entry,
            None    => self.entries.push(entry),
        }
    }
}

fn read(path: &Path) -> csv::Result<MarkerTable> {
    let mut reader = csv::Reader::from_path(path)?;
    let entries = reader.deserialize().collect::<csv::Result<Vec<TableEntry>>>()?;
    Ok(MarkerTable::new(entries))
}

fn temporary(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
