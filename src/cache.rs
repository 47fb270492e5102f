use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Annotation, ListingRecord};
use crate::utils::error::CacheError;

/// Listing records keyed by URL, persisted as a single JSON document.
#[derive(Debug, Clone)]
pub struct ListingCache {
    path: PathBuf,
    entries: BTreeMap<String, ListingRecord>,
}

impl ListingCache {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the cache at `path`. A missing or blank file is an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let mut entries: BTreeMap<String, ListingRecord> =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: path.display().to_string(),
                source,
            })?;

        // The key is the identity; older files did not always repeat it.
        for (url, record) in entries.iter_mut() {
            if record.url != *url {
                record.url = url.clone();
            }
        }

        info!("Loaded {} cached listings from {}", entries.len(), path.display());
        Ok(Self { path, entries })
    }

    /// Like `load`, but a corrupt file is replaced by an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        match Self::load(path.clone()) {
            Err(e @ CacheError::Corrupt { .. }) => {
                warn!("{}; starting with an empty cache", e);
                Ok(Self::empty(path))
            }
            other => other,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&ListingRecord> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn records(&self) -> impl Iterator<Item = &ListingRecord> {
        self.entries.values()
    }

    /// Insert `record`, or merge it into the stored one.
    ///
    /// Financial fields always take the incoming values. Annotations are only
    /// replaced by non-empty incoming annotations.
    pub fn upsert(&mut self, record: ListingRecord) {
        match self.entries.get_mut(&record.url) {
            Some(stored) => {
                stored.apply_financials(&record);
                if record.has_analysis() {
                    stored.analysis_ai = record.analysis_ai;
                }
                if record.user_status.is_set() {
                    stored.user_status = record.user_status;
                }
            }
            None => {
                self.entries.insert(record.url.clone(), record);
            }
        }
    }

    /// Overwrite the financial fields of `record.url`, keeping annotations.
    pub fn refresh(&mut self, record: ListingRecord) {
        match self.entries.get_mut(&record.url) {
            Some(stored) => stored.apply_financials(&record),
            None => {
                self.entries.insert(record.url.clone(), record);
            }
        }
    }

    /// Write one annotation. Returns `false` when `url` is not cached.
    pub fn annotate(&mut self, url: &str, annotation: Annotation) -> bool {
        let Some(stored) = self.entries.get_mut(url) else {
            return false;
        };

        match annotation {
            Annotation::Analysis(text) => stored.analysis_ai = Some(text),
            Annotation::Status(status) => stored.user_status = status,
        }
        true
    }

    /// Persist the whole cache through a temporary file and a rename.
    pub fn save(&self) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let bytes = serde_json::to_vec_pretty(&self.entries)
            .map_err(|e| io_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache.json".to_string());
        let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&temp_path, &bytes).map_err(io_error)?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(e));
        }

        debug!("Saved {} listings to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    /// Complete listings, best gross yield first.
    pub fn complete_listings(&self) -> Vec<&ListingRecord> {
        let mut listings: Vec<_> = self.entries.values().filter(|r| r.is_complete()).collect();
        listings.sort_by(|a, b| {
            let a = a.gross_yield_pct.unwrap_or(f64::NEG_INFINITY);
            let b = b.gross_yield_pct.unwrap_or(f64::NEG_INFINITY);
            b.total_cmp(&a)
        });
        listings
    }
}
