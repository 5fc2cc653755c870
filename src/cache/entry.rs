//! Download cache entries
//!
//! Each (source, region) pair owns one directory under the cache root.
//! A directory is only visible under its final name once it is complete:
//! downloads land in a staging directory which is renamed into place, and
//! a previous entry is swapped out rather than overwritten.

use crate::error::{BasinError, BasinResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Marker file written inside every complete entry
const ENTRY_MARKER: &str = ".entry.json";

/// Prefix of in-progress staging directories
const STAGING_PREFIX: &str = ".staging-";

/// Directory under the root holding derived fragments rather than entries
const DERIVED_DIR: &str = "derived";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Region-scoped cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: String,
    pub region: String,
}

impl CacheKey {
    /// Build a key, normalizing the region to a filesystem-safe form
    pub fn new(source: &str, region: &str) -> BasinResult<Self> {
        validate_component(source)?;
        let region = normalize_region(region);
        validate_component(&region)?;
        Ok(Self {
            source: source.to_string(),
            region,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.region)
    }
}

/// "New Mexico" -> "new_mexico"
fn normalize_region(region: &str) -> String {
    region.trim().to_lowercase().replace([' ', '.'], "_")
}

fn validate_component(name: &str) -> BasinResult<()> {
    if name.is_empty() {
        return Err(BasinError::InvalidInput("Cache key component cannot be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BasinError::InvalidInput(format!(
            "Invalid cache key component '{}': must contain only alphanumeric characters, hyphens, or underscores",
            name
        )));
    }
    Ok(())
}

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Nothing cached yet
    Miss,
    /// Staging directory left behind by an interrupted fetch
    Building,
    /// Finalized; reused until a forced refresh replaces it
    Complete,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Miss => write!(f, "miss"),
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// A finalized download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Files relative to the entry directory
    pub files: Vec<PathBuf>,
    /// URLs the files were actually fetched from
    pub origin_urls: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Check if this entry is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.fetched_at < cutoff
    }
}

/// An entry plus where it lives and how big it is (for listing)
#[derive(Debug, Clone)]
pub struct CachedItem {
    pub dir: PathBuf,
    pub state: CacheState,
    pub entry: Option<CacheEntry>,
    pub size_bytes: u64,
}

/// A staging directory being filled by a fetch
#[derive(Debug)]
pub struct Staging {
    pub key: CacheKey,
    pub dir: PathBuf,
}

/// The shared on-disk download cache
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a complete entry
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(&key.source).join(&key.region)
    }

    /// Parent of the region-independent derived fragments (per-tile slope etc.)
    pub fn derived_root(&self) -> PathBuf {
        self.root.join(DERIVED_DIR)
    }

    /// Load an entry if it is complete and every recorded file still exists
    pub async fn lookup(&self, key: &CacheKey) -> BasinResult<Option<CacheEntry>> {
        let dir = self.entry_dir(key);
        let marker = dir.join(ENTRY_MARKER);
        if !marker.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&marker)
            .await
            .map_err(|e| BasinError::io(format!("reading {}", marker.display()), e))?;
        let entry: CacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Ignoring unreadable cache marker {}: {}", marker.display(), e);
                return Ok(None);
            }
        };

        if let Some(missing) = entry.files.iter().find(|f| !dir.join(f).exists()) {
            warn!("Cache entry {} lost {}, refetching", key, missing.display());
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// Create a fresh staging directory for `key`
    pub async fn begin(&self, key: &CacheKey) -> BasinResult<Staging> {
        let parent = self.root.join(&key.source);
        let dir = parent.join(format!(
            "{}{}-{}",
            STAGING_PREFIX,
            key.region,
            uuid::Uuid::new_v4().simple()
        ));
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| BasinError::io(format!("creating staging dir {}", dir.display()), e))?;
        Ok(Staging {
            key: key.clone(),
            dir,
        })
    }

    /// Write the marker and swap the staging directory into place
    pub async fn commit(&self, staging: Staging, entry: &CacheEntry) -> BasinResult<PathBuf> {
        let marker = serde_json::to_vec_pretty(entry)?;
        fs::write(staging.dir.join(ENTRY_MARKER), marker)
            .await
            .map_err(|e| BasinError::io("writing cache marker", e))?;

        let target = self.entry_dir(&staging.key);
        let retired = target.with_file_name(format!(
            "{}retired-{}",
            STAGING_PREFIX,
            uuid::Uuid::new_v4().simple()
        ));

        if target.exists() {
            fs::rename(&target, &retired)
                .await
                .map_err(|e| BasinError::io(format!("retiring {}", target.display()), e))?;
        }

        fs::rename(&staging.dir, &target)
            .await
            .map_err(|e| BasinError::io(format!("committing {}", target.display()), e))?;

        if retired.exists() {
            let _ = fs::remove_dir_all(&retired).await;
        }

        debug!("Committed cache entry {}", staging.key);
        Ok(target)
    }

    /// Discard a staging directory after a failed fetch
    pub async fn abandon(&self, staging: Staging) {
        if let Err(e) = fs::remove_dir_all(&staging.dir).await {
            debug!("Could not remove staging dir {}: {}", staging.dir.display(), e);
        }
    }

    /// Enumerate every entry and leftover staging directory
    pub async fn list(&self) -> BasinResult<Vec<CachedItem>> {
        let mut items = Vec::new();
        if !self.root.exists() {
            return Ok(items);
        }

        for source_dir in read_dirs(&self.root).await? {
            let source = file_name(&source_dir);
            if source == DERIVED_DIR {
                continue;
            }
            for dir in read_dirs(&source_dir).await? {
                let name = file_name(&dir);
                let (state, entry) = if name.starts_with(STAGING_PREFIX) {
                    (CacheState::Building, None)
                } else {
                    match CacheKey::new(&source, &name) {
                        Ok(key) => match self.lookup(&key).await? {
                            Some(entry) => (CacheState::Complete, Some(entry)),
                            None => (CacheState::Building, None),
                        },
                        Err(_) => continue,
                    }
                };
                let size_bytes = dir_size(&dir).await;
                items.push(CachedItem {
                    dir,
                    state,
                    entry,
                    size_bytes,
                });
            }
        }

        items.sort_by(|a, b| a.dir.cmp(&b.dir));
        Ok(items)
    }

    /// Remove one cached directory
    pub async fn remove(&self, item: &CachedItem) -> BasinResult<()> {
        fs::remove_dir_all(&item.dir)
            .await
            .map_err(|e| BasinError::io(format!("removing {}", item.dir.display()), e))
    }
}

async fn read_dirs(dir: &Path) -> BasinResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| BasinError::io(format!("reading {}", dir.display()), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| BasinError::io("reading cache entry", e))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Total size of regular files below `dir` (best effort)
async fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(mut entries) = fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(entry.path()),
                Ok(meta) => total += meta.len(),
                Err(_) => {}
            }
        }
    }
    total
}
