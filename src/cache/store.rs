//! Artifact freshness queries
//!
//! Answers "does this artifact need rebuilding?" from filesystem state.
//! A missing dependency never forces a rebuild: optional inputs that were
//! not supplied must not invalidate unrelated artifacts.

use crate::error::{BasinError, BasinResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Why an artifact has to be produced again
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    /// Caller asked for a forced refresh
    Forced,
    /// The target does not exist
    Missing,
    /// A dependency was modified after the target
    StaleDependency(PathBuf),
    /// The recorded input digest differs (e.g. the clip boundary changed)
    InputsChanged,
    /// An upstream artifact in the same chain was rebuilt
    Upstream(String),
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Missing => write!(f, "missing"),
            Self::StaleDependency(p) => write!(f, "{} is newer", p.display()),
            Self::InputsChanged => write!(f, "inputs changed"),
            Self::Upstream(name) => write!(f, "{} was rebuilt", name),
        }
    }
}

/// Outcome of a freshness query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildDecision {
    Reuse,
    Rebuild(RebuildReason),
}

impl RebuildDecision {
    pub fn is_rebuild(&self) -> bool {
        matches!(self, Self::Rebuild(_))
    }

    /// Promote a reuse decision to a rebuild when an upstream artifact changed
    pub fn or_upstream(self, rebuilt: bool, upstream: &str) -> Self {
        match self {
            Self::Reuse if rebuilt => Self::Rebuild(RebuildReason::Upstream(upstream.to_string())),
            other => other,
        }
    }
}

/// Sidecar record of the inputs an artifact was built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStamp {
    /// SHA-256 of the boundary or other non-file inputs
    pub digest: String,
    pub built_at: DateTime<Utc>,
}

/// Pure query over on-disk artifact state
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactStore {
    force: bool,
}

impl ArtifactStore {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    /// True if `target` is missing, forced, or older than any present dependency
    pub fn needs_rebuild(&self, target: &Path, dependencies: &[PathBuf]) -> bool {
        self.decide(target, dependencies).is_rebuild()
    }

    /// Like [`needs_rebuild`](Self::needs_rebuild) but reports the reason
    pub fn decide(&self, target: &Path, dependencies: &[PathBuf]) -> RebuildDecision {
        if self.force {
            return RebuildDecision::Rebuild(RebuildReason::Forced);
        }

        let Some(target_modified) = modified(target) else {
            return RebuildDecision::Rebuild(RebuildReason::Missing);
        };

        for dep in dependencies {
            // Absent dependencies are ignored, only stale ones count
            if let Some(dep_modified) = modified(dep) {
                if dep_modified > target_modified {
                    debug!(
                        "{} is stale: {} is newer",
                        target.display(),
                        dep.display()
                    );
                    return RebuildDecision::Rebuild(RebuildReason::StaleDependency(dep.clone()));
                }
            }
        }

        RebuildDecision::Reuse
    }

    /// Freshness query that also compares the recorded input digest
    pub fn decide_stamped(
        &self,
        target: &Path,
        dependencies: &[PathBuf],
        digest: &str,
    ) -> RebuildDecision {
        match self.decide(target, dependencies) {
            RebuildDecision::Reuse => match read_stamp(target) {
                Some(stamp) if stamp.digest == digest => RebuildDecision::Reuse,
                _ => RebuildDecision::Rebuild(RebuildReason::InputsChanged),
            },
            rebuild => rebuild,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Location of the stamp sidecar for an artifact (`.<name>.stamp.json`)
pub fn stamp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.stamp.json", name))
}

fn read_stamp(target: &Path) -> Option<ArtifactStamp> {
    let content = std::fs::read_to_string(stamp_path(target)).ok()?;
    serde_json::from_str(&content).ok()
}

/// Record the digest an artifact was built from
pub async fn write_stamp(target: &Path, digest: &str) -> BasinResult<()> {
    let stamp = ArtifactStamp {
        digest: digest.to_string(),
        built_at: Utc::now(),
    };
    let content = serde_json::to_vec_pretty(&stamp)?;
    write_atomic(&stamp_path(target), &content).await
}

/// SHA-256 of a byte slice as lowercase hex
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Temporary sibling used to produce `target` before it is committed
///
/// The original file name (and so its extension) is kept as the suffix,
/// tools that pick an output format from the extension still see it.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".partial-{}-{}", uuid::Uuid::new_v4().simple(), name))
}

/// Move a finished staging file over its target
///
/// Rename within one directory is atomic, so readers see either the old
/// or the new file, never a partial one.
pub async fn commit(staging: &Path, target: &Path) -> BasinResult<()> {
    tokio::fs::rename(staging, target).await.map_err(|e| {
        BasinError::io(
            format!("moving {} into place at {}", staging.display(), target.display()),
            e,
        )
    })
}

/// Write bytes to `path` via a temporary file and rename
pub async fn write_atomic(path: &Path, contents: &[u8]) -> BasinResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BasinError::io(format!("creating {}", parent.display()), e))?;
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, contents)
        .await
        .map_err(|e| BasinError::io(format!("writing {}", staging.display()), e))?;

    commit(&staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch_with_age(path: &Path, age_secs: u64) {
        fs::write(path, b"x").unwrap();
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn missing_target_needs_rebuild() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(false);

        let decision = store.decide(&dir.path().join("dem.tif"), &[]);
        assert_eq!(decision, RebuildDecision::Rebuild(RebuildReason::Missing));
    }

    #[test]
    fn newer_dependency_needs_rebuild() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dem.tif");
        let tile = dir.path().join("n45w122.tif");
        touch_with_age(&target, 600);
        touch_with_age(&tile, 10);

        let store = ArtifactStore::new(false);
        assert!(store.needs_rebuild(&target, &[tile.clone()]));
        assert_eq!(
            store.decide(&target, &[tile.clone()]),
            RebuildDecision::Rebuild(RebuildReason::StaleDependency(tile))
        );
    }

    #[test]
    fn unchanged_dependency_is_reused() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dem.tif");
        let tile = dir.path().join("n45w122.tif");
        touch_with_age(&tile, 600);
        touch_with_age(&target, 10);

        let store = ArtifactStore::new(false);
        assert!(!store.needs_rebuild(&target, &[tile]));
    }

    #[test]
    fn absent_dependency_does_not_force_rebuild() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("channel_area.gpkg");
        touch_with_age(&target, 10);

        let store = ArtifactStore::new(false);
        assert!(!store.needs_rebuild(&target, &[dir.path().join("waterbody.shp")]));
    }

    #[test]
    fn force_always_rebuilds() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dem.tif");
        touch_with_age(&target, 10);

        let store = ArtifactStore::new(true);
        assert!(store.needs_rebuild(&target, &[]));
    }

    #[tokio::test]
    async fn stamp_mismatch_means_inputs_changed() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("dem.tif");
        touch_with_age(&target, 10);
        write_stamp(&target, "aaaa").await.unwrap();

        let store = ArtifactStore::new(false);
        assert_eq!(store.decide_stamped(&target, &[], "aaaa"), RebuildDecision::Reuse);
        assert_eq!(
            store.decide_stamped(&target, &[], "bbbb"),
            RebuildDecision::Rebuild(RebuildReason::InputsChanged)
        );
    }

    #[tokio::test]
    async fn write_atomic_leaves_no_partial_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("project.json");

        write_atomic(&path, b"{}").await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".partial-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn upstream_promotes_reuse() {
        let decision = RebuildDecision::Reuse.or_upstream(true, "DEM");
        assert_eq!(
            decision,
            RebuildDecision::Rebuild(RebuildReason::Upstream("DEM".to_string()))
        );
        assert_eq!(RebuildDecision::Reuse.or_upstream(false, "DEM"), RebuildDecision::Reuse);
    }
}
