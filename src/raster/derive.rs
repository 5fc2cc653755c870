use super::RasterDerivationEngine;
use crate::cache::{commit, staging_path};
use crate::error::{BasinError, BasinResult};
use crate::ops::DerivedKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A per-tile derived raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFragment {
    pub tile: PathBuf,
    pub path: PathBuf,
    /// Recomputed during this run
    pub rebuilt: bool,
}

impl RasterDerivationEngine {
    /// Derive one tile's slope or hillshade into `fragments_dir`
    ///
    /// Reuses the existing fragment unless it is missing, older than its
    /// tile, or the store is forced.
    pub async fn derive_tile(
        &self,
        tile: &Path,
        kind: DerivedKind,
        fragments_dir: &Path,
    ) -> BasinResult<TileFragment> {
        let path = fragments_dir.join(kind.fragment_name(tile));
        let decision = self.store.decide(&path, &[tile.to_path_buf()]);
        if !decision.is_rebuild() {
            return Ok(TileFragment {
                tile: tile.to_path_buf(),
                path,
                rebuilt: false,
            });
        }

        if self.cancel.is_cancelled() {
            return Err(BasinError::Cancelled);
        }

        tokio::fs::create_dir_all(fragments_dir)
            .await
            .map_err(|e| BasinError::io(format!("creating {}", fragments_dir.display()), e))?;

        debug!("Deriving {} for {}", kind, tile.display());
        let staging = staging_path(&path);
        if let Err(e) = self.ops.derive(kind, tile, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        commit(&staging, &path).await?;

        Ok(TileFragment {
            tile: tile.to_path_buf(),
            path,
            rebuilt: true,
        })
    }

    /// Derive every tile concurrently on the worker pool
    ///
    /// Fragments come back in tile order. The first failure is returned
    /// after the remaining in-flight derivations finish.
    pub async fn derive_tiles(
        &self,
        tiles: &[PathBuf],
        kind: DerivedKind,
        fragments_dir: &Path,
    ) -> BasinResult<Vec<TileFragment>> {
        let limiter = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for (index, tile) in tiles.iter().enumerate() {
            let engine = self.clone();
            let limiter = limiter.clone();
            let tile = tile.clone();
            let dir = fragments_dir.to_path_buf();
            tasks.spawn(async move {
                let _permit = limiter
                    .acquire_owned()
                    .await
                    .map_err(|_| BasinError::Cancelled)?;
                engine
                    .derive_tile(&tile, kind, &dir)
                    .await
                    .map(|fragment| (index, fragment))
            });
        }

        let mut fragments = Vec::with_capacity(tiles.len());
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(fragment)) => fragments.push(fragment),
                Ok(Err(e)) => {
                    warn!("{} derivation failed: {}", kind, e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(BasinError::Internal(format!(
                        "{} task failed: {}",
                        kind, e
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        fragments.sort_by_key(|(index, _)| *index);
        Ok(fragments.into_iter().map(|(_, f)| f).collect())
    }
}
